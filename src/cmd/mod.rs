//! CLI command implementations.
//!
//! | Module    | Commands handled                              |
//! |-----------|-----------------------------------------------|
//! | `project` | `Init`                                        |
//! | `stage`   | `Intake`, `Risk`, `Review`                    |
//! | `run`     | `Status`, `List`, `Use`, `Show`, `Override`   |
//! | `revise`  | `Revise`                                      |
//! | `config`  | `Config`                                      |

pub mod config;
pub mod project;
pub mod revise;
pub mod run;
pub mod stage;

pub use config::cmd_config;
pub use project::cmd_init;
pub use revise::cmd_revise;
pub use run::{cmd_list, cmd_override, cmd_show, cmd_status, cmd_use};
pub use stage::{cmd_intake, cmd_review, cmd_risk};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use qaforge::config::{QaforgeConfig, RendererKind};
use qaforge::generate::{CommandGenerator, GenerationKind, PromptSet, StageRouter};
use qaforge::render::TemplateRenderer;
use qaforge::{Pipeline, PipelineError, RunStore, Session};

use super::Cli;

pub(crate) fn load_config(cli: &Cli, project_dir: &Path) -> Result<QaforgeConfig> {
    QaforgeConfig::with_cli_args(project_dir.to_path_buf(), cli.verbose)
}

/// Session over the configured store, pinned to `--run` when given.
pub(crate) fn open_session(cli: &Cli, config: &QaforgeConfig) -> Result<Session> {
    let store = RunStore::open(config.store_dir())?;
    let session = Session::new(store);
    Ok(match &cli.run {
        Some(run_id) => session.with_run(run_id.clone()),
        None => session,
    })
}

/// Pipeline wired to the configured generator command. The review stage
/// goes to the built-in renderer unless configured otherwise.
pub(crate) fn build_pipeline(config: &QaforgeConfig) -> Pipeline {
    let generator = &config.toml.generator;
    let command = CommandGenerator::new(generator.command.clone(), generator.args.clone())
        .with_working_dir(&config.project_dir);

    let mut router = StageRouter::new(Arc::new(command));
    if config.toml.review.renderer == RendererKind::Template {
        router = router.route(GenerationKind::Review, Arc::new(TemplateRenderer));
    }

    let pipeline =
        Pipeline::new(Arc::new(router)).with_prompts(PromptSet::with_overrides(config.prompts_dir()));
    match config.timeout() {
        Some(timeout) => pipeline.with_timeout(timeout),
        None => pipeline,
    }
}

/// Print any violations the error carries, then hand it back.
pub(crate) fn report(err: PipelineError) -> anyhow::Error {
    let violations = err.violations();
    if !violations.is_empty() {
        eprintln!();
        eprintln!("{}", console::style(&err).red().bold());
        for violation in violations {
            eprintln!("  {} {}", console::style("✗").red(), violation);
        }
        eprintln!();
    }
    err.into()
}
