use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "qaforge")]
#[command(version, about = "QA test-plan pipeline with validated stages")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Act on this run instead of the current one
    #[arg(long, global = true)]
    pub run: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new qaforge project
    Init {
        /// Copy the default prompts into .qaforge/prompts for editing
        #[arg(long)]
        with_prompts: bool,
    },
    /// Stage 1: extract requirements from a document
    Intake {
        /// Path to the requirements document (UTF-8 Markdown)
        document: PathBuf,
        /// Start a new run even if another run is current
        #[arg(long)]
        supersede: bool,
    },
    /// Stage 2: assess risk and derive test cases
    Risk,
    /// Stage 3: render the reviewable test plan
    Review,
    /// Show the current run's state
    Status,
    /// List all runs
    List,
    /// Make a run current
    Use { run_id: String },
    /// Print the rendered plan (or the run record with --json)
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Set and lock a requirement's severity
    Override {
        req_id: String,
        severity: String,
        /// Reason recorded as the severity basis
        #[arg(long)]
        basis: Option<String>,
    },
    /// Classify reviewer feedback into a scoped revision request
    Revise { message: String },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default qaforge.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_dir = qaforge::config::QaforgeConfig::new(project_dir.clone())
        .map(|config| config.log_dir())
        .unwrap_or_else(|_| {
            project_dir
                .join(qaforge::config::QAFORGE_DIR)
                .join(qaforge::config::LOGS_DIR)
        });
    let _log_guard = qaforge::logging::init_logging(cli.verbose, Some(&log_dir));

    match &cli.command {
        Commands::Init { with_prompts } => cmd::cmd_init(&project_dir, *with_prompts)?,
        Commands::Intake {
            document,
            supersede,
        } => cmd::cmd_intake(&cli, &project_dir, document, *supersede).await?,
        Commands::Risk => cmd::cmd_risk(&cli, &project_dir).await?,
        Commands::Review => cmd::cmd_review(&cli, &project_dir).await?,
        Commands::Status => cmd::cmd_status(&cli, &project_dir)?,
        Commands::List => cmd::cmd_list(&cli, &project_dir)?,
        Commands::Use { run_id } => cmd::cmd_use(&cli, &project_dir, run_id)?,
        Commands::Show { json } => cmd::cmd_show(&cli, &project_dir, *json)?,
        Commands::Override {
            req_id,
            severity,
            basis,
        } => cmd::cmd_override(&cli, &project_dir, req_id, severity, basis.as_deref())?,
        Commands::Revise { message } => cmd::cmd_revise(&cli, &project_dir, message).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
