//! Pipeline stage commands — `qaforge intake`, `risk`, `review`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use qaforge::{Run, RunState};

use super::super::Cli;
use super::{build_pipeline, load_config, open_session, report};

fn print_committed(run: &Run) {
    println!(
        "{} {} is now {}",
        style("✓").green().bold(),
        style(&run.run_id).bold(),
        style(run.state).cyan()
    );
}

fn print_next(run: &Run) {
    if let Some(next) = run.state.next_stage() {
        println!();
        println!("Next: `qaforge {}`", next);
    }
}

pub async fn cmd_intake(
    cli: &Cli,
    project_dir: &Path,
    document: &Path,
    supersede: bool,
) -> Result<()> {
    let bytes = std::fs::read(document)
        .with_context(|| format!("Failed to read document: {}", document.display()))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("Document is not valid UTF-8: {}", document.display()))?;

    let config = load_config(cli, project_dir)?;
    let mut session = open_session(cli, &config)?;
    let pipeline = build_pipeline(&config);

    let run = pipeline
        .intake(&mut session, &text, supersede)
        .await
        .map_err(report)?;

    print_committed(&run);
    println!("  {} requirement(s) extracted", run.requirements.len());
    let ambiguous = run.requirements.iter().filter(|r| r.is_ambiguous()).count();
    if ambiguous > 0 {
        println!("  {} flagged as ambiguous", style(ambiguous).yellow());
    }
    print_next(&run);
    Ok(())
}

pub async fn cmd_risk(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let mut session = open_session(cli, &config)?;
    let pipeline = build_pipeline(&config);

    let run = pipeline.risk(&mut session).await.map_err(report)?;

    print_committed(&run);
    let assessed = run.risk_entries.iter().filter(|e| e.has_risk()).count();
    println!(
        "  {} of {} requirement(s) carry an assessed risk",
        assessed,
        run.risk_entries.len()
    );
    println!("  {} test case(s) derived", run.test_cases().count());
    print_next(&run);
    Ok(())
}

pub async fn cmd_review(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let mut session = open_session(cli, &config)?;
    let pipeline = build_pipeline(&config);

    let run = pipeline.review(&mut session).await.map_err(report)?;

    print_committed(&run);
    if run.state == RunState::ReviewDone {
        println!(
            "  Plan written to {}",
            session.store().plan_path(&run.run_id).display()
        );
    }
    Ok(())
}
