//! Run inspection and reviewer overrides — `status`, `list`, `use`, `show`,
//! `override`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use qaforge::gates;
use qaforge::ids::ReqId;
use qaforge::plan::Severity;
use qaforge::{Run, StoreError};

use super::super::Cli;
use super::{load_config, open_session};

const DEFAULT_OVERRIDE_BASIS: &str = "Reviewer override";

fn no_run_hint() {
    println!();
    println!("No current run. Start one with `qaforge intake <document>`.");
    println!();
}

pub fn cmd_status(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let session = open_session(cli, &config)?;
    let Some(run) = session.current_if_any()? else {
        no_run_hint();
        return Ok(());
    };

    println!();
    println!("Run:        {}", style(&run.run_id).bold());
    println!("State:      {}", style(run.state).cyan());
    println!("Revision:   {}", run.revision);
    println!("Created:    {}", run.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Updated:    {}", run.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Source:     {}…", &run.source_sha256[..12.min(run.source_sha256.len())]);
    println!();
    println!("Requirements: {}", run.requirements.len());
    println!("Risk entries: {}", run.risk_entries.len());
    println!("Test cases:   {}", run.test_cases().count());

    let locked: Vec<String> = run
        .risk_entries
        .iter()
        .filter(|e| e.severity_locked)
        .map(|e| e.req_id.to_string())
        .collect();
    if !locked.is_empty() {
        println!("Locked:       {}", locked.join(", "));
    }

    let below_floor: Vec<String> = run
        .risk_entries
        .iter()
        .filter_map(|entry| {
            let req = run.requirement(entry.req_id)?;
            gates::check_severity(req, run.project_context.as_ref(), entry.severity).err()
        })
        .collect();
    for reason in &below_floor {
        println!("  {} {}", style("!").yellow(), reason);
    }

    match run.state.next_stage() {
        Some(next) => println!("\nNext: `qaforge {}`", next),
        None => println!("\nPlan ready: {}", session.store().plan_path(&run.run_id).display()),
    }
    println!();
    Ok(())
}

pub fn cmd_list(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let session = open_session(cli, &config)?;
    let store = session.store();
    let runs = store.list_runs()?;

    if runs.is_empty() {
        no_run_hint();
        return Ok(());
    }

    let current = store.current_run_id()?;
    println!();
    println!(
        "  {:<18} {:<12} {:>5} {:>5}  Created",
        "Run", "State", "REQs", "TCs"
    );
    println!(
        "  {:<18} {:<12} {:>5} {:>5}  -------",
        "------------------", "-----------", "----", "---"
    );
    for run in &runs {
        let marker = if current.as_deref() == Some(run.run_id.as_str()) {
            style("*").green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {:<18} {:<12} {:>5} {:>5}  {}",
            marker,
            run.run_id,
            run.state,
            run.requirements.len(),
            run.test_cases().count(),
            run.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    Ok(())
}

pub fn cmd_use(cli: &Cli, project_dir: &Path, run_id: &str) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let session = open_session(cli, &config)?;
    session.store().set_current(run_id)?;
    println!("{} {} is now current", style("✓").green().bold(), run_id);
    Ok(())
}

pub fn cmd_show(cli: &Cli, project_dir: &Path, json: bool) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let session = open_session(cli, &config)?;
    let run = session.current()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run).context("Failed to serialize run")?
        );
        return Ok(());
    }

    match &run.rendered_document {
        Some(document) => print!("{}", document),
        None => {
            println!();
            println!("{} has no rendered plan (state {}).", run.run_id, run.state);
            println!("Run `qaforge review` once risk assessment is committed.");
            println!();
        }
    }
    Ok(())
}

fn print_override(run: &Run, req_id: ReqId) {
    if let Some(entry) = run.risk_entry(req_id) {
        println!(
            "{} {} severity locked at {}",
            style("✓").green().bold(),
            req_id,
            style(entry.severity.map_or("—".to_string(), |s| s.to_string())).bold()
        );
    }
    println!("  {} is now {}; re-run `qaforge review`", run.run_id, run.state);
}

pub fn cmd_override(
    cli: &Cli,
    project_dir: &Path,
    req_id: &str,
    severity: &str,
    basis: Option<&str>,
) -> Result<()> {
    let req_id: ReqId = req_id.parse()?;
    let severity: Severity = severity.parse()?;
    let basis = basis
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_OVERRIDE_BASIS);

    let config = load_config(cli, project_dir)?;
    let session = open_session(cli, &config)?;
    let run = session.current()?;

    match session.store().override_severity(&run, req_id, severity, basis) {
        Ok(updated) => {
            print_override(&updated, req_id);
            Ok(())
        }
        Err(e @ StoreError::BelowSeverityFloor { .. }) => {
            if let Some(req) = run.requirement(req_id) {
                for signal in gates::floor_signals(req, run.project_context.as_ref()) {
                    eprintln!("  {} floor {} from {}", style("!").yellow(), signal.floor(), signal);
                }
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
