//! Reviewer feedback classification — `qaforge revise`.

use anyhow::Result;
use console::style;
use std::path::Path;

use qaforge::RevisionClassifier;
use qaforge::revision::RevisionRequest;

use super::super::Cli;
use super::{build_pipeline, load_config, open_session, report};

fn print_request(request: &RevisionRequest) {
    println!(
        "{} {} ({})",
        style("✓").green().bold(),
        style(&request.request_id).bold(),
        style(request.intent).cyan()
    );

    if !request.explanation_targets.is_empty() {
        let targets: Vec<String> = request
            .explanation_targets
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("  Explain: {}", targets.join(", "));
    }

    for change in &request.requested_changes {
        println!(
            "  Requested: {}.{} → {} ({})",
            change.target_id, change.field, change.new_value, change.reason
        );
    }

    for rejected in &request.rejected_changes {
        println!(
            "  {} Rejected: {}.{}: {}",
            style("✗").red(),
            rejected.target_id,
            rejected.field,
            rejected.reason
        );
    }

    if let Some(plan) = &request.execution_plan {
        println!();
        println!("Execution plan:");
        if plan.change_scope.is_empty() {
            println!("  (nothing authorized)");
        }
        for scope in &plan.change_scope {
            let fields: Vec<&str> = scope.allowed_fields.iter().map(|f| f.as_str()).collect();
            println!("  {} may change: {}", scope.target_id, fields.join(", "));
        }
        for withheld in &plan.withheld {
            println!(
                "  {} Withheld {}.{}: {}",
                style("!").yellow(),
                withheld.target_id,
                withheld.field,
                withheld.reason
            );
        }
    }
}

pub async fn cmd_revise(cli: &Cli, project_dir: &Path, message: &str) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let session = open_session(cli, &config)?;
    let pipeline = build_pipeline(&config);

    let request = RevisionClassifier::new(&pipeline)
        .classify(&session, message)
        .await
        .map_err(report)?;

    print_request(&request);
    println!();
    println!(
        "Saved to {}",
        session
            .store()
            .revision_path(&request.run_id, &request.request_id)
            .display()
    );
    Ok(())
}
