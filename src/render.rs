//! Deterministic Markdown rendering of a committed plan.
//!
//! The layout is fixed: title and metadata, Purpose, In Scope, Out of Scope,
//! one block per requirement (metadata table, risk block, one table per test
//! case), then the Review Decision. Missing values render as `—` and empty
//! lists as `None`, so no field is ever blank. The same payload always yields
//! the same bytes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;
use crate::generate::{GenerationKind, GenerationRequest, Generator};
use crate::plan::{IntakeArtifact, Requirement, RiskEntry, Run, TestCase};

const PLACEHOLDER: &str = "—";
const NONE: &str = "None";

/// Everything the review stage receives: both upstream artifacts plus
/// document metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPayload {
    pub intake: IntakeArtifact,
    pub risk: Vec<RiskEntry>,
    pub artifact_id: String,
    pub prd_source: String,
    /// Run creation date, `YYYY-MM-DD`.
    pub generated: String,
}

impl ReviewPayload {
    /// `None` until intake has committed.
    pub fn from_run(run: &Run) -> Option<Self> {
        let plan_context = run.plan_context.clone()?;
        Some(Self {
            intake: IntakeArtifact {
                plan_context,
                project_context: run.project_context.clone(),
                requirements: run.requirements.clone(),
            },
            risk: run.risk_entries.clone(),
            artifact_id: format!("qaforge-{}", run.run_id),
            prd_source: format!("{}/source.md", run.run_id),
            generated: run.created_at.format("%Y-%m-%d").to_string(),
        })
    }
}

/// Review-stage generator backed by [`render_plan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

#[async_trait]
impl Generator for TemplateRenderer {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if request.kind != GenerationKind::Review {
            return Err(GenerationError::Unsupported { kind: request.kind });
        }
        let payload: ReviewPayload = serde_json::from_value(request.payload.clone())
            .map_err(GenerationError::InvalidPayload)?;
        Ok(render_plan(&payload))
    }
}

fn text(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() { PLACEHOLDER } else { trimmed }
}

fn cell(value: &str) -> String {
    text(value).replace('|', "\\|").replace('\n', "<br>")
}

fn joined(items: &[String], separator: &str) -> String {
    let items: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        NONE.to_string()
    } else {
        items.join(separator)
    }
}

fn bullets(out: &mut Vec<String>, items: &[String]) {
    let items: Vec<&String> = items.iter().filter(|s| !s.trim().is_empty()).collect();
    if items.is_empty() {
        out.push(NONE.to_string());
    }
    for item in items {
        out.push(format!("- {}", item.trim()));
    }
}

fn table(out: &mut Vec<String>, rows: &[(&str, String)]) {
    out.push("| Field | Value |".to_string());
    out.push("|-------|-------|".to_string());
    for (field, value) in rows {
        out.push(format!("| {} | {} |", field, value));
    }
}

fn requirement_block(out: &mut Vec<String>, req: &Requirement, entry: Option<&RiskEntry>) {
    out.push(format!("### {}", req.req_id));
    out.push(String::new());
    table(
        out,
        &[
            ("Description", cell(&req.description)),
            ("PRD Reference", cell(&req.prd_ref)),
            ("Actors", cell(&joined(&req.actors, ", "))),
            ("Testable", if req.testable { "Yes" } else { "No" }.to_string()),
            ("Ambiguity Flags", cell(&joined(&req.ambiguity_flags, "; "))),
        ],
    );
    out.push(String::new());

    let severity = entry.and_then(|e| e.severity).map_or(PLACEHOLDER.to_string(), |s| {
        if entry.is_some_and(|e| e.severity_locked) {
            format!("{} (locked)", s)
        } else {
            s.to_string()
        }
    });
    let risk = entry.and_then(|e| e.risk.as_deref()).unwrap_or("");
    let basis = entry.and_then(|e| e.severity_basis.as_deref()).unwrap_or("");
    out.push(format!("- **Risk:** {}", text(risk)));
    out.push(format!("- **Severity:** {}", severity));
    out.push(format!("- **Severity Basis:** {}", text(basis)));
    out.push(String::new());

    let cases = entry.map(|e| e.test_cases.as_slice()).unwrap_or_default();
    if cases.is_empty() {
        out.push("_No test cases._".to_string());
        out.push(String::new());
    }
    for tc in cases {
        test_case_block(out, tc);
    }
}

fn test_case_block(out: &mut Vec<String>, tc: &TestCase) {
    out.push(format!("#### {}", tc.tc_id));
    out.push(String::new());
    table(
        out,
        &[
            ("Objective", cell(&tc.objective)),
            ("Type", tc.test_type.to_string()),
            ("Surface", tc.surface.to_string()),
            ("Priority", tc.priority.to_string()),
            ("Human Note", cell(tc.human_note.as_deref().unwrap_or(""))),
        ],
    );
    out.push(String::new());
}

fn severity_overrides(risk: &[RiskEntry]) -> String {
    let overrides: Vec<String> = risk
        .iter()
        .filter(|e| e.severity_locked)
        .filter_map(|e| {
            let severity = e.severity?;
            Some(match e.severity_basis.as_deref().map(str::trim) {
                Some(basis) if !basis.is_empty() => {
                    format!("{} → {} ({})", e.req_id, severity, basis)
                }
                _ => format!("{} → {}", e.req_id, severity),
            })
        })
        .collect();
    joined(&overrides, "; ")
}

/// Render the test plan for `payload`.
pub fn render_plan(payload: &ReviewPayload) -> String {
    let mut out: Vec<String> = Vec::new();
    let plan = &payload.intake.plan_context;

    out.push("# QA Test Plan".to_string());
    out.push(String::new());
    out.push(format!("- **Artifact ID:** {}", text(&payload.artifact_id)));
    out.push(format!("- **PRD Source:** {}", text(&payload.prd_source)));
    out.push(format!("- **Generated:** {}", text(&payload.generated)));
    out.push(String::new());

    out.push("## Purpose".to_string());
    out.push(String::new());
    out.push(text(&plan.purpose).to_string());
    out.push(String::new());

    out.push("## In Scope".to_string());
    out.push(String::new());
    bullets(&mut out, &plan.in_scope);
    out.push(String::new());

    out.push("## Out of Scope".to_string());
    out.push(String::new());
    bullets(&mut out, &plan.out_of_scope);
    out.push(String::new());

    out.push("## Requirements".to_string());
    out.push(String::new());
    for req in &payload.intake.requirements {
        let entry = payload.risk.iter().find(|e| e.req_id == req.req_id);
        requirement_block(&mut out, req, entry);
    }

    out.push("## Review Decision".to_string());
    out.push(String::new());
    out.push("- **Plan Status:** Pending Review".to_string());
    out.push(format!(
        "- **Severity Overrides:** {}",
        severity_overrides(&payload.risk)
    ));
    out.push(format!("- **Ambiguities Resolved:** {}", NONE));
    out.push(format!("- **Requirements Rejected:** {}", NONE));
    out.push(format!("- **Notes:** {}", PLACEHOLDER));

    let mut document = out.join("\n");
    document.push('\n');
    document
}
