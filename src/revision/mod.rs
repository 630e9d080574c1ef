//! Revision classifier: reviewer feedback to a scoped change authorization.
//!
//! A free-text message about a reviewed plan is sent to the generator once.
//! Its answer is validated against the run (every ID must exist, forbidden
//! fields must be rejected rather than requested, values must be in their
//! enums) and an [`ExecutionPlan`] is derived from it deterministically.
//! The plan only ever narrows what was requested: one scope per target,
//! listing the requested fields, minus changes the severity gate refuses.
//! Applying the plan is left to a downstream builder.

pub mod types;

pub use types::{
    ChangeScope, DEFAULT_REASON, ExecutionPlan, FORBIDDEN_FIELDS, Intent, RejectedChange,
    RequestedChange, RevisableField, RevisionPolicy, RevisionRequest, TargetId,
    VALIDATION_PROFILE, WithheldChange,
};

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::errors::{PipelineError, StoreError, Violation};
use crate::gates;
use crate::generate::GenerationKind;
use crate::pipeline::Pipeline;
use crate::pipeline::state::RunState;
use crate::plan::{Priority, Run, Severity};
use crate::session::Session;
use crate::validate::{Checker, at, decode_json, index};

/// The validated part of a classifier answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierOutput {
    pub intent: Intent,
    pub requested_changes: Vec<RequestedChange>,
    pub explanation_targets: Vec<TargetId>,
    pub rejected_changes: Vec<RejectedChange>,
}

pub struct RevisionClassifier<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> RevisionClassifier<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Classify `message` against the session's run and persist the result.
    pub async fn classify(
        &self,
        session: &Session,
        message: &str,
    ) -> Result<RevisionRequest, PipelineError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }

        let run = session.current()?;
        if !matches!(run.state, RunState::RiskDone | RunState::ReviewDone) {
            return Err(StoreError::InvalidState {
                run_id: run.run_id,
                attempted: "revision".to_string(),
                state: run.state,
            }
            .into());
        }

        let store = session.store();
        let today = Utc::now().date_naive();
        let provisional_id = store.next_revision_id(today)?;
        let payload = json!({
            "message": message,
            "request_id": provisional_id,
            "current_artifacts": {
                "run_id": run.run_id,
                "requirements": run.requirements,
                "risk_entries": run.risk_entries,
            },
        });

        let raw = self
            .pipeline
            .generate(GenerationKind::Revision, payload)
            .await?;
        let output = parse_classifier_output(&raw, &run)
            .map_err(|violations| PipelineError::InvalidRevision { violations })?;

        let execution_plan = output
            .intent
            .requests_changes()
            .then(|| derive_execution_plan(&output.requested_changes, &run));

        let (request, _) = store.save_revision(&run.run_id, today, |request_id| RevisionRequest {
            request_id,
            run_id: run.run_id.clone(),
            created_at: Utc::now(),
            message: message.to_string(),
            intent: output.intent,
            requested_changes: output.requested_changes,
            explanation_targets: output.explanation_targets,
            rejected_changes: output.rejected_changes,
            policy: RevisionPolicy::default(),
            execution_plan,
        })?;

        info!(
            run_id = %run.run_id,
            request_id = %request.request_id,
            intent = %request.intent,
            requested = request.requested_changes.len(),
            rejected = request.rejected_changes.len(),
            "revision request recorded"
        );
        Ok(request)
    }
}

fn target_exists(run: &Run, target: &TargetId) -> bool {
    match target {
        TargetId::Req(id) => run.requirement(*id).is_some(),
        TargetId::Tc(id) => run.test_case(*id).is_some(),
    }
}

fn target(c: &mut Checker, raw: &str, path: &str, run: &Run) -> Option<TargetId> {
    match raw.parse::<TargetId>() {
        Ok(id) if target_exists(run, &id) => Some(id),
        Ok(id) => {
            c.schema(path, format!("{} does not exist in the current run", id));
            None
        }
        Err(e) => {
            c.push(Violation::sequence(path, e.to_string()));
            None
        }
    }
}

/// Validate a classifier answer against `run`.
pub fn parse_classifier_output(raw: &str, run: &Run) -> Result<ClassifierOutput, Vec<Violation>> {
    let value = decode_json(raw)?;
    let mut c = Checker::new();
    let Some(root) = c.object(&value, "$") else {
        return Err(c.into_violations());
    };

    let intent = c.enum_value::<Intent>(root, "intent", "");

    let mut requested_changes = Vec::new();
    if let Some(items) = c.array(root, "requested_changes", "") {
        for (i, item) in items.iter().enumerate() {
            let path = index("requested_changes", i);
            if let Some(change) = requested_change(&mut c, item, &path, run) {
                requested_changes.push(change);
            }
        }
    }

    let mut explanation_targets = Vec::new();
    if let Some(ids) = c.string_list(root, "explanation_targets", "") {
        for (i, raw_id) in ids.iter().enumerate() {
            if let Some(id) = target(&mut c, raw_id, &index("explanation_targets", i), run) {
                if !explanation_targets.contains(&id) {
                    explanation_targets.push(id);
                }
            }
        }
    }

    let mut rejected_changes = Vec::new();
    if let Some(items) = c.array(root, "rejected_changes", "") {
        for (i, item) in items.iter().enumerate() {
            let path = index("rejected_changes", i);
            let Some(obj) = c.object(item, &path) else {
                continue;
            };
            let target_id = c.string(obj, "target_id", &path);
            let field = c.string(obj, "field", &path);
            let reason = c.string(obj, "reason", &path);
            if let (Some(target_id), Some(field), Some(reason)) = (target_id, field, reason) {
                rejected_changes.push(RejectedChange {
                    target_id,
                    field,
                    reason,
                });
            }
        }
    }

    let Some(intent) = intent else {
        return Err(c.into_violations());
    };
    if intent == Intent::Explain && !requested_changes.is_empty() {
        c.schema(
            "requested_changes",
            "an explain-only request cannot carry requested changes",
        );
    }
    if intent == Intent::Revise && !explanation_targets.is_empty() {
        c.schema(
            "explanation_targets",
            "a revise-only request cannot carry explanation targets",
        );
    }

    c.finish(ClassifierOutput {
        intent,
        requested_changes,
        explanation_targets,
        rejected_changes,
    })
}

fn requested_change(
    c: &mut Checker,
    item: &Value,
    path: &str,
    run: &Run,
) -> Option<RequestedChange> {
    let obj: &Map<String, Value> = c.object(item, path)?;
    let raw_target = c.string(obj, "target_id", path);
    let raw_field = c.string(obj, "field", path);
    let new_value = c.string(obj, "new_value", path);
    let reason = c.string(obj, "reason", path);

    let target_id = raw_target.and_then(|raw| target(c, &raw, &at(path, "target_id"), run));

    let field_path = at(path, "field");
    let field = match raw_field.as_deref() {
        Some(name) if FORBIDDEN_FIELDS.contains(&name) => {
            c.schema(
                &field_path,
                format!("{} is a forbidden field; it belongs in rejected_changes", name),
            );
            None
        }
        Some(name) => match name.parse::<RevisableField>() {
            Ok(field) => Some(field),
            Err(e) => {
                c.schema(&field_path, e.to_string());
                None
            }
        },
        None => None,
    };

    let (target_id, field, new_value) = (target_id?, field?, new_value?);
    if !field.applies_to(&target_id) {
        c.schema(
            &field_path,
            format!("{} cannot be changed on {}", field, target_id),
        );
        return None;
    }

    let value_path = at(path, "new_value");
    let value_error = match field {
        RevisableField::Priority => new_value.parse::<Priority>().err().map(|e| e.to_string()),
        RevisableField::Severity => new_value.parse::<Severity>().err().map(|e| e.to_string()),
        RevisableField::HumanNote | RevisableField::SeverityBasis => None,
    };
    if let Some(message) = value_error {
        c.schema(value_path, message);
        return None;
    }

    let reason = reason?;
    Some(RequestedChange {
        target_id,
        field,
        new_value,
        reason: if reason.trim().is_empty() {
            DEFAULT_REASON.to_string()
        } else {
            reason
        },
    })
}

/// Authorized subset of `changes`: one scope per target in first-seen
/// order. Severity changes the run cannot take are withheld.
pub fn derive_execution_plan(changes: &[RequestedChange], run: &Run) -> ExecutionPlan {
    let mut change_scope: Vec<ChangeScope> = Vec::new();
    let mut withheld = Vec::new();

    for change in changes {
        if let Some(reason) = withhold_reason(change, run) {
            withheld.push(WithheldChange {
                target_id: change.target_id,
                field: change.field,
                new_value: change.new_value.clone(),
                reason,
            });
            continue;
        }

        match change_scope
            .iter_mut()
            .find(|scope| scope.target_id == change.target_id)
        {
            Some(scope) => {
                if !scope.allowed_fields.contains(&change.field) {
                    scope.allowed_fields.push(change.field);
                }
            }
            None => change_scope.push(ChangeScope {
                target_id: change.target_id,
                allowed_fields: vec![change.field],
            }),
        }
    }

    ExecutionPlan {
        change_scope,
        withheld,
        forbidden_changes: FORBIDDEN_FIELDS.iter().map(|f| f.to_string()).collect(),
        validation_profile: VALIDATION_PROFILE.iter().map(|f| f.to_string()).collect(),
    }
}

fn withhold_reason(change: &RequestedChange, run: &Run) -> Option<String> {
    let TargetId::Req(req_id) = change.target_id else {
        return None;
    };
    if !matches!(
        change.field,
        RevisableField::Severity | RevisableField::SeverityBasis
    ) {
        return None;
    }

    if !run.risk_entry(req_id).is_some_and(|e| e.has_risk()) {
        return Some(format!("{} has no assessed risk to grade", req_id));
    }

    if change.field == RevisableField::Severity {
        let requested = change.new_value.parse::<Severity>().ok()?;
        let req = run.requirement(req_id)?;
        if let Err(reason) =
            gates::check_severity(req, run.project_context.as_ref(), Some(requested))
        {
            return Some(reason);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ReqId, TcId};
    use crate::plan::{
        IntakeArtifact, PlanContext, ProjectContext, Requirement, RiskArtifact, RiskEntry,
        StageArtifact, Surface, TestCase, TestType,
    };

    fn run() -> Run {
        let mut run = Run::new("RUN-20260101-001", "# PRD");
        run.apply(StageArtifact::Intake(IntakeArtifact {
            plan_context: PlanContext {
                purpose: "p".into(),
                in_scope: vec![],
                out_of_scope: vec![],
            },
            project_context: Some(ProjectContext {
                known_high_severity_areas: Some(vec!["Order Confirmation".into()]),
                ..Default::default()
            }),
            requirements: vec![
                Requirement {
                    req_id: ReqId::new(1),
                    prd_ref: "§1".into(),
                    description: "Show the order confirmation".into(),
                    actors: vec![],
                    testable: true,
                    ambiguity_flags: vec![],
                },
                Requirement {
                    req_id: ReqId::new(2),
                    prd_ref: "§2".into(),
                    description: "Export receipts".into(),
                    actors: vec![],
                    testable: true,
                    ambiguity_flags: vec![],
                },
            ],
        }));
        let tc = |tc: u32, req: u32| TestCase {
            tc_id: TcId::new(tc),
            req_id: ReqId::new(req),
            objective: "Check".into(),
            test_type: TestType::E2e,
            surface: Surface::Ui,
            priority: Priority::P2,
            human_note: None,
            fallback_applied: false,
        };
        run.apply(StageArtifact::Risk(RiskArtifact {
            risk_entries: vec![
                RiskEntry {
                    req_id: ReqId::new(1),
                    risk: Some("Wrong order shown".into()),
                    severity: Some(Severity::High),
                    severity_basis: Some("Known high-severity area".into()),
                    severity_locked: false,
                    test_cases: vec![tc(1, 1), tc(2, 1)],
                },
                RiskEntry {
                    req_id: ReqId::new(2),
                    risk: None,
                    severity: None,
                    severity_basis: None,
                    severity_locked: false,
                    test_cases: vec![tc(3, 2)],
                },
            ],
        }));
        run
    }

    fn change(target: &str, field: &str, value: &str) -> Value {
        json!({"target_id": target, "field": field, "new_value": value, "reason": ""})
    }

    fn output(intent: &str, changes: Vec<Value>, targets: Vec<&str>) -> String {
        json!({
            "intent": intent,
            "requested_changes": changes,
            "explanation_targets": targets,
            "rejected_changes": []
        })
        .to_string()
    }

    #[test]
    fn test_revise_output_is_parsed_with_default_reason() {
        let raw = output("revise", vec![change("TC-003", "priority", "P1")], vec![]);
        let parsed = parse_classifier_output(&raw, &run()).unwrap();
        assert_eq!(parsed.intent, Intent::Revise);
        assert_eq!(parsed.requested_changes[0].target_id, TargetId::Tc(TcId::new(3)));
        assert_eq!(parsed.requested_changes[0].reason, DEFAULT_REASON);
    }

    #[test]
    fn test_unknown_target_is_surfaced() {
        let raw = output("revise", vec![change("TC-099", "priority", "P1")], vec![]);
        let violations = parse_classifier_output(&raw, &run()).unwrap_err();
        assert_eq!(violations[0].path, "requested_changes[0].target_id");
        assert_eq!(violations[0].message, "TC-099 does not exist in the current run");
    }

    #[test]
    fn test_forbidden_field_must_be_rejected_not_requested() {
        let raw = output("revise", vec![change("TC-001", "type", "unit")], vec![]);
        let violations = parse_classifier_output(&raw, &run()).unwrap_err();
        assert!(violations[0].message.contains("type is a forbidden field"));
    }

    #[test]
    fn test_invalid_values_are_surfaced() {
        let raw = output(
            "revise",
            vec![
                change("TC-001", "priority", "P9"),
                change("REQ-001", "severity", "critical"),
                change("REQ-001", "priority", "P1"),
            ],
            vec![],
        );
        let violations = parse_classifier_output(&raw, &run()).unwrap_err();
        assert_eq!(violations.len(), 3);
        assert!(violations[0].message.starts_with("'P9' is not a valid priority value"));
        assert!(violations[2].message.contains("priority cannot be changed on REQ-001"));
    }

    #[test]
    fn test_intent_consistency_is_enforced() {
        let raw = output("explain", vec![change("TC-001", "priority", "P1")], vec![]);
        assert!(parse_classifier_output(&raw, &run()).is_err());

        let raw = output("revise", vec![], vec!["REQ-001"]);
        assert!(parse_classifier_output(&raw, &run()).is_err());

        let raw = output("explain", vec![], vec!["REQ-001", "TC-002", "REQ-001"]);
        let parsed = parse_classifier_output(&raw, &run()).unwrap();
        assert_eq!(parsed.explanation_targets.len(), 2);
    }

    #[test]
    fn test_plan_groups_fields_per_target() {
        let run = run();
        let changes = vec![
            RequestedChange {
                target_id: TargetId::Tc(TcId::new(1)),
                field: RevisableField::Priority,
                new_value: "P1".into(),
                reason: DEFAULT_REASON.into(),
            },
            RequestedChange {
                target_id: TargetId::Tc(TcId::new(1)),
                field: RevisableField::HumanNote,
                new_value: "Covers refunds".into(),
                reason: DEFAULT_REASON.into(),
            },
            RequestedChange {
                target_id: TargetId::Tc(TcId::new(1)),
                field: RevisableField::Priority,
                new_value: "P2".into(),
                reason: DEFAULT_REASON.into(),
            },
        ];
        let plan = derive_execution_plan(&changes, &run);
        assert_eq!(plan.change_scope.len(), 1);
        assert_eq!(
            plan.change_scope[0].allowed_fields,
            vec![RevisableField::Priority, RevisableField::HumanNote]
        );
        assert_eq!(plan.forbidden_changes, FORBIDDEN_FIELDS);
        assert_eq!(plan.validation_profile, VALIDATION_PROFILE);
    }

    #[test]
    fn test_plan_withholds_severity_below_floor_or_without_risk() {
        let run = run();
        let changes = vec![
            RequestedChange {
                target_id: TargetId::Req(ReqId::new(1)),
                field: RevisableField::Severity,
                new_value: "low".into(),
                reason: "Rarely used".into(),
            },
            RequestedChange {
                target_id: TargetId::Req(ReqId::new(2)),
                field: RevisableField::Severity,
                new_value: "high".into(),
                reason: "Finance depends on it".into(),
            },
            RequestedChange {
                target_id: TargetId::Req(ReqId::new(1)),
                field: RevisableField::SeverityBasis,
                new_value: "Order page is critical".into(),
                reason: DEFAULT_REASON.into(),
            },
        ];
        let plan = derive_execution_plan(&changes, &run);
        assert_eq!(plan.withheld.len(), 2);
        assert!(plan.withheld[0].reason.contains("below the floor high"));
        assert!(plan.withheld[1].reason.contains("REQ-002 has no assessed risk"));
        assert!(plan.authorizes(TargetId::Req(ReqId::new(1)), RevisableField::SeverityBasis));
        assert!(!plan.authorizes(TargetId::Req(ReqId::new(1)), RevisableField::Severity));
    }

    #[test]
    fn test_plan_never_exceeds_requested_changes() {
        let run = run();
        let raw = output(
            "both",
            vec![
                change("TC-002", "human_note", "Flaky on Safari"),
                change("REQ-001", "severity", "high"),
            ],
            vec!["TC-001"],
        );
        let parsed = parse_classifier_output(&raw, &run).unwrap();
        let plan = derive_execution_plan(&parsed.requested_changes, &run);
        for scope in &plan.change_scope {
            for field in &scope.allowed_fields {
                assert!(
                    parsed
                        .requested_changes
                        .iter()
                        .any(|c| c.target_id == scope.target_id && c.field == *field)
                );
            }
        }
        assert_eq!(plan.change_scope.len(), 2);
    }
}
