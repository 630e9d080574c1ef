//! Stage 2 contract: risk entries, test cases and the derivation gates.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::{Checker, at, decode_json, index};
use crate::errors::Violation;
use crate::gates;
use crate::ids::{ReqId, TcId, verify_sequence};
use crate::plan::{
    Priority, RiskArtifact, RiskEntry, Run, Severity, Surface, TestCase, TestType,
};

pub fn validate_risk(raw: &str, run: &Run) -> Result<RiskArtifact, Vec<Violation>> {
    let value = decode_json(raw)?;
    let mut c = Checker::new();

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(obj) => match c.array(obj, "risk_entries", "") {
            Some(items) => items,
            None => return Err(c.into_violations()),
        },
        _ => {
            c.schema("$", "expected an array of risk entries");
            return Err(c.into_violations());
        }
    };

    // Structural pass: every entry is read in full before any cross-check.
    let mut seen: BTreeSet<ReqId> = BTreeSet::new();
    let mut entries: Vec<(String, RiskEntry)> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let path = index("risk_entries", i);
        let Some(obj) = c.object(item, &path) else {
            continue;
        };
        let req_id = c.id::<ReqId>(obj, "req_id", &path);
        if let Some(req_id) = req_id {
            if !seen.insert(req_id) {
                c.schema(at(&path, "req_id"), format!("duplicate risk entry for {}", req_id));
            } else if run.requirement(req_id).is_none() {
                c.schema(
                    at(&path, "req_id"),
                    format!("{} does not match any requirement in this run", req_id),
                );
            }
        }
        if let Some(entry) = risk_entry(&mut c, obj, req_id, &path) {
            entries.push((path, entry));
        }
    }

    for req in &run.requirements {
        if !seen.contains(&req.req_id) {
            c.schema("risk_entries", format!("no risk entry for {}", req.req_id));
        }
    }

    // Contract pass over the entries that parsed.
    let mut tc_ids: Vec<(String, TcId)> = Vec::new();
    for (path, entry) in &entries {
        check_entry(&mut c, run, path, entry);
        for (j, tc) in entry.test_cases.iter().enumerate() {
            tc_ids.push((at(&index(&at(path, "test_cases"), j), "tc_id"), tc.tc_id));
        }
    }
    c.extend(verify_sequence(&tc_ids, run.tc_counter, &run.committed_tc_ids()));

    c.finish(RiskArtifact {
        risk_entries: entries.into_iter().map(|(_, entry)| entry).collect(),
    })
}

fn risk_entry(
    c: &mut Checker,
    obj: &Map<String, Value>,
    req_id: Option<ReqId>,
    path: &str,
) -> Option<RiskEntry> {
    let risk = c.nullable_string(obj, "risk", path);
    let severity = c.nullable_enum::<Severity>(obj, "severity", path);
    let severity_basis = c.nullable_string(obj, "severity_basis", path);
    let severity_locked = c.optional_flag(obj, "severity_locked", path);

    let mut test_cases = Some(Vec::new());
    if let Some(items) = c.array(obj, "test_cases", path) {
        let cases_path = at(path, "test_cases");
        for (j, item) in items.iter().enumerate() {
            let tc = test_case(c, item, &index(&cases_path, j));
            match (tc, test_cases.as_mut()) {
                (Some(tc), Some(list)) => list.push(tc),
                _ => test_cases = None,
            }
        }
    } else {
        test_cases = None;
    }

    let (risk, severity, severity_basis) = (risk?, severity?, severity_basis?);
    let present = [risk.is_some(), severity.is_some(), severity_basis.is_some()];
    if present.iter().any(|p| *p) && !present.iter().all(|p| *p) {
        c.schema(
            path,
            "risk, severity and severity_basis must be jointly null or jointly set",
        );
        return None;
    }

    Some(RiskEntry {
        req_id: req_id?,
        risk,
        severity,
        severity_basis,
        severity_locked: severity_locked?,
        test_cases: test_cases?,
    })
}

fn test_case(c: &mut Checker, item: &Value, path: &str) -> Option<TestCase> {
    let obj = c.object(item, path)?;
    let tc_id = c.id::<TcId>(obj, "tc_id", path);
    let req_id = c.id::<ReqId>(obj, "req_id", path);
    let objective = c.string(obj, "objective", path);
    let test_type = c.enum_value::<TestType>(obj, "type", path);
    let surface = c.enum_value::<Surface>(obj, "surface", path);
    let priority = c.enum_value::<Priority>(obj, "priority", path);
    let human_note = c.nullable_string(obj, "human_note", path);
    let fallback_applied = c.optional_flag(obj, "fallback_applied", path);

    Some(TestCase {
        tc_id: tc_id?,
        req_id: req_id?,
        objective: objective?,
        test_type: test_type?,
        surface: surface?,
        priority: priority?,
        human_note: human_note?,
        fallback_applied: fallback_applied?,
    })
}

fn check_entry(c: &mut Checker, run: &Run, path: &str, entry: &RiskEntry) {
    let requirement = run.requirement(entry.req_id);

    if let Some(req) = requirement {
        if let Err(reason) =
            gates::check_severity(req, run.project_context.as_ref(), entry.severity)
        {
            c.push(Violation::derivation(at(path, "severity"), reason));
        }
    }

    match run.risk_entry(entry.req_id).filter(|e| e.severity_locked) {
        Some(locked) => {
            if entry.severity != locked.severity {
                c.schema(
                    at(path, "severity"),
                    format!(
                        "{} severity is locked at {} by a reviewer",
                        entry.req_id,
                        locked.severity.map_or("null".to_string(), |s| s.to_string())
                    ),
                );
            }
        }
        None => {
            if entry.severity_locked {
                c.schema(
                    at(path, "severity_locked"),
                    "severity_locked can only be set by a reviewer",
                );
            }
        }
    }

    for (j, tc) in entry.test_cases.iter().enumerate() {
        let tc_path = index(&at(path, "test_cases"), j);

        if tc.req_id != entry.req_id {
            c.schema(
                at(&tc_path, "req_id"),
                format!("{} belongs to {}, not {}", tc.tc_id, entry.req_id, tc.req_id),
            );
        }

        if tc.fallback_applied {
            let note_ok = tc.human_note.as_deref().is_some_and(|n| !n.trim().is_empty());
            if tc.test_type != TestType::Exploratory || tc.surface != Surface::Workflow || !note_ok
            {
                c.schema(
                    &tc_path,
                    "a fallback test case must be exploratory/workflow with an explanatory human_note",
                );
            }
        }

        if tc.test_type == TestType::Exploratory {
            if let Some(req) = requirement {
                if !gates::allow_exploratory(req, entry) {
                    c.push(Violation::derivation(
                        at(&tc_path, "type"),
                        format!(
                            "exploratory test case {} is not allowed: {} has no risk and no ambiguity flags",
                            tc.tc_id, entry.req_id
                        ),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ViolationKind;
    use crate::plan::{
        IntakeArtifact, PlanContext, ProjectContext, Requirement, StageArtifact,
    };
    use serde_json::json;

    fn requirement(n: u32, description: &str, flags: &[&str]) -> Requirement {
        Requirement {
            req_id: ReqId::new(n),
            prd_ref: format!("§{}", n),
            description: description.into(),
            actors: vec!["Customer".into()],
            testable: true,
            ambiguity_flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn run_with(project_context: Option<ProjectContext>) -> Run {
        let mut run = Run::new("RUN-20260101-001", "# PRD");
        run.apply(StageArtifact::Intake(IntakeArtifact {
            plan_context: PlanContext {
                purpose: "p".into(),
                in_scope: vec![],
                out_of_scope: vec![],
            },
            project_context,
            requirements: vec![
                requirement(1, "Export the monthly report as CSV", &[]),
                requirement(2, "Display the order confirmation", &["'promptly' is vague"]),
            ],
        }));
        run
    }

    fn tc(id: &str, req: &str, test_type: &str) -> Value {
        json!({
            "tc_id": id,
            "req_id": req,
            "objective": "Verify behaviour",
            "type": test_type,
            "surface": "api",
            "priority": "P2",
            "human_note": null
        })
    }

    fn entry(req: &str, severity: Option<&str>, cases: Vec<Value>) -> Value {
        json!({
            "req_id": req,
            "risk": severity.map(|_| "Wrong data shown"),
            "severity": severity,
            "severity_basis": severity.map(|_| "Customer-facing"),
            "severity_locked": false,
            "test_cases": cases
        })
    }

    fn valid() -> Vec<Value> {
        vec![
            entry("REQ-001", None, vec![tc("TC-001", "REQ-001", "unit")]),
            entry(
                "REQ-002",
                Some("high"),
                vec![
                    tc("TC-002", "REQ-002", "e2e"),
                    tc("TC-003", "REQ-002", "exploratory"),
                ],
            ),
        ]
    }

    fn kinds(violations: &[Violation]) -> Vec<ViolationKind> {
        violations.iter().map(|v| v.kind).collect()
    }

    #[test]
    fn test_valid_risk_output_is_accepted() {
        let raw = Value::Array(valid()).to_string();
        let artifact = validate_risk(&raw, &run_with(None)).unwrap();
        assert_eq!(artifact.risk_entries.len(), 2);
        assert_eq!(artifact.risk_entries[1].test_cases.len(), 2);
    }

    #[test]
    fn test_wrapped_object_form_is_accepted() {
        let raw = json!({ "risk_entries": valid() }).to_string();
        assert!(validate_risk(&raw, &run_with(None)).is_ok());
    }

    #[test]
    fn test_missing_and_extra_entries_are_rejected() {
        let raw = Value::Array(vec![
            entry("REQ-001", None, vec![]),
            entry("REQ-007", None, vec![]),
        ])
        .to_string();
        let violations = validate_risk(&raw, &run_with(None)).unwrap_err();
        let messages: Vec<&str> = violations.iter().map(|v| v.message.as_str()).collect();
        assert!(messages.contains(&"REQ-007 does not match any requirement in this run"));
        assert!(messages.contains(&"no risk entry for REQ-002"));
    }

    #[test]
    fn test_duplicate_entries_are_rejected() {
        let mut entries = valid();
        entries.push(entry("REQ-001", None, vec![]));
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(None))
            .unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "duplicate risk entry for REQ-001");
    }

    #[test]
    fn test_enum_values_are_never_coerced() {
        let mut entries = valid();
        entries[0]["test_cases"][0]["surface"] = json!("frontend");
        entries[0]["test_cases"][0]["type"] = json!("smoke");
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(None))
            .unwrap_err();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].path, "risk_entries[0].test_cases[0].type");
        assert!(violations[1].message.contains("'frontend' is not a valid surface value"));
    }

    #[test]
    fn test_missing_surface_is_rejected_not_defaulted() {
        let mut entries = valid();
        entries[0]["test_cases"][0]
            .as_object_mut()
            .unwrap()
            .remove("surface");
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(None))
            .unwrap_err();
        assert_eq!(violations[0].message, "missing required field 'surface'");
    }

    #[test]
    fn test_partially_null_risk_is_rejected() {
        let mut entries = valid();
        entries[1]["severity_basis"] = Value::Null;
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(None))
            .unwrap_err();
        assert!(violations[0].message.contains("jointly null"));
    }

    #[test]
    fn test_exploratory_on_clean_requirement_is_a_derivation_violation() {
        let mut entries = valid();
        entries[0]["test_cases"][0]["type"] = json!("exploratory");
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(None))
            .unwrap_err();
        assert_eq!(kinds(&violations), vec![ViolationKind::Derivation]);
        assert_eq!(violations[0].path, "risk_entries[0].test_cases[0].type");
    }

    #[test]
    fn test_severity_below_floor_is_a_derivation_violation() {
        let ctx = ProjectContext {
            known_high_severity_areas: Some(vec!["Order Confirmation Page".into()]),
            ..Default::default()
        };
        let mut entries = valid();
        entries[1]["severity"] = json!("medium");
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(Some(ctx)))
            .unwrap_err();
        assert_eq!(kinds(&violations), vec![ViolationKind::Derivation]);
        assert_eq!(violations[0].path, "risk_entries[1].severity");
    }

    #[test]
    fn test_tc_ids_run_across_requirements() {
        let mut entries = valid();
        entries[1]["test_cases"][0]["tc_id"] = json!("TC-001");
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(None))
            .unwrap_err();
        assert_eq!(kinds(&violations), vec![ViolationKind::Sequence]);
        assert!(violations[0].message.contains("duplicate ID TC-001"));
    }

    #[test]
    fn test_rerun_must_not_reuse_committed_tc_ids() {
        let mut run = run_with(None);
        let first = validate_risk(&Value::Array(valid()).to_string(), &run).unwrap();
        run.apply(StageArtifact::Risk(first));

        let err = validate_risk(&Value::Array(valid()).to_string(), &run).unwrap_err();
        assert_eq!(err.len(), 3);
        assert!(err.iter().all(|v| v.message.contains("collides")));
    }

    #[test]
    fn test_test_case_must_belong_to_its_entry() {
        let mut entries = valid();
        entries[0]["test_cases"][0]["req_id"] = json!("REQ-002");
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(None))
            .unwrap_err();
        assert_eq!(violations[0].message, "TC-001 belongs to REQ-001, not REQ-002");
    }

    #[test]
    fn test_generator_cannot_set_a_lock() {
        let mut entries = valid();
        entries[1]["severity_locked"] = json!(true);
        let violations = validate_risk(&Value::Array(entries).to_string(), &run_with(None))
            .unwrap_err();
        assert_eq!(violations[0].path, "risk_entries[1].severity_locked");
    }

    #[test]
    fn test_fallback_must_be_exploratory_workflow_with_note() {
        let mut entries = valid();
        entries[1]["test_cases"][1]["fallback_applied"] = json!(true);
        let violations = validate_risk(&Value::Array(entries.clone()).to_string(), &run_with(None))
            .unwrap_err();
        assert!(violations[0].message.contains("fallback"));

        entries[1]["test_cases"][1]["surface"] = json!("workflow");
        entries[1]["test_cases"][1]["human_note"] = json!("Type unclear from PRD");
        assert!(validate_risk(&Value::Array(entries).to_string(), &run_with(None)).is_ok());
    }

    #[test]
    fn test_non_array_candidate_is_rejected() {
        let violations = validate_risk("\"nope\"", &run_with(None)).unwrap_err();
        assert_eq!(violations[0].path, "$");
    }
}
