//! Stage 1 contract: plan context, project context and requirements.

use serde_json::{Map, Value};

use super::{Checker, at, decode_json, index};
use crate::errors::Violation;
use crate::ids::{ReqId, verify_sequence};
use crate::plan::{IntakeArtifact, PlanContext, ProjectContext, Requirement, Run};

pub fn validate_intake(raw: &str, run: &Run) -> Result<IntakeArtifact, Vec<Violation>> {
    let value = decode_json(raw)?;
    let mut c = Checker::new();
    let Some(root) = c.object(&value, "$") else {
        return Err(c.into_violations());
    };

    let plan_context = plan_context(&mut c, root);
    let project_context = project_context(&mut c, root);

    let mut requirements = Vec::new();
    let mut ids = Vec::new();
    if let Some(items) = c.array(root, "requirements", "") {
        if items.is_empty() {
            c.schema("requirements", "no requirements were extracted");
        }
        for (i, item) in items.iter().enumerate() {
            let path = index("requirements", i);
            if let Some(req) = requirement(&mut c, item, &path) {
                ids.push((at(&path, "req_id"), req.req_id));
                requirements.push(req);
            }
        }
    }
    c.extend(verify_sequence(&ids, run.req_counter, &run.req_ids()));

    match (plan_context, project_context) {
        (Some(plan_context), Some(project_context)) => c.finish(IntakeArtifact {
            plan_context,
            project_context,
            requirements,
        }),
        _ => Err(c.into_violations()),
    }
}

fn plan_context(c: &mut Checker, root: &Map<String, Value>) -> Option<PlanContext> {
    let obj = c.field(root, "plan_context", "")?;
    let obj = c.object(obj, "plan_context")?;
    let purpose = c.string(obj, "purpose", "plan_context");
    let in_scope = c.string_list(obj, "in_scope", "plan_context");
    let out_of_scope = c.string_list(obj, "out_of_scope", "plan_context");
    Some(PlanContext {
        purpose: purpose?,
        in_scope: in_scope?,
        out_of_scope: out_of_scope?,
    })
}

/// `Some(None)` when the context is absent or null; `None` on a violation.
fn project_context(c: &mut Checker, root: &Map<String, Value>) -> Option<Option<ProjectContext>> {
    let obj = match root.get("project_context") {
        None | Some(Value::Null) => return Some(None),
        Some(value) => c.object(value, "project_context")?,
    };
    let path = "project_context";

    let journey = match obj.get("primary_user_journey") {
        None | Some(Value::Null) => Some(None),
        Some(_) => c.string(obj, "primary_user_journey", path).map(Some),
    };
    let revenue = c.optional_string_list(obj, "revenue_critical_paths", path);
    let high = c.optional_string_list(obj, "known_high_severity_areas", path);

    Some(Some(ProjectContext {
        primary_user_journey: journey?,
        revenue_critical_paths: revenue?,
        known_high_severity_areas: high?,
    }))
}

fn requirement(c: &mut Checker, item: &Value, path: &str) -> Option<Requirement> {
    let obj = c.object(item, path)?;
    let req_id = c.id::<ReqId>(obj, "req_id", path);
    let prd_ref = c.string(obj, "prd_ref", path);
    let description = c.string(obj, "description", path);
    let actors = c.string_list(obj, "actors", path);
    let testable = c.boolean(obj, "testable", path);
    let ambiguity_flags = c.string_list(obj, "ambiguity_flags", path);

    if let Some(d) = &description {
        if d.trim().is_empty() {
            c.schema(at(path, "description"), "description is empty");
            return None;
        }
    }

    Some(Requirement {
        req_id: req_id?,
        prd_ref: prd_ref?,
        description: description?,
        actors: actors?,
        testable: testable?,
        ambiguity_flags: ambiguity_flags?,
    })
}
