//! The durable per-run record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use super::types::{
    PlanContext, ProjectContext, Requirement, RiskEntry, StageArtifact, TestCase,
};
use crate::ids::{ReqId, SequenceId, TcId};
use crate::pipeline::state::RunState;

/// One pipeline run: the source document, every committed artifact and the
/// sequence counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Byte-identical copy of the input document.
    pub source_document: String,
    pub source_sha256: String,
    pub state: RunState,
    /// Bumped on every commit; a writer holding an older revision is stale.
    pub revision: u64,
    pub plan_context: Option<PlanContext>,
    pub project_context: Option<ProjectContext>,
    pub requirements: Vec<Requirement>,
    pub risk_entries: Vec<RiskEntry>,
    pub rendered_document: Option<String>,
    pub req_counter: u32,
    pub tc_counter: u32,
}

impl Run {
    pub fn new(run_id: impl Into<String>, source_document: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            created_at: now,
            updated_at: now,
            source_document: source_document.to_string(),
            source_sha256: hash_source(source_document),
            state: RunState::Empty,
            revision: 0,
            plan_context: None,
            project_context: None,
            requirements: Vec::new(),
            risk_entries: Vec::new(),
            rendered_document: None,
            req_counter: 0,
            tc_counter: 0,
        }
    }

    /// Whether the stored source still matches the hash taken at creation.
    pub fn source_intact(&self) -> bool {
        hash_source(&self.source_document) == self.source_sha256
    }

    pub fn requirement(&self, req_id: ReqId) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.req_id == req_id)
    }

    pub fn risk_entry(&self, req_id: ReqId) -> Option<&RiskEntry> {
        self.risk_entries.iter().find(|e| e.req_id == req_id)
    }

    pub fn test_case(&self, tc_id: TcId) -> Option<&TestCase> {
        self.test_cases().find(|tc| tc.tc_id == tc_id)
    }

    /// Every committed test case in document order.
    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.risk_entries.iter().flat_map(|e| e.test_cases.iter())
    }

    pub fn committed_tc_ids(&self) -> BTreeSet<TcId> {
        self.test_cases().map(|tc| tc.tc_id).collect()
    }

    pub fn req_ids(&self) -> BTreeSet<ReqId> {
        self.requirements.iter().map(|r| r.req_id).collect()
    }

    /// Apply a validated artifact: content, counters and state move together.
    pub(crate) fn apply(&mut self, artifact: StageArtifact) {
        let stage = artifact.stage();
        match artifact {
            StageArtifact::Intake(intake) => {
                if let Some(max) = intake.requirements.iter().map(|r| r.req_id.number()).max() {
                    self.req_counter = self.req_counter.max(max);
                }
                self.plan_context = Some(intake.plan_context);
                self.project_context = intake.project_context;
                self.requirements = intake.requirements;
            }
            StageArtifact::Risk(risk) => {
                let mut entries = risk.risk_entries;
                // Reviewer locks survive a re-run of the risk stage.
                for entry in &mut entries {
                    if let Some(previous) = self
                        .risk_entries
                        .iter()
                        .find(|e| e.req_id == entry.req_id && e.severity_locked)
                    {
                        entry.severity_locked = true;
                        entry.severity = previous.severity;
                        entry.severity_basis = previous.severity_basis.clone();
                    }
                }
                if let Some(max) = entries
                    .iter()
                    .flat_map(|e| e.test_cases.iter())
                    .map(|tc| tc.tc_id.number())
                    .max()
                {
                    self.tc_counter = self.tc_counter.max(max);
                }
                self.risk_entries = entries;
                self.rendered_document = None;
            }
            StageArtifact::Review(review) => {
                self.rendered_document = Some(review.document);
            }
        }
        self.state = RunState::after(stage);
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

pub fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::types::{
        IntakeArtifact, Priority, RiskArtifact, Severity, Surface, TestType,
    };

    fn requirement(n: u32) -> Requirement {
        Requirement {
            req_id: ReqId::new(n),
            prd_ref: format!("§{}", n),
            description: format!("Requirement {}", n),
            actors: vec!["User".into()],
            testable: true,
            ambiguity_flags: vec![],
        }
    }

    fn test_case(tc: u32, req: u32) -> TestCase {
        TestCase {
            tc_id: TcId::new(tc),
            req_id: ReqId::new(req),
            objective: "Check it".into(),
            test_type: TestType::Unit,
            surface: Surface::Api,
            priority: Priority::P2,
            human_note: None,
            fallback_applied: false,
        }
    }

    fn intake() -> StageArtifact {
        StageArtifact::Intake(IntakeArtifact {
            plan_context: PlanContext {
                purpose: "Test".into(),
                in_scope: vec![],
                out_of_scope: vec![],
            },
            project_context: None,
            requirements: vec![requirement(1), requirement(2)],
        })
    }

    #[test]
    fn test_new_run_is_empty_and_hashed() {
        let run = Run::new("RUN-20260101-001", "# PRD\n\nbody\r\n");
        assert_eq!(run.state, RunState::Empty);
        assert_eq!(run.revision, 0);
        assert!(run.source_intact());
        assert_eq!(run.source_document, "# PRD\n\nbody\r\n");
    }

    #[test]
    fn test_tampered_source_is_detected() {
        let mut run = Run::new("RUN-20260101-001", "original");
        run.source_document.push('!');
        assert!(!run.source_intact());
    }

    #[test]
    fn test_apply_intake_advances_counter_and_state() {
        let mut run = Run::new("RUN-20260101-001", "doc");
        run.apply(intake());
        assert_eq!(run.state, RunState::IntakeDone);
        assert_eq!(run.req_counter, 2);
        assert_eq!(run.revision, 1);
        assert!(run.requirement(ReqId::new(2)).is_some());
    }

    #[test]
    fn test_apply_risk_keeps_reviewer_locks() {
        let mut run = Run::new("RUN-20260101-001", "doc");
        run.apply(intake());
        run.risk_entries = vec![RiskEntry {
            req_id: ReqId::new(1),
            risk: Some("Data loss".into()),
            severity: Some(Severity::High),
            severity_basis: Some("Reviewer escalation".into()),
            severity_locked: true,
            test_cases: vec![test_case(1, 1)],
        }];
        run.tc_counter = 1;

        run.apply(StageArtifact::Risk(RiskArtifact {
            risk_entries: vec![RiskEntry {
                req_id: ReqId::new(1),
                risk: Some("Data loss".into()),
                severity: Some(Severity::High),
                severity_basis: Some("Generated basis".into()),
                severity_locked: false,
                test_cases: vec![test_case(2, 1), test_case(3, 1)],
            }],
        }));

        let entry = run.risk_entry(ReqId::new(1)).unwrap();
        assert!(entry.severity_locked);
        assert_eq!(entry.severity_basis.as_deref(), Some("Reviewer escalation"));
        assert_eq!(run.tc_counter, 3);
        assert_eq!(run.state, RunState::RiskDone);
        assert_eq!(
            run.committed_tc_ids().into_iter().collect::<Vec<_>>(),
            vec![TcId::new(2), TcId::new(3)]
        );
    }
}
