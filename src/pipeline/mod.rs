//! Pipeline coordinator: drives Intake → Risk → Review against a run.
//!
//! Each transition gathers the stage's declared inputs from the run, calls
//! the generator once, validates the candidate and commits it. A failed
//! generation or a rejected candidate leaves the run exactly as it was; the
//! caller decides whether to try again.
//!
//! | Stage  | Receives                                   | From state              |
//! |--------|--------------------------------------------|-------------------------|
//! | intake | source document                            | new run / EMPTY         |
//! | risk   | requirements, project context, next TC id  | INTAKE_DONE, RISK_DONE  |
//! | review | full intake + risk artifacts, metadata     | RISK_DONE, REVIEW_DONE  |

pub mod state;

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::{GenerationError, PipelineError, StoreError};
use crate::generate::{GenerationKind, GenerationRequest, Generator, PromptSet};
use crate::ids::next_tc_id;
use crate::plan::Run;
use crate::render::ReviewPayload;
use crate::session::Session;
use crate::validate::validate;
use state::{RunState, Stage};

pub struct Pipeline {
    generator: Arc<dyn Generator>,
    prompts: PromptSet,
    timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            prompts: PromptSet::embedded(),
            timeout: None,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Bound every generator call; expiry is a generation failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stage 1. Starts a run for `document` unless the session's run is an
    /// EMPTY run over the very same document, which is retried in place.
    pub async fn intake(
        &self,
        session: &mut Session,
        document: &str,
        supersede: bool,
    ) -> Result<Run, PipelineError> {
        let run = match session.current_if_any()? {
            Some(run) if run.state == RunState::Empty && run.source_document == document => {
                info!(run_id = %run.run_id, "retrying intake on empty run");
                run
            }
            _ => session.store().create_run(document, supersede)?,
        };
        session.adopt(&run);
        self.advance(session, run, Stage::Intake).await
    }

    /// Stage 2, from INTAKE_DONE or again from RISK_DONE.
    pub async fn risk(&self, session: &mut Session) -> Result<Run, PipelineError> {
        let run = session.current()?;
        self.advance(session, run, Stage::Risk).await
    }

    /// Stage 3, from RISK_DONE or again from REVIEW_DONE.
    pub async fn review(&self, session: &mut Session) -> Result<Run, PipelineError> {
        let run = session.current()?;
        self.advance(session, run, Stage::Review).await
    }

    async fn advance(
        &self,
        session: &mut Session,
        run: Run,
        stage: Stage,
    ) -> Result<Run, PipelineError> {
        if !run.state.accepts(stage) {
            return Err(StoreError::InvalidState {
                run_id: run.run_id,
                attempted: format!("{} stage", stage),
                state: run.state,
            }
            .into());
        }

        let kind = GenerationKind::from(stage);
        let raw = self.generate(kind, stage_payload(&run, stage)).await?;

        let artifact = validate(stage, &raw, &run).map_err(|violations| {
            warn!(
                run_id = %run.run_id,
                stage = %stage,
                violations = violations.len(),
                "candidate rejected"
            );
            PipelineError::Validation { stage, violations }
        })?;

        let committed = session.store().commit_stage(&run, artifact)?;
        session.adopt(&committed);
        Ok(committed)
    }

    /// One generator call for `kind`, with its system prompt and the
    /// configured timeout.
    pub async fn generate(
        &self,
        kind: GenerationKind,
        payload: Value,
    ) -> Result<String, PipelineError> {
        let request = GenerationRequest {
            kind,
            system_prompt: self.prompts.load(kind)?,
            payload,
        };
        debug!(kind = %kind, prompt_bytes = request.system_prompt.len(), "calling generator");

        let call = self.generator.generate(&request);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(GenerationError::Timeout {
                    secs: limit.as_secs(),
                })),
            None => call.await,
        };

        result.map_err(|source| {
            warn!(kind = %kind, error = %source, "generation failed");
            PipelineError::GenerationFailure { kind, source }
        })
    }
}

/// The declared input of `stage`, drawn from `run`.
///
/// Risk never sees the plan context; review sees both upstream artifacts.
pub fn stage_payload(run: &Run, stage: Stage) -> Value {
    match stage {
        Stage::Intake => json!({ "document": run.source_document }),
        Stage::Risk => json!({
            "requirements": run.requirements,
            "project_context": run.project_context,
            "next_tc_id": next_tc_id(run).to_string(),
        }),
        Stage::Review => match ReviewPayload::from_run(run) {
            Some(payload) => json!(payload),
            None => Value::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{IntakeArtifact, PlanContext, StageArtifact};

    fn run_after_intake() -> Run {
        let mut run = Run::new("RUN-20260101-001", "# PRD");
        run.apply(StageArtifact::Intake(IntakeArtifact {
            plan_context: PlanContext {
                purpose: "Secret purpose".into(),
                in_scope: vec![],
                out_of_scope: vec![],
            },
            project_context: None,
            requirements: vec![],
        }));
        run
    }

    #[test]
    fn test_risk_payload_excludes_plan_context() {
        let payload = stage_payload(&run_after_intake(), Stage::Risk);
        assert!(payload.get("plan_context").is_none());
        assert!(payload.get("requirements").is_some());
        assert!(payload["project_context"].is_null());
        assert_eq!(payload["next_tc_id"], "TC-001");
        assert!(!payload.to_string().contains("Secret purpose"));
    }

    #[test]
    fn test_review_payload_carries_both_artifacts() {
        let payload = stage_payload(&run_after_intake(), Stage::Review);
        assert_eq!(payload["intake"]["plan_context"]["purpose"], "Secret purpose");
        assert!(payload["risk"].is_array());
        assert_eq!(payload["artifact_id"], "qaforge-RUN-20260101-001");
    }

    #[test]
    fn test_intake_payload_is_the_document() {
        let run = Run::new("RUN-20260101-001", "# PRD\n");
        assert_eq!(stage_payload(&run, Stage::Intake)["document"], "# PRD\n");
    }

    #[test]
    fn test_review_payload_is_null_before_intake() {
        let run = Run::new("RUN-20260101-001", "# PRD\n");
        assert!(stage_payload(&run, Stage::Review).is_null());
    }
}
