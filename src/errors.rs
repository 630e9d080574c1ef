//! Typed error hierarchy for qaforge.
//!
//! Three top-level enums cover the three subsystems:
//! - `StoreError` — run store persistence, locking and lifecycle failures
//! - `GenerationError` — failures of the external generation collaborator
//! - `PipelineError` — stage transitions and revision classification
//!
//! Contract violations found in a generated artifact are values, not errors:
//! the validator collects every [`Violation`] it finds and the pipeline wraps
//! them in [`PipelineError::Validation`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generate::GenerationKind;
use crate::pipeline::state::{RunState, Stage};

/// Which contract a generated artifact broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    /// Structural problem: missing field, wrong type, value outside a closed enum.
    Schema,
    /// ID collision, malformed or out-of-order identifier.
    Sequence,
    /// Derived content that upstream flags do not permit.
    Derivation,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Schema => "schema",
            Self::Sequence => "sequence",
            Self::Derivation => "derivation",
        };
        write!(f, "{}", s)
    }
}

/// A single contract violation, located by a JSON-path-like string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Schema,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn sequence(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Sequence,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn derivation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Derivation,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.path, self.message)
    }
}

/// Errors from the run store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run {run_id} not found")]
    RunNotFound { run_id: String },

    #[error("No current run. Start one with `qaforge intake <document>`")]
    NoCurrentRun,

    #[error("Run {current} is current; supersede it explicitly to start a new run")]
    RunConflict { current: String },

    #[error("Run {run_id} is stale: expected revision {expected}, store has {found}")]
    StaleRun {
        run_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Cannot apply {attempted} while run {run_id} is {state}")]
    InvalidState {
        run_id: String,
        attempted: String,
        state: RunState,
    },

    #[error("Requirement {req_id} has no risk entry in run {run_id}")]
    UnknownRequirement { run_id: String, req_id: String },

    #[error("Requirement {req_id} has no assessed risk; its severity cannot be set")]
    NoAssessedRisk { req_id: String },

    #[error("Severity {requested} for {req_id} is below the required floor {floor}")]
    BelowSeverityFloor {
        req_id: String,
        requested: String,
        floor: String,
    },

    #[error("Source document of run {run_id} does not match its recorded hash")]
    SourceMismatch { run_id: String },

    #[error("Failed to {action} at {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt run record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Errors from the external generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Failed to start generator `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Generator exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Generator I/O failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("Generator output was not valid UTF-8")]
    InvalidUtf8,

    #[error("Generator timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{kind} generation is not supported by this generator")]
    Unsupported { kind: GenerationKind },

    #[error("Invalid generation payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// The generator failed without a usable exit status, e.g. a command
    /// killed by a signal or an in-process provider reporting an error.
    #[error("Provider error: {0}")]
    Provider(String),
}

/// Errors from stage transitions and revision classification.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} output rejected with {} violation(s)", .violations.len())]
    Validation {
        stage: Stage,
        violations: Vec<Violation>,
    },

    #[error("Revision request rejected with {} violation(s)", .violations.len())]
    InvalidRevision { violations: Vec<Violation> },

    #[error("{kind} generation failed: {source}")]
    GenerationFailure {
        kind: GenerationKind,
        #[source]
        source: GenerationError,
    },

    #[error("Failed to load {kind} prompt from {path}: {source}")]
    Prompt {
        kind: GenerationKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Reviewer message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Violations carried by a rejected artifact or revision, if any.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Validation { violations, .. } | Self::InvalidRevision { violations } => {
                violations
            }
            _ => &[],
        }
    }

    /// True when the run was left untouched because a transition was taken out of order.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Store(StoreError::InvalidState { .. }))
    }

    pub fn is_stale_run(&self) -> bool {
        matches!(self, Self::Store(StoreError::StaleRun { .. }))
    }
}
