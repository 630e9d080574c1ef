//! Revision request and execution plan types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ids::{ParseIdError, ReqId, TcId};
use crate::plan::InvalidEnumValue;

/// Fields no revision may touch, whatever the reviewer asks.
pub const FORBIDDEN_FIELDS: &[&str] = &["req_id", "tc_id", "objective", "type", "surface"];

/// Checks a builder must run after applying an authorized patch.
pub const VALIDATION_PROFILE: &[&str] = &["schema", "cross_ref", "delta", "rationale"];

/// Default reason when the reviewer gave none.
pub const DEFAULT_REASON: &str = "Requested by reviewer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// The reviewer asks why; nothing changes.
    Explain,
    /// The reviewer asks for specific changes.
    Revise,
    Both,
}

impl Intent {
    pub const VALUES: &'static [&'static str] = &["explain", "revise", "both"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explain => "explain",
            Self::Revise => "revise",
            Self::Both => "both",
        }
    }

    pub fn requests_changes(&self) -> bool {
        matches!(self, Self::Revise | Self::Both)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Intent {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "explain" => Ok(Self::Explain),
            "revise" => Ok(Self::Revise),
            "both" => Ok(Self::Both),
            _ => Err(InvalidEnumValue {
                field: "intent",
                value: s.to_string(),
                allowed: Self::VALUES,
            }),
        }
    }
}

/// A requirement or test case named by a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetId {
    Req(ReqId),
    Tc(TcId),
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Req(id) => write!(f, "{}", id),
            Self::Tc(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for TargetId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("TC-") {
            s.parse().map(Self::Tc)
        } else {
            s.parse().map(Self::Req)
        }
    }
}

impl Serialize for TargetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fields a revision may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisableField {
    Priority,
    HumanNote,
    Severity,
    SeverityBasis,
}

impl RevisableField {
    pub const VALUES: &'static [&'static str] =
        &["priority", "human_note", "severity", "severity_basis"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::HumanNote => "human_note",
            Self::Severity => "severity",
            Self::SeverityBasis => "severity_basis",
        }
    }

    /// Test-case fields apply to TC targets, risk fields to REQ targets.
    pub fn applies_to(&self, target: &TargetId) -> bool {
        match self {
            Self::Priority | Self::HumanNote => matches!(target, TargetId::Tc(_)),
            Self::Severity | Self::SeverityBasis => matches!(target, TargetId::Req(_)),
        }
    }
}

impl fmt::Display for RevisableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RevisableField {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority" => Ok(Self::Priority),
            "human_note" => Ok(Self::HumanNote),
            "severity" => Ok(Self::Severity),
            "severity_basis" => Ok(Self::SeverityBasis),
            _ => Err(InvalidEnumValue {
                field: "revision field",
                value: s.to_string(),
                allowed: Self::VALUES,
            }),
        }
    }
}

/// One scoped change instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedChange {
    pub target_id: TargetId,
    pub field: RevisableField,
    pub new_value: String,
    pub reason: String,
}

/// A change the reviewer asked for that the classifier refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedChange {
    pub target_id: String,
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPolicy {
    pub delta_only: bool,
    pub disallow_unrequested_changes: bool,
}

impl Default for RevisionPolicy {
    fn default() -> Self {
        Self {
            delta_only: true,
            disallow_unrequested_changes: true,
        }
    }
}

/// Fields a builder may modify on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeScope {
    pub target_id: TargetId,
    pub allowed_fields: Vec<RevisableField>,
}

/// A requested change the plan does not authorize, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithheldChange {
    pub target_id: TargetId,
    pub field: RevisableField,
    pub new_value: String,
    pub reason: String,
}

/// The subset of requested changes a downstream builder may apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub change_scope: Vec<ChangeScope>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub withheld: Vec<WithheldChange>,
    pub forbidden_changes: Vec<String>,
    pub validation_profile: Vec<String>,
}

impl ExecutionPlan {
    pub fn authorizes(&self, target: TargetId, field: RevisableField) -> bool {
        self.change_scope
            .iter()
            .any(|scope| scope.target_id == target && scope.allowed_fields.contains(&field))
    }
}

/// Structured form of one reviewer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRequest {
    pub request_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub message: String,
    pub intent: Intent,
    pub requested_changes: Vec<RequestedChange>,
    pub explanation_targets: Vec<TargetId>,
    pub rejected_changes: Vec<RejectedChange>,
    pub policy: RevisionPolicy,
    /// Present for `revise` and `both`.
    pub execution_plan: Option<ExecutionPlan>,
}
