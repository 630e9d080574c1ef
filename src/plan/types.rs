//! Artifact types produced by the three stages.
//!
//! Field names follow the JSON contract the generator is asked to emit, so
//! these types serialize to exactly the shape a stage payload carries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{ReqId, TcId};
use crate::pipeline::state::Stage;

/// Error returned when a value falls outside one of the closed enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEnumValue {
    pub field: &'static str,
    pub value: String,
    pub allowed: &'static [&'static str],
}

impl fmt::Display for InvalidEnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is not a valid {} value. Valid values are: {}",
            self.value,
            self.field,
            self.allowed.join(", ")
        )
    }
}

impl std::error::Error for InvalidEnumValue {}

/// Risk severity. Ordered so that `High` is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const VALUES: &'static [&'static str] = &["high", "medium", "low"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(InvalidEnumValue {
                field: "severity",
                value: s.to_string(),
                allowed: Self::VALUES,
            }),
        }
    }
}

/// Kind of test a test case describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Unit,
    Integration,
    E2e,
    Exploratory,
    NonFunctional,
}

impl TestType {
    pub const VALUES: &'static [&'static str] =
        &["unit", "integration", "e2e", "exploratory", "non_functional"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Integration => "integration",
            Self::E2e => "e2e",
            Self::Exploratory => "exploratory",
            Self::NonFunctional => "non_functional",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TestType {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unit" => Ok(Self::Unit),
            "integration" => Ok(Self::Integration),
            "e2e" => Ok(Self::E2e),
            "exploratory" => Ok(Self::Exploratory),
            "non_functional" => Ok(Self::NonFunctional),
            _ => Err(InvalidEnumValue {
                field: "type",
                value: s.to_string(),
                allowed: Self::VALUES,
            }),
        }
    }
}

/// Layer of the system a test case exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Ui,
    Api,
    Service,
    Workflow,
}

impl Surface {
    pub const VALUES: &'static [&'static str] = &["ui", "api", "service", "workflow"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Api => "api",
            Self::Service => "service",
            Self::Workflow => "workflow",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Surface {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ui" => Ok(Self::Ui),
            "api" => Ok(Self::Api),
            "service" => Ok(Self::Service),
            "workflow" => Ok(Self::Workflow),
            _ => Err(InvalidEnumValue {
                field: "surface",
                value: s.to_string(),
                allowed: Self::VALUES,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
}

impl Priority {
    pub const VALUES: &'static [&'static str] = &["P1", "P2", "P3"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            "P3" => Ok(Self::P3),
            _ => Err(InvalidEnumValue {
                field: "priority",
                value: s.to_string(),
                allowed: Self::VALUES,
            }),
        }
    }
}

/// Purpose and scope of the plan, derived once by the intake stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanContext {
    pub purpose: String,
    pub in_scope: Vec<String>,
    pub out_of_scope: Vec<String>,
}

/// Optional product signals used for severity floors. A null field means
/// "no signal", never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    #[serde(default)]
    pub primary_user_journey: Option<String>,
    #[serde(default)]
    pub revenue_critical_paths: Option<Vec<String>>,
    #[serde(default)]
    pub known_high_severity_areas: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub req_id: ReqId,
    pub prd_ref: String,
    pub description: String,
    pub actors: Vec<String>,
    pub testable: bool,
    pub ambiguity_flags: Vec<String>,
}

impl Requirement {
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguity_flags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub tc_id: TcId,
    pub req_id: ReqId,
    pub objective: String,
    #[serde(rename = "type")]
    pub test_type: TestType,
    pub surface: Surface,
    pub priority: Priority,
    pub human_note: Option<String>,
    /// Set by the generator when it substituted the `exploratory`/`workflow`
    /// fallback for a case it could not classify.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_applied: bool,
}

/// Risk assessment and test cases for one requirement.
///
/// `risk`, `severity` and `severity_basis` are jointly null or jointly set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskEntry {
    pub req_id: ReqId,
    pub risk: Option<String>,
    pub severity: Option<Severity>,
    pub severity_basis: Option<String>,
    #[serde(default)]
    pub severity_locked: bool,
    pub test_cases: Vec<TestCase>,
}

impl RiskEntry {
    pub fn has_risk(&self) -> bool {
        self.risk.is_some()
    }
}

/// Stage 1 output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeArtifact {
    pub plan_context: PlanContext,
    #[serde(default)]
    pub project_context: Option<ProjectContext>,
    pub requirements: Vec<Requirement>,
}

/// Stage 2 output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskArtifact {
    pub risk_entries: Vec<RiskEntry>,
}

/// Stage 3 output: the rendered Markdown test plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewArtifact {
    pub document: String,
}

/// A validated artifact ready to be committed to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageArtifact {
    Intake(IntakeArtifact),
    Risk(RiskArtifact),
    Review(ReviewArtifact),
}

impl StageArtifact {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Intake(_) => Stage::Intake,
            Self::Risk(_) => Stage::Risk,
            Self::Review(_) => Stage::Review,
        }
    }
}
