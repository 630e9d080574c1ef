//! Stage names and the run lifecycle state machine.
//!
//! ```text
//! EMPTY -> INTAKE_DONE -> RISK_DONE -> REVIEW_DONE
//! ```
//!
//! Risk may be re-run from `RISK_DONE` and Review re-rendered from
//! `REVIEW_DONE`; nothing else moves backwards except a reviewer's severity
//! override, which returns a reviewed run to `RISK_DONE`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three generation stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Requirements document to plan context and requirements.
    Intake,
    /// Requirements to risk entries and test cases.
    Risk,
    /// Intake and risk artifacts to the rendered test plan.
    Review,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Intake, Stage::Risk, Stage::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Risk => "risk",
            Self::Review => "review",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a run; advanced only by a successful stage commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    #[default]
    Empty,
    IntakeDone,
    RiskDone,
    ReviewDone,
}

impl RunState {
    /// Whether `stage` may be committed while the run is in this state.
    pub fn accepts(&self, stage: Stage) -> bool {
        matches!(
            (self, stage),
            (Self::Empty, Stage::Intake)
                | (Self::IntakeDone | Self::RiskDone, Stage::Risk)
                | (Self::RiskDone | Self::ReviewDone, Stage::Review)
        )
    }

    /// State reached once `stage` commits.
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::Intake => Self::IntakeDone,
            Stage::Risk => Self::RiskDone,
            Stage::Review => Self::ReviewDone,
        }
    }

    /// The next stage a caller would normally run, if any remains.
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            Self::Empty => Some(Stage::Intake),
            Self::IntakeDone => Some(Stage::Risk),
            Self::RiskDone => Some(Stage::Review),
            Self::ReviewDone => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::IntakeDone => "INTAKE_DONE",
            Self::RiskDone => "RISK_DONE",
            Self::ReviewDone => "REVIEW_DONE",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
