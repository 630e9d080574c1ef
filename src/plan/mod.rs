//! Test-plan data model: stage artifacts and the run record.

pub mod run;
pub mod types;

pub use run::{Run, hash_source};
pub use types::{
    IntakeArtifact, InvalidEnumValue, PlanContext, Priority, ProjectContext, Requirement,
    ReviewArtifact, RiskArtifact, RiskEntry, Severity, StageArtifact, Surface, TestCase,
    TestType,
};
