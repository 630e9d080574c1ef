//! qaforge: contract enforcement and run state for a three-stage QA
//! test-plan pipeline (Intake → Risk → Review), plus a revision classifier
//! for reviewer feedback.
//!
//! Generation is delegated to an injected [`generate::Generator`]; everything
//! it produces is treated as an untrusted candidate and committed only after
//! schema validation, ID sequencing and derivation gates pass.

pub mod config;
pub mod errors;
pub mod gates;
pub mod generate;
pub mod ids;
pub mod init;
pub mod logging;
pub mod pipeline;
pub mod plan;
pub mod render;
pub mod revision;
pub mod session;
pub mod store;
pub mod validate;

pub use errors::{GenerationError, PipelineError, StoreError, Violation, ViolationKind};
pub use pipeline::Pipeline;
pub use pipeline::state::{RunState, Stage};
pub use plan::Run;
pub use revision::RevisionClassifier;
pub use session::Session;
pub use store::RunStore;
