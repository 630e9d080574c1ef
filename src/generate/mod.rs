//! The external generation collaborator.
//!
//! Each stage (and revision classification) is one call to a [`Generator`]:
//! a system prompt plus a JSON payload in, candidate text out. The generator
//! is injected, so everything downstream of it can be exercised with canned
//! output.
//!
//! Implementations:
//! - [`CommandGenerator`] — pipes a JSON envelope to a configured subprocess
//! - [`crate::render::TemplateRenderer`] — deterministic review rendering
//! - [`StageRouter`] — dispatches each kind to its own generator

pub mod command;
pub mod prompts;

pub use command::CommandGenerator;
pub use prompts::PromptSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::GenerationError;
use crate::pipeline::state::Stage;

/// What a generation call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Intake,
    Risk,
    Review,
    Revision,
}

impl GenerationKind {
    pub const ALL: [GenerationKind; 4] = [
        GenerationKind::Intake,
        GenerationKind::Risk,
        GenerationKind::Review,
        GenerationKind::Revision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Risk => "risk",
            Self::Review => "review",
            Self::Revision => "revision",
        }
    }
}

impl From<Stage> for GenerationKind {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Intake => Self::Intake,
            Stage::Risk => Self::Risk,
            Stage::Review => Self::Review,
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One call into the generator.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub system_prompt: String,
    pub payload: serde_json::Value,
}

/// Abstraction over the text-generation service.
/// Real implementation: `CommandGenerator`. Test doubles return canned output.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a candidate artifact. Failures are reported, never retried.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Routes each generation kind to a dedicated generator, with a fallback.
pub struct StageRouter {
    default: Arc<dyn Generator>,
    routes: HashMap<GenerationKind, Arc<dyn Generator>>,
}

impl StageRouter {
    pub fn new(default: Arc<dyn Generator>) -> Self {
        Self {
            default,
            routes: HashMap::new(),
        }
    }

    pub fn route(mut self, kind: GenerationKind, generator: Arc<dyn Generator>) -> Self {
        self.routes.insert(kind, generator);
        self
    }
}

#[async_trait]
impl Generator for StageRouter {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let generator = self.routes.get(&request.kind).unwrap_or(&self.default);
        generator.generate(request).await
    }
}

/// Remove one Markdown code fence wrapping the whole output, if present.
///
/// Only a fence that opens the output and closes it is stripped; fences
/// inside the text are left alone.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `markdown`) on the opening line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}
