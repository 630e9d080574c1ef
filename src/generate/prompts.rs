//! System prompts for each generation kind.
//!
//! Defaults are compiled in from `prompts/<kind>.md`. A project can replace
//! any of them by placing a file of the same name in `.qaforge/prompts/`.

use rust_embed::RustEmbed;
use std::io;
use std::path::{Path, PathBuf};

use super::GenerationKind;
use crate::errors::PipelineError;

#[derive(RustEmbed)]
#[folder = "prompts/"]
struct DefaultPrompts;

/// Resolves the system prompt for a generation kind.
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    override_dir: Option<PathBuf>,
}

impl PromptSet {
    /// Embedded defaults only.
    pub fn embedded() -> Self {
        Self::default()
    }

    /// Embedded defaults, overridden by `<dir>/<kind>.md` where present.
    pub fn with_overrides(dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(dir.into()),
        }
    }

    pub fn file_name(kind: GenerationKind) -> String {
        format!("{}.md", kind.as_str())
    }

    /// Path of the override file for `kind`, if an override directory is set.
    pub fn override_path(&self, kind: GenerationKind) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|dir| dir.join(Self::file_name(kind)))
    }

    pub fn load(&self, kind: GenerationKind) -> Result<String, PipelineError> {
        if let Some(path) = self.override_path(kind) {
            if path.exists() {
                return std::fs::read_to_string(&path)
                    .map_err(|source| PipelineError::Prompt { kind, path, source });
            }
        }
        Self::default_prompt(kind).ok_or_else(|| PipelineError::Prompt {
            kind,
            path: Path::new("prompts").join(Self::file_name(kind)),
            source: io::Error::new(io::ErrorKind::NotFound, "embedded prompt missing"),
        })
    }

    /// The compiled-in prompt for `kind`.
    pub fn default_prompt(kind: GenerationKind) -> Option<String> {
        DefaultPrompts::get(&Self::file_name(kind))
            .map(|file| String::from_utf8_lossy(&file.data).into_owned())
    }
}
