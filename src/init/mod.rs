//! `qaforge init`: create the `.qaforge/` directory in a project.
//!
//! ```text
//! .qaforge/
//! ├── qaforge.toml     # Configuration (defaults)
//! ├── runs/            # One directory per run
//! ├── prompts/         # Optional prompt overrides
//! └── logs/            # Daily log files
//! ```
//!
//! `runs/` and `logs/` live in the store directory, which is `.qaforge/`
//! unless `[store] dir` says otherwise.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE, LOGS_DIR, QAFORGE_DIR, QaforgeToml};
use crate::generate::{GenerationKind, PromptSet};
use crate::store::RUNS_DIR;

#[derive(Debug)]
pub struct InitResult {
    pub qaforge_dir: PathBuf,
    /// False when the directory already existed
    pub created: bool,
    /// Prompt files written by this call
    pub prompts_written: Vec<PathBuf>,
}

/// Initialize `project_dir`. Existing files are never overwritten.
///
/// With `with_prompts`, the embedded default prompts are copied into
/// `prompts/` so they can be edited in place.
pub fn init_project(project_dir: &Path, with_prompts: bool) -> Result<InitResult> {
    let qaforge_dir = project_dir.join(QAFORGE_DIR);
    let created = !qaforge_dir.exists();

    let prompts_dir = qaforge_dir.join("prompts");
    create_dir(&prompts_dir)?;

    let config_file = qaforge_dir.join(CONFIG_FILE);
    if !config_file.exists() {
        QaforgeToml::default().save(&config_file)?;
    }

    let store_dir = project_dir.join(QaforgeToml::load(&config_file)?.store.dir);
    for sub in [RUNS_DIR, LOGS_DIR] {
        create_dir(&store_dir.join(sub))?;
    }

    let mut prompts_written = Vec::new();
    if with_prompts {
        for kind in GenerationKind::ALL {
            let path = prompts_dir.join(PromptSet::file_name(kind));
            if path.exists() {
                continue;
            }
            let prompt = PromptSet::default_prompt(kind)
                .with_context(|| format!("No embedded prompt for {}", kind))?;
            std::fs::write(&path, prompt)
                .with_context(|| format!("Failed to write prompt: {}", path.display()))?;
            prompts_written.push(path);
        }
    }

    Ok(InitResult {
        qaforge_dir,
        created,
        prompts_written,
    })
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(QAFORGE_DIR).join(CONFIG_FILE).exists()
}
