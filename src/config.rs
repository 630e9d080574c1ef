//! Project configuration read from `.qaforge/qaforge.toml`.
//!
//! Layered as file → environment → CLI. Every section is optional; a missing
//! file is the default configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [generator]
//! command = "llm"
//! args = ["--model", "local"]
//! timeout_secs = 120
//!
//! [review]
//! renderer = "template"
//!
//! [store]
//! dir = ".qaforge"
//! ```
//!
//! Environment overrides: `QAFORGE_GENERATOR_CMD`, `QAFORGE_TIMEOUT_SECS`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Directory holding configuration, prompt overrides and logs.
pub const QAFORGE_DIR: &str = ".qaforge";
pub const CONFIG_FILE: &str = "qaforge.toml";
/// Log directory, next to `runs/` inside the store directory.
pub const LOGS_DIR: &str = "logs";

pub const ENV_GENERATOR_CMD: &str = "QAFORGE_GENERATOR_CMD";
pub const ENV_TIMEOUT_SECS: &str = "QAFORGE_TIMEOUT_SECS";

/// How the review stage produces its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Built-in deterministic renderer.
    #[default]
    Template,
    /// The configured generator command, like the other stages.
    Generator,
}

impl std::fmt::Display for RendererKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RendererKind::Template => write!(f, "template"),
            RendererKind::Generator => write!(f, "generator"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSection {
    /// Subprocess invoked once per generation call
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound on a single call; 0 disables the bound
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_command() -> String {
    "llm".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewSection {
    #[serde(default)]
    pub renderer: RendererKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Store root, relative to the project directory
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

fn default_store_dir() -> String {
    QAFORGE_DIR.to_string()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

/// Parsed `qaforge.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaforgeToml {
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub review: ReviewSection,
    #[serde(default)]
    pub store: StoreSection,
}

impl QaforgeToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse qaforge.toml")
    }

    /// Load `<qaforge_dir>/qaforge.toml`, or defaults when it does not exist.
    pub fn load_or_default(qaforge_dir: &Path) -> Result<Self> {
        let config_path = qaforge_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize qaforge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(cmd) = lookup(ENV_GENERATOR_CMD).filter(|c| !c.trim().is_empty()) {
            self.generator.command = cmd;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.generator.timeout_secs = secs,
                Err(_) => warn!(value = %raw, "ignoring invalid {}", ENV_TIMEOUT_SECS),
            }
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.generator.command.trim().is_empty() {
            warnings.push("generator.command is empty: no stage can be generated".to_string());
        }
        if self.generator.timeout_secs == 0 {
            warnings.push("generator.timeout_secs is 0: generator calls are unbounded".to_string());
        }
        if self.store.dir.trim().is_empty() {
            warnings.push("store.dir is empty: runs will be stored in the project root".to_string());
        }

        warnings
    }
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct QaforgeConfig {
    pub project_dir: PathBuf,
    pub qaforge_dir: PathBuf,
    pub toml: QaforgeToml,
    /// CLI override: verbose mode
    pub verbose: bool,
}

impl QaforgeConfig {
    /// Load the project's configuration, then environment overrides.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let qaforge_dir = project_dir.join(QAFORGE_DIR);
        let mut toml = QaforgeToml::load_or_default(&qaforge_dir)?;
        toml.apply_env();

        Ok(Self {
            project_dir,
            qaforge_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.qaforge_dir.join(CONFIG_FILE)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.project_dir.join(&self.toml.store.dir)
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.qaforge_dir.join("prompts")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.store_dir().join(LOGS_DIR)
    }

    /// `None` when the configured timeout is zero.
    pub fn timeout(&self) -> Option<Duration> {
        match self.toml.generator.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_is_default() {
        let toml = QaforgeToml::parse("").unwrap();
        assert_eq!(toml.generator.command, "llm");
        assert_eq!(toml.generator.timeout_secs, 120);
        assert_eq!(toml.review.renderer, RendererKind::Template);
        assert_eq!(toml.store.dir, ".qaforge");
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_sections() {
        let content = r#"
[generator]
command = "claude"
args = ["-p"]
timeout_secs = 30

[review]
renderer = "generator"
"#;
        let toml = QaforgeToml::parse(content).unwrap();
        assert_eq!(toml.generator.command, "claude");
        assert_eq!(toml.generator.args, vec!["-p"]);
        assert_eq!(toml.generator.timeout_secs, 30);
        assert_eq!(toml.review.renderer, RendererKind::Generator);
    }

    #[test]
    fn test_unknown_renderer_is_an_error() {
        let content = r#"
[review]
renderer = "handwritten"
"#;
        assert!(QaforgeToml::parse(content).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_GENERATOR_CMD, "ollama-wrap"),
            (ENV_TIMEOUT_SECS, "15"),
        ]);
        let mut toml = QaforgeToml::default();
        toml.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(toml.generator.command, "ollama-wrap");
        assert_eq!(toml.generator.timeout_secs, 15);
    }

    #[test]
    fn test_invalid_timeout_override_is_ignored() {
        let mut toml = QaforgeToml::default();
        toml.apply_overrides(|key| (key == ENV_TIMEOUT_SECS).then(|| "soon".to_string()));
        assert_eq!(toml.generator.timeout_secs, 120);
    }

    #[test]
    fn test_validate_warnings() {
        let content = r#"
[generator]
command = " "
timeout_secs = 0
"#;
        let warnings = QaforgeToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("generator.command is empty"));
        assert!(warnings[1].contains("unbounded"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = QaforgeToml::default();
        toml.generator.args = vec!["--json".into()];
        toml.save(&path).unwrap();

        let loaded = QaforgeToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.generator.args, vec!["--json"]);
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = tempdir().unwrap();
        let toml = QaforgeToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.generator.command, "llm");
    }

    #[test]
    fn test_config_paths_and_timeout() {
        let dir = tempdir().unwrap();
        let config = QaforgeConfig {
            project_dir: dir.path().to_path_buf(),
            qaforge_dir: dir.path().join(QAFORGE_DIR),
            toml: QaforgeToml::default(),
            verbose: false,
        };
        assert_eq!(config.store_dir(), dir.path().join(".qaforge"));
        assert_eq!(config.prompts_dir(), dir.path().join(".qaforge/prompts"));
        assert_eq!(config.log_dir(), dir.path().join(".qaforge/logs"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_logs_follow_a_custom_store_dir() {
        let dir = tempdir().unwrap();
        let qaforge_dir = dir.path().join(QAFORGE_DIR);
        std::fs::create_dir_all(&qaforge_dir).unwrap();
        std::fs::write(qaforge_dir.join(CONFIG_FILE), "[store]\ndir = \"qa-store\"\n").unwrap();

        let config = QaforgeConfig::new(dir.path().to_path_buf()).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.store_dir(), root.join("qa-store"));
        assert_eq!(config.log_dir(), root.join("qa-store/logs"));
        assert_eq!(config.prompts_dir(), root.join(".qaforge/prompts"));
    }
}
