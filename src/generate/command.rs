//! Subprocess-backed generator.
//!
//! The configured command receives one JSON envelope on stdin:
//!
//! ```json
//! {"kind": "risk", "system_prompt": "...", "payload": {...}}
//! ```
//!
//! and must print the candidate artifact on stdout. A non-zero exit is a
//! provider failure carrying the command's stderr.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{GenerationRequest, Generator};
use crate::errors::GenerationError;

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandGenerator {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let envelope = serde_json::to_vec(request).map_err(GenerationError::InvalidPayload)?;

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(
            command = %self.command_line(),
            kind = %request.kind,
            bytes = envelope.len(),
            "spawning generator"
        );

        let mut child = cmd.spawn().map_err(|source| GenerationError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A generator may exit without reading all of its input.
            match stdin.write_all(&envelope).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(GenerationError::Io(e)),
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(GenerationError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(match output.status.code() {
                Some(code) => GenerationError::NonZeroExit { code, stderr },
                // No exit code: the process was killed by a signal.
                None => GenerationError::Provider(format!(
                    "generator terminated without an exit code ({}): {}",
                    output.status, stderr
                )),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| GenerationError::InvalidUtf8)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::generate::GenerationKind;
    use serde_json::json;

    fn request() -> GenerationRequest {
        GenerationRequest {
            kind: GenerationKind::Intake,
            system_prompt: "Extract requirements".into(),
            payload: json!({"document": "# PRD"}),
        }
    }

    #[tokio::test]
    async fn test_stdout_is_the_candidate() {
        let generator = CommandGenerator::new("sh", vec!["-c".into(), "echo '[1]'".into()]);
        let out = generator.generate(&request()).await.unwrap();
        assert_eq!(out.trim(), "[1]");
    }

    #[tokio::test]
    async fn test_envelope_is_written_to_stdin() {
        let generator = CommandGenerator::new("cat", vec![]);
        let out = generator.generate(&request()).await.unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(envelope["kind"], "intake");
        assert_eq!(envelope["system_prompt"], "Extract requirements");
        assert_eq!(envelope["payload"]["document"], "# PRD");
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let generator = CommandGenerator::new(
            "sh",
            vec!["-c".into(), "echo 'quota exceeded' >&2; exit 3".into()],
        );
        match generator.generate(&request()).await {
            Err(GenerationError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "quota exceeded");
            }
            other => panic!("Expected NonZeroExit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signal_termination_is_a_provider_error() {
        let generator = CommandGenerator::new(
            "sh",
            vec!["-c".into(), "echo 'out of memory' >&2; kill -9 $$".into()],
        );
        match generator.generate(&request()).await {
            Err(GenerationError::Provider(message)) => {
                assert!(message.contains("out of memory"));
            }
            other => panic!("Expected Provider, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_command_is_a_spawn_error() {
        let generator = CommandGenerator::new("qaforge-no-such-generator", vec![]);
        let err = generator.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Spawn { .. }));
    }

    #[test]
    fn test_command_line_display() {
        let generator = CommandGenerator::new("llm", vec!["-m".into(), "gpt-4o".into()]);
        assert_eq!(generator.command_line(), "llm -m gpt-4o");
    }
}
