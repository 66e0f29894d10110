//! Subprocess-backed payload executor
//!
//! Runs pooled-mode payloads as shell commands with process-level fault
//! isolation. The payload carries the command:
//!
//! ```json
//! { "command": "scripts/check-command.sh", "env": {"HOOK_ARG": "..."} }
//! ```
//!
//! Exit code 0 is success; a non-zero exit is an explicit rejection by the
//! payload logic (permanent, not retried); a spawn failure is transient.
//! Direct-mode requests never touch a subprocess and succeed immediately
//! with their payload echoed back.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::core::request::{ExecutionMode, HookRequest};
use crate::retry::PayloadError;

use super::executor::PayloadExecutor;

/// Maximum captured output length in characters
const MAX_OUTPUT_LENGTH: usize = 30000;

/// Payload shape understood by `CommandExecutor`
#[derive(Debug, Deserialize)]
struct CommandInput {
    /// The command to execute (required for pooled mode)
    command: String,
    /// Extra environment variables for the subprocess
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Executor that runs pooled payloads as subprocesses
pub struct CommandExecutor {
    /// Working directory for spawned commands
    working_dir: String,
}

impl CommandExecutor {
    /// Create an executor running commands in the current directory
    pub fn new() -> std::io::Result<Self> {
        let working_dir = std::env::current_dir()?.to_string_lossy().to_string();
        Ok(Self { working_dir })
    }

    /// Create an executor with a specific working directory
    pub fn with_working_dir(working_dir: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    async fn run_command(&self, input: &CommandInput) -> Result<Value, PayloadError> {
        tracing::debug!(command = %input.command, dir = %self.working_dir, "spawning hook command");

        let output = Command::new("bash")
            .arg("-c")
            .arg(&input.command)
            .current_dir(&self.working_dir)
            .envs(&input.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PayloadError::transient(format!("failed to spawn command: {}", e)))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let mut stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if stdout.len() > MAX_OUTPUT_LENGTH {
            stdout.truncate(MAX_OUTPUT_LENGTH);
            stdout.push_str("\n... (output truncated)");
        }

        if exit_code == 0 {
            Ok(json!({
                "exit_code": 0,
                "stdout": stdout,
            }))
        } else {
            Err(PayloadError::permanent(format!(
                "command rejected with exit code {}: {}",
                exit_code,
                if stderr.is_empty() { &stdout } else { &stderr }
            )))
        }
    }
}

#[async_trait]
impl PayloadExecutor for CommandExecutor {
    async fn run(&self, request: &HookRequest, mode: ExecutionMode) -> Result<Value, PayloadError> {
        match mode {
            ExecutionMode::Direct => Ok(request.payload.clone()),
            ExecutionMode::Pooled => {
                let input: CommandInput = serde_json::from_value(request.payload.clone())
                    .map_err(|e| {
                        PayloadError::permanent(format!("invalid command payload: {}", e))
                    })?;
                self.run_command(&input).await
            }
        }
    }
}
