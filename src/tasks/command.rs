// ABOUTME: Command task that runs a program or shell script as a child process
// ABOUTME: Feeds input contributions on stdin and reports exit code and captured output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::task::{Result, TaskBehavior, TaskContext, TaskError};

pub struct CommandTask;

/// Configuration for command task execution
///
/// Supports two execution modes:
/// 1. Simple command: `command` + `args`
/// 2. Script mode: `script`, run through `shell -c`
///
/// ```yaml
/// type: command
/// config:
///   command: wc
///   args: ["-c"]
///   timeout: 30s
/// ```
///
/// ```yaml
/// type: command
/// config:
///   script: |
///     jq length
///   env:
///     PATH: "/usr/local/bin:/usr/bin:/bin"
///   expected_exit_codes: [0, 1]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to execute. Mutually exclusive with `script`.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments for `command`, ignored in script mode
    #[serde(default)]
    pub args: Vec<String>,

    /// Shell script body. Mutually exclusive with `command`.
    #[serde(default)]
    pub script: Option<String>,

    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default = "default_exit_codes")]
    pub expected_exit_codes: Vec<i32>,
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_exit_codes() -> Vec<i32> {
    vec![0]
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            script: None,
            shell: default_shell(),
            env: HashMap::new(),
            working_dir: None,
            timeout: None,
            expected_exit_codes: default_exit_codes(),
        }
    }
}

impl CommandConfig {
    /// Check the command/script exclusivity rules.
    pub fn validate(&self) -> Result<()> {
        match (&self.command, &self.script) {
            (None, None) => Err(TaskError::validation(
                "Either 'command' or 'script' must be provided",
            )),
            (Some(_), Some(_)) => Err(TaskError::validation(
                "Cannot specify both 'command' and 'script' - use only one",
            )),
            (Some(command), None) if command.trim().is_empty() => {
                Err(TaskError::validation("Command cannot be empty"))
            }
            (None, Some(script)) if script.trim().is_empty() => {
                Err(TaskError::validation("Script cannot be empty"))
            }
            (None, Some(_)) if self.shell.is_empty() => Err(TaskError::validation(
                "Shell interpreter cannot be empty when using script mode",
            )),
            _ => {
                if self.timeout == Some(Duration::ZERO) {
                    return Err(TaskError::validation("Timeout must be greater than 0"));
                }
                Ok(())
            }
        }
    }

    /// Human readable form of what will be run, for logs and errors.
    fn describe(&self) -> String {
        match (&self.command, &self.script) {
            (Some(command), _) => command.clone(),
            (None, _) => format!("{} -c <script>", self.shell),
        }
    }

    fn build(&self) -> Command {
        let mut cmd = match (&self.command, &self.script) {
            (Some(command), _) => {
                let mut cmd = Command::new(command);
                cmd.args(&self.args);
                cmd
            }
            (None, script) => {
                let mut cmd = Command::new(&self.shell);
                cmd.arg("-c").arg(script.as_deref().unwrap_or_default());
                cmd
            }
        };

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref working_dir) = self.working_dir {
            cmd.current_dir(working_dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TaskBehavior for CommandTask {
    fn kind(&self) -> &str {
        "command"
    }

    fn on_config(&self, value: Value) -> Result<Value> {
        let config: CommandConfig = serde_json::from_value(value.clone())
            .map_err(|e| TaskError::validation(format!("Invalid command configuration: {}", e)))?;
        config.validate()?;
        Ok(value)
    }

    async fn on_work(&self, ctx: &TaskContext<'_>) -> Result<Option<Value>> {
        let config: CommandConfig = ctx.config_as()?;
        config.validate()?;

        let program = config.describe();
        debug!("Running {} for task {}", program, ctx.name);

        let payload = serde_json::to_vec(ctx.input_data)
            .map_err(|e| TaskError::failed(ctx.name, format!("Failed to encode input: {}", e)))?;

        let mut child = config.build().spawn().map_err(|e| {
            TaskError::failed(ctx.name, format!("Failed to execute '{}': {}", program, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                // The child may exit without draining stdin.
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!("Could not write command input: {}", e);
                }
            });
        }

        let waited = match config.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!("{} timed out after {:?}", program, limit);
                    return Err(TaskError::validation(format!(
                        "Command '{}' timed out after {:?}",
                        program, limit
                    )));
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|e| {
            TaskError::failed(ctx.name, format!("Failed to wait for '{}': {}", program, e))
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !config.expected_exit_codes.contains(&exit_code) {
            return Err(TaskError::validation(format!(
                "Command '{}' exited with unexpected code: {} (expected one of: {:?}){}",
                program,
                exit_code,
                config.expected_exit_codes,
                if stderr.trim().is_empty() {
                    String::new()
                } else {
                    format!(": {}", stderr.trim())
                }
            )));
        }

        Ok(Some(json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        })))
    }
}
