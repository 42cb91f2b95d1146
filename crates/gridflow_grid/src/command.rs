//! External command execution.
//!
//! Grid tools are spawned with captured stdout/stderr and a hard deadline.
//! A non-zero exit is a value in [`CommandOutput`], not an error: only
//! transport-level failures (spawn, timeout) are errors. Callers dispatch on
//! values.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Hard deadline for a single external command.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command '{cmd}' did not finish within {timeout:?}")]
    Timeout { cmd: String, timeout: Duration },
}

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// None when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Spawns external processes with captured output and bounded retries.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `command` (whitespace-split argv) in the current directory.
    pub async fn run(&self, command: &str) -> Result<CommandOutput, CommandError> {
        self.run_inner(command, None, None).await
    }

    /// Run `command` with `dir` as working directory.
    pub async fn run_in(&self, command: &str, dir: &Path) -> Result<CommandOutput, CommandError> {
        self.run_inner(command, Some(dir.to_path_buf()), None).await
    }

    /// Run `command` feeding `input` on stdin (credential passphrases).
    pub async fn run_with_stdin(
        &self,
        command: &str,
        input: &str,
    ) -> Result<CommandOutput, CommandError> {
        self.run_inner(command, None, Some(input.to_string())).await
    }

    /// Run `command` up to `attempts` times, sleeping `delay` between
    /// attempts, until it exits 0. Returns the last output either way.
    pub async fn run_retrying(
        &self,
        command: &str,
        attempts: u32,
        delay: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let attempts = attempts.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            let output = self.run(command).await?;
            if output.success() {
                return Ok(output);
            }
            debug!(command, attempt, attempts, exit = ?output.exit_code, "command failed");
            last = Some(output);
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        // attempts >= 1, so last is always set here
        Ok(last.unwrap_or(CommandOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        }))
    }

    async fn run_inner(
        &self,
        command: &str,
        dir: Option<PathBuf>,
        input: Option<String>,
    ) -> Result<CommandOutput, CommandError> {
        let mut argv = command.split_whitespace();
        let program = argv.next().ok_or_else(|| CommandError::Spawn {
            cmd: command.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        debug!(command, "> spawning");

        let mut cmd = Command::new(program);
        cmd.args(argv)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            cmd: command.to_string(),
            source,
        })?;

        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                // Ignore a closed pipe: the tool may not read stdin at all.
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.write_all(b"\n").await;
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout {
                cmd: command.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| CommandError::Spawn {
                cmd: command.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
