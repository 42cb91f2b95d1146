//! Two-tier credential lifecycle.
//!
//! A long-lived credential sits in an external store (or in the user's
//! certificate); a short-lived delegated credential derived from it is what
//! every outbound grid command presents. The manager reads remaining
//! validity with `voms-proxy-info` and refreshes with `myproxy-logon` (store
//! variant) or `voms-proxy-init` (local variant).

use crate::command::{CommandError, CommandRunner};
use gridflow_protocol::CredentialConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("credential tool exited {code:?}: {stderr}")]
    Refused { code: Option<i32>, stderr: String },

    #[error("could not parse remaining validity from: {0:?}")]
    Parse(String),
}

/// Manages the delegated credential for one production.
pub struct CredentialManager {
    config: CredentialConfig,
    runner: CommandRunner,
}

impl CredentialManager {
    pub fn new(config: CredentialConfig) -> Self {
        Self {
            config,
            runner: CommandRunner::new(),
        }
    }

    pub fn with_runner(config: CredentialConfig, runner: CommandRunner) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Remaining validity of the delegated credential, in seconds. A missing
    /// or expired credential reads as zero.
    pub async fn time_left(&self) -> Result<u64, CredentialError> {
        let mut cmd = String::from("voms-proxy-info --actimeleft");
        if let Some(path) = &self.config.proxy_file {
            cmd.push_str(&format!(" --file {}", path.display()));
        }
        let out = self.runner.run(&cmd).await?;
        if !out.success() {
            // No proxy yet: the info tool fails, which just means "renew now"
            return Ok(0);
        }
        out.stdout
            .lines()
            .find_map(|line| line.trim().parse::<u64>().ok())
            .ok_or_else(|| CredentialError::Parse(out.stdout))
    }

    /// Refresh the delegated credential when it has less than `threshold`
    /// left. Returns true when a refresh was performed.
    pub async fn ensure_valid(&self, threshold: Duration) -> Result<bool, CredentialError> {
        let left = self.time_left().await?;
        if left >= threshold.as_secs() {
            return Ok(false);
        }
        info!(
            seconds_left = left,
            threshold = threshold.as_secs(),
            "delegated credential below threshold, renewing"
        );
        self.issue().await?;
        Ok(true)
    }

    /// `ensure_valid` with the configured renewal threshold.
    pub async fn ensure_valid_default(&self) -> Result<bool, CredentialError> {
        self.ensure_valid(self.config.renew_threshold).await
    }

    /// Unconditionally issue a fresh delegated credential.
    pub async fn issue(&self) -> Result<(), CredentialError> {
        let out = match &self.config.myproxy {
            Some(myproxy) => {
                let mut cmd = format!(
                    "myproxy-logon --voms {} --pshost {}:{} --dn_as_username --credname {} --stdin_pass",
                    self.config.vo, myproxy.server, myproxy.port, myproxy.name
                );
                if let Some(path) = &self.config.proxy_file {
                    cmd.push_str(&format!(" --out {}", path.display()));
                }
                self.runner.run_with_stdin(&cmd, &myproxy.passwd).await?
            }
            None => {
                let mut cmd = format!(
                    "voms-proxy-init --voms {} --valid {}:00",
                    self.config.vo, self.config.validity_hours
                );
                if let Some(path) = &self.config.proxy_file {
                    cmd.push_str(&format!(" --out {}", path.display()));
                }
                self.runner.run(&cmd).await?
            }
        };

        if !out.success() {
            warn!(exit = ?out.exit_code, "credential issuance failed");
            return Err(CredentialError::Refused {
                code: out.exit_code,
                stderr: out.stderr,
            });
        }
        info!("delegated credential issued");
        Ok(())
    }
}
