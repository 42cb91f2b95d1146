//! Computing Element adapter.
//!
//! One adapter instance targets one CE endpoint. The two supported flavors
//! differ in command set, job-id shape and status vocabulary; everything
//! behind [`ComputeElement`] is normalized so the state machine never sees a
//! native lexeme.

use crate::command::CommandRunner;
use crate::error::AdapterError;
use async_trait::async_trait;
use gridflow_protocol::paths::JOB_STATUS;
use gridflow_protocol::{CeRetryConfig, CeStatus};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

static CREAM_JOB_ID: OnceLock<Regex> = OnceLock::new();
static CREAM_STATUS: OnceLock<Regex> = OnceLock::new();
static CREAM_EXIT_CODE: OnceLock<Regex> = OnceLock::new();
static CREAM_WORKER_NODE: OnceLock<Regex> = OnceLock::new();
static CREAM_LOCAL_USER: OnceLock<Regex> = OnceLock::new();
static CREAM_DESCRIPTION: OnceLock<Regex> = OnceLock::new();
static CONDOR_CLUSTER: OnceLock<Regex> = OnceLock::new();
static CONDOR_STATUS: OnceLock<Regex> = OnceLock::new();
static CONDOR_EXIT_CODE: OnceLock<Regex> = OnceLock::new();
static CONDOR_OWNER: OnceLock<Regex> = OnceLock::new();
static CONDOR_REMOTE_HOST: OnceLock<Regex> = OnceLock::new();

/// CE protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeFlavor {
    /// CREAM gateways: job ids are `https://host:port/CREAM...` URLs and a
    /// dedicated output/purge command pair manages the sandbox.
    Cream,
    /// HTCondor-CE gateways: job ids are cluster numbers scoped by the
    /// endpoint; a removed job simply vanishes from `condor_q`.
    Condor,
}

/// Normalized answer of a CE status query.
#[derive(Debug, Clone, Default)]
pub struct CeJobInfo {
    pub status: CeStatus,
    pub exit_code: Option<String>,
    pub worker_node: Option<String>,
    pub local_user: Option<String>,
    pub description: Option<String>,
}

/// Opaque CE surface the state machine drives.
#[async_trait]
pub trait ComputeElement: Send + Sync {
    /// `host:port` endpoint this adapter targets.
    fn endpoint(&self) -> &str;

    /// Submit the descriptor in `job_dir`; returns the CE job id.
    async fn submit(&self, job_dir: &Path) -> Result<String, AdapterError>;

    /// Query the submission. Never fails the process: after the retry budget
    /// the answer is simply `Undef`.
    async fn status(&self, ce_job_id: &str) -> CeJobInfo;

    /// Download the CE-side sandbox so its files land directly in
    /// `dest_dir`.
    async fn fetch_output(&self, ce_job_id: &str, dest_dir: &Path) -> Result<(), AdapterError>;

    /// Best-effort release of CE-side resources after retrieval.
    async fn purge(&self, ce_job_id: &str);

    /// Best-effort remote cancel.
    async fn cancel(&self, ce_job_id: &str);
}

/// Command-line backed CE adapter.
pub struct GridCe {
    endpoint: String,
    host: String,
    flavor: CeFlavor,
    runner: CommandRunner,
    retry: CeRetryConfig,
}

impl GridCe {
    pub fn new(endpoint: impl Into<String>, flavor: CeFlavor) -> Self {
        Self::with_retry(endpoint, flavor, CeRetryConfig::default())
    }

    pub fn with_retry(
        endpoint: impl Into<String>,
        flavor: CeFlavor,
        retry: CeRetryConfig,
    ) -> Self {
        let endpoint = endpoint.into();
        let host = endpoint
            .split(':')
            .next()
            .unwrap_or(endpoint.as_str())
            .to_string();
        Self {
            endpoint,
            host,
            flavor,
            runner: CommandRunner::new(),
            retry,
        }
    }

    /// Cluster number part of a Condor job id (`endpoint/cluster`).
    fn condor_cluster<'a>(&self, ce_job_id: &'a str) -> &'a str {
        ce_job_id.rsplit_once('/').map_or(ce_job_id, |(_, c)| c)
    }

    fn parse_cream_submit(stdout: &str) -> Option<String> {
        let id_re = regex(&CREAM_JOB_ID, r"^https://\S+:\d+/CREAM\S+$");
        stdout
            .lines()
            .find(|line| id_re.is_match(line.trim()))
            .map(|line| line.trim().to_string())
    }

    fn parse_condor_submit(&self, stdout: &str) -> Option<String> {
        let cluster_re = regex(&CONDOR_CLUSTER, r"submitted to cluster (\d+)\.");
        stdout
            .lines()
            .find_map(|line| cluster_re.captures(line))
            .map(|caps| format!("{}/{}", self.endpoint, &caps[1]))
    }

    fn parse_cream_status(stdout: &str) -> CeJobInfo {
        let status_re = regex(&CREAM_STATUS, r"^\s*Current Status\s+=\s+\[(.+)\]");
        let exit_re = regex(&CREAM_EXIT_CODE, r"^\s*ExitCode\s+=\s+\[(.+)\]");
        let node_re = regex(&CREAM_WORKER_NODE, r"^\s*Worker Node\s+=\s+\[(.+)\]");
        let user_re = regex(&CREAM_LOCAL_USER, r"^\s*Local User\s+=\s+\[(.+)\]");
        let desc_re = regex(&CREAM_DESCRIPTION, r"^\s*Description\s*=\s*\[(.*)\]");

        let mut info = CeJobInfo::default();
        for line in stdout.lines() {
            if let Some(caps) = status_re.captures(line) {
                info.status = CeStatus::from_cream_lexeme(&caps[1]);
            } else if let Some(caps) = exit_re.captures(line) {
                info.exit_code = Some(caps[1].to_string());
            } else if let Some(caps) = node_re.captures(line) {
                info.worker_node = Some(caps[1].to_string());
            } else if let Some(caps) = user_re.captures(line) {
                info.local_user = Some(caps[1].to_string());
            } else if let Some(caps) = desc_re.captures(line) {
                info.description = Some(caps[1].to_string());
            }
        }
        info
    }

    fn parse_condor_status(stdout: &str) -> CeJobInfo {
        // A job removed with condor_rm leaves no trace in condor_q
        if stdout.trim().is_empty() {
            return CeJobInfo {
                status: CeStatus::Cancelled,
                ..CeJobInfo::default()
            };
        }

        let status_re = regex(&CONDOR_STATUS, r"^\s*JobStatus\s+=\s+(\d+)\s*$");
        let exit_re = regex(&CONDOR_EXIT_CODE, r"^\s*ExitCode\s+=\s+(\d+)\s*$");
        let owner_re = regex(&CONDOR_OWNER, r#"^\s*Owner\s+=\s+"(\S+)"\s*$"#);
        let host_re = regex(&CONDOR_REMOTE_HOST, r#"^\s*RemoteHost\s+=\s+"(?:[^@"]+@)?([^"]+)"\s*$"#);

        let mut info = CeJobInfo::default();
        for line in stdout.lines() {
            if let Some(caps) = status_re.captures(line) {
                info.status = CeStatus::from_condor_code(&caps[1]);
            } else if let Some(caps) = exit_re.captures(line) {
                info.exit_code = Some(caps[1].to_string());
            } else if let Some(caps) = owner_re.captures(line) {
                info.local_user = Some(caps[1].to_string());
            } else if let Some(caps) = host_re.captures(line) {
                info.worker_node = Some(caps[1].to_string());
            }
        }
        info
    }

    fn status_command(&self, ce_job_id: &str) -> String {
        match self.flavor {
            CeFlavor::Cream => format!("glite-ce-job-status --level 2 {ce_job_id}"),
            CeFlavor::Condor => format!(
                "condor_q -long -pool {} -name {} {}",
                self.endpoint,
                self.host,
                self.condor_cluster(ce_job_id)
            ),
        }
    }

    /// Move everything out of the CREAM retrieval directory (derived from
    /// the job id) up into `dest_dir`.
    async fn flatten_cream_sandbox(
        &self,
        ce_job_id: &str,
        dest_dir: &Path,
    ) -> Result<(), AdapterError> {
        let out_dir_name = ce_job_id
            .trim_start_matches("https://")
            .replace([':', '/'], "_");
        let out_dir = dest_dir.join(&out_dir_name);
        if !out_dir.is_dir() {
            return Err(AdapterError::Transient(format!(
                "sandbox directory {} not found after retrieval",
                out_dir.display()
            )));
        }
        let mut entries = tokio::fs::read_dir(&out_dir).await.map_err(|err| {
            AdapterError::Transient(format!("cannot read {}: {err}", out_dir.display()))
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| AdapterError::Transient(err.to_string()))?
        {
            let target = dest_dir.join(entry.file_name());
            tokio::fs::rename(entry.path(), &target)
                .await
                .map_err(|err| {
                    AdapterError::Transient(format!("cannot move {}: {err}", target.display()))
                })?;
        }
        let _ = tokio::fs::remove_dir(&out_dir).await;
        Ok(())
    }
}

#[async_trait]
impl ComputeElement for GridCe {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn submit(&self, job_dir: &Path) -> Result<String, AdapterError> {
        let cmd = match self.flavor {
            CeFlavor::Cream => format!(
                "glite-ce-job-submit --autm-delegation --resource {} job.jdl",
                self.endpoint
            ),
            CeFlavor::Condor => format!(
                "condor_submit -pool {} -remote {} -spool job.sub",
                self.endpoint, self.host
            ),
        };

        let mut attempts = 0u32;
        loop {
            let out = self.runner.run_in(&cmd, job_dir).await?;
            if out.success() {
                let id = match self.flavor {
                    CeFlavor::Cream => Self::parse_cream_submit(&out.stdout),
                    CeFlavor::Condor => self.parse_condor_submit(&out.stdout),
                };
                match id {
                    Some(id) => {
                        debug!(ce = %self.endpoint, ce_job_id = %id, "submit accepted");
                        return Ok(id);
                    }
                    None => warn!(ce = %self.endpoint, "submit succeeded but no CE job id returned"),
                }
            } else {
                warn!(ce = %self.endpoint, exit = ?out.exit_code, "submit returned error");
            }

            attempts += 1;
            if attempts >= self.retry.submission_max {
                return Err(AdapterError::Transient(format!(
                    "submission to {} failed {attempts} times",
                    self.endpoint
                )));
            }
            tokio::time::sleep(self.retry.submission_delay).await;
        }
    }

    async fn status(&self, ce_job_id: &str) -> CeJobInfo {
        let cmd = self.status_command(ce_job_id);

        let mut attempts = 0u32;
        loop {
            match self.runner.run(&cmd).await {
                Ok(out) if out.success() => {
                    return match self.flavor {
                        CeFlavor::Cream => Self::parse_cream_status(&out.stdout),
                        CeFlavor::Condor => Self::parse_condor_status(&out.stdout),
                    };
                }
                Ok(out) => {
                    warn!(ce_job_id, exit = ?out.exit_code, "status query returned error")
                }
                Err(err) => warn!(ce_job_id, error = %err, "status query failed"),
            }

            attempts += 1;
            if attempts >= self.retry.retries_max {
                warn!(
                    ce_job_id,
                    attempts, "unable to retrieve job status, reporting UNDEF"
                );
                return CeJobInfo::default();
            }
            tokio::time::sleep(self.retry.retries_delay).await;
        }
    }

    async fn fetch_output(&self, ce_job_id: &str, dest_dir: &Path) -> Result<(), AdapterError> {
        if self.flavor == CeFlavor::Condor {
            // Snapshot the final classad next to the sandbox; parsing
            // failures here never block retrieval.
            let status_cmd = self.status_command(ce_job_id);
            if let Ok(out) = self.runner.run(&status_cmd).await {
                if out.success() {
                    let _ = tokio::fs::write(dest_dir.join(JOB_STATUS), &out.stdout).await;
                }
            }
        }

        let cmd = match self.flavor {
            CeFlavor::Cream => format!("glite-ce-job-output --noint {ce_job_id}"),
            CeFlavor::Condor => format!(
                "condor_transfer_data -pool {} -name {} {}",
                self.endpoint,
                self.host,
                self.condor_cluster(ce_job_id)
            ),
        };

        let mut attempts = 0u32;
        loop {
            let out = self.runner.run_in(&cmd, dest_dir).await?;
            if out.success() {
                break;
            }
            warn!(ce_job_id, exit = ?out.exit_code, "output retrieval returned error");
            attempts += 1;
            if attempts >= self.retry.retries_max {
                return Err(AdapterError::Transient(format!(
                    "output retrieval for {ce_job_id} failed {attempts} times"
                )));
            }
            tokio::time::sleep(self.retry.retries_delay).await;
        }

        if self.flavor == CeFlavor::Cream {
            self.flatten_cream_sandbox(ce_job_id, dest_dir).await?;
        }
        Ok(())
    }

    async fn purge(&self, ce_job_id: &str) {
        let cmd = match self.flavor {
            CeFlavor::Cream => format!("glite-ce-job-purge -N {ce_job_id}"),
            // A spooled Condor job leaves nothing to purge
            CeFlavor::Condor => return,
        };
        match self.runner.run(&cmd).await {
            Ok(out) if out.success() => {}
            Ok(out) => warn!(ce_job_id, exit = ?out.exit_code, "purge returned error"),
            Err(err) => warn!(ce_job_id, error = %err, "purge failed"),
        }
    }

    async fn cancel(&self, ce_job_id: &str) {
        let cmd = match self.flavor {
            CeFlavor::Cream => format!("glite-ce-job-cancel --noint {ce_job_id}"),
            CeFlavor::Condor => format!(
                "condor_rm -pool {} -name {} {}",
                self.endpoint,
                self.host,
                self.condor_cluster(ce_job_id)
            ),
        };
        match self.runner.run(&cmd).await {
            Ok(out) if out.success() => debug!(ce_job_id, "cancel requested"),
            Ok(out) => warn!(ce_job_id, exit = ?out.exit_code, "cancel returned error"),
            Err(err) => warn!(ce_job_id, error = %err, "cancel failed"),
        }
    }
}
