//! Per-job state machine.
//!
//! One instance per job. Each controller sweep calls [`JobFsm::update`]
//! once; the machine submits, tracks, finalizes and resubmits its job,
//! writing every transition through the catalog. Catalog failures propagate
//! (the controller decides whether to abort); CE and storage failures are
//! values the machine dispatches on.

use gridflow_db::{Catalog, CatalogError};
use gridflow_grid::ComputeElement;
use gridflow_protocol::paths::{self, JOB_ERR, JOB_LOG, JOB_OUT, JOB_SH, JOB_STATUS};
use gridflow_protocol::{CeStatus, FsmConfig, JobId, JobStatus, SubmissionId, SubmitStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::output_parser::{parse_stderr, parse_stdout};

/// What a job contributed to the sweep's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepToken {
    Created,
    Active,
    Successful,
    Failed,
    Undef,
}

#[derive(Debug, Error)]
pub enum FsmError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl FsmError {
    /// Failures that must stop the whole controller rather than be counted
    /// as one confused job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FsmError::Catalog(CatalogError::Unavailable { .. }))
    }
}

/// Per-job state machine.
pub struct JobFsm {
    job_id: JobId,
    name: String,
    /// Absolute job working directory.
    job_dir: PathBuf,
    ce: Arc<dyn ComputeElement>,
    catalog: Catalog,
    config: FsmConfig,
    status: JobStatus,
    sub_id: Option<SubmissionId>,
    ce_job_id: Option<String>,
    /// Submissions opened so far; doubles as the next submit_index.
    resubmissions: u32,
    quit: bool,
}

impl JobFsm {
    /// Rebuild the machine from the catalog so a restarted controller picks
    /// up exactly where the previous one stopped.
    pub async fn load(
        catalog: Catalog,
        job_id: JobId,
        prod_dir: &Path,
        ce: Arc<dyn ComputeElement>,
        config: FsmConfig,
    ) -> Result<Self, FsmError> {
        let row = catalog.get_job(job_id).await?;
        let mut status = row.job_status().unwrap_or_else(|| {
            warn!(job = %row.name, code = row.status, "unknown job status in catalog, treating as Created");
            JobStatus::Created
        });

        let submissions = catalog.list_job_submissions(job_id).await?;
        let resubmissions = submissions.len() as u32;
        let last = submissions.last();
        let sub_id = last.map(|s| SubmissionId::new(s.id));
        let ce_job_id = last.and_then(|s| s.ce_job_id.clone());

        // An Active job with no CE id cannot be tracked; make it
        // resubmittable instead of poking the CE with nothing.
        if status == JobStatus::Active && ce_job_id.is_none() {
            warn!(job = %row.name, "active job without CE id, reverting to Created");
            status = JobStatus::Created;
            catalog.set_job_status(job_id, status).await?;
        }

        let fsm = Self {
            job_id,
            name: row.name,
            job_dir: prod_dir.join(&row.job_dir),
            ce,
            catalog,
            config,
            status,
            sub_id,
            ce_job_id,
            resubmissions,
            quit: false,
        };
        debug!(job = %fsm.name, status = %fsm.status, resubmissions, "job state machine loaded");
        Ok(fsm)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    /// Request cooperative shutdown: no new submissions, best-effort cancel
    /// of the live one, fall-through closes as Failed.
    pub fn set_quit(&mut self) {
        self.quit = true;
    }

    /// Evaluate one sweep step.
    pub async fn update(&mut self) -> Result<SweepToken, FsmError> {
        if !self.quit && paths::quit_file(&self.job_dir).exists() {
            info!(job = %self.name, "quit sentinel found, quitting job");
            self.quit = true;
        }

        match self.status {
            JobStatus::Created => self.update_created().await,
            JobStatus::Active => self.update_active().await,
            JobStatus::Successful => {
                info!(job = %self.name, ce_job = self.ce_job_id.as_deref().unwrap_or("UNDEF"),
                      "DONE-OK");
                Ok(SweepToken::Successful)
            }
            JobStatus::Failed => {
                self.report_failed().await?;
                Ok(SweepToken::Failed)
            }
        }
    }

    async fn report_failed(&self) -> Result<(), FsmError> {
        let detail = match self.sub_id {
            Some(sub_id) => {
                let row = self.catalog.get_job_submit_info(sub_id).await?;
                row.submit_status()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("status {}", row.status))
            }
            None => "SUBMIT-FAILED".to_string(),
        };
        info!(job = %self.name, ce_job = self.ce_job_id.as_deref().unwrap_or("UNDEF"),
              "FAILED ({detail})");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Created: submit or give up
    // ------------------------------------------------------------------

    async fn update_created(&mut self) -> Result<SweepToken, FsmError> {
        if self.quit || self.resubmissions >= self.config.resubmit_max {
            if self.resubmissions >= self.config.resubmit_max {
                warn!(job = %self.name, resubmissions = self.resubmissions,
                      max = self.config.resubmit_max,
                      "resubmission budget exhausted, closing as Failed");
            } else {
                info!(job = %self.name, "quitting, submission cancelled");
            }
            return self.close_failed().await;
        }

        let sub_id = self
            .catalog
            .create_job_submission(self.job_id, self.resubmissions)
            .await?;
        self.sub_id = Some(sub_id);
        self.resubmissions += 1;

        match self.ce.submit(&self.job_dir).await {
            Ok(ce_job_id) => {
                self.catalog.set_job_submitted(sub_id, &ce_job_id).await?;
                info!(job = %self.name, ce_job = %ce_job_id, "SUBMITTED");
                self.ce_job_id = Some(ce_job_id);
                self.status = JobStatus::Active;
                self.catalog.set_job_status(self.job_id, self.status).await?;
                Ok(SweepToken::Active)
            }
            Err(err) => {
                // Keep the job Created: the next sweep retries, budget
                // permitting
                warn!(job = %self.name, error = %err, "SUBMIT-FAILED");
                self.catalog
                    .close_job_submission(sub_id, SubmitStatus::SubmitFailed, None, None)
                    .await?;
                Ok(SweepToken::Created)
            }
        }
    }

    // ------------------------------------------------------------------
    // Active: track the live submission
    // ------------------------------------------------------------------

    async fn update_active(&mut self) -> Result<SweepToken, FsmError> {
        let (Some(sub_id), Some(ce_job_id)) = (self.sub_id, self.ce_job_id.clone()) else {
            warn!(job = %self.name, "active job lost its submission handle, reverting to Created");
            self.status = JobStatus::Created;
            self.catalog.set_job_status(self.job_id, self.status).await?;
            return Ok(SweepToken::Created);
        };

        let prev = self.catalog.get_job_submit_info(sub_id).await?;
        let ce_info = self.ce.status(&ce_job_id).await;
        info!(job = %self.name, ce_job = %ce_job_id, status = %ce_info.status,
              location = %format_args!("{}@{}",
                  ce_info.local_user.as_deref().unwrap_or("UNKNOWN"),
                  ce_info.worker_node.as_deref().unwrap_or("UNKNOWN")),
              "job status");

        match ce_info.status {
            CeStatus::Undef | CeStatus::Unknown => {
                let target = ce_info
                    .status
                    .tracking_status()
                    .unwrap_or(SubmitStatus::Undef);
                if prev.status != target.code() {
                    self.catalog.set_job_submit_status(sub_id, target).await?;
                }
                if self.quit {
                    self.ce.cancel(&ce_job_id).await;
                }
                Ok(SweepToken::Undef)
            }

            CeStatus::DoneOk => {
                let finalized = self.finalize(sub_id, &ce_job_id).await?;
                let exit_ok = ce_info.exit_code.as_deref() == Some("0");
                if finalized && exit_ok {
                    self.catalog
                        .close_job_submission(
                            sub_id,
                            SubmitStatus::DoneOk,
                            ce_info.description.as_deref(),
                            ce_info.exit_code.as_deref(),
                        )
                        .await?;
                    self.status = JobStatus::Successful;
                    self.catalog.close_job(self.job_id, self.status).await?;
                    return Ok(SweepToken::Successful);
                }
                let code = if !exit_ok {
                    warn!(job = %self.name, exit = ?ce_info.exit_code,
                          "job completed but exit code is not 0");
                    SubmitStatus::DoneOkNonZeroRc
                } else {
                    warn!(job = %self.name, "job completed but finalization failed");
                    SubmitStatus::DoneOkOutputProblem
                };
                self.catalog
                    .close_job_submission(
                        sub_id,
                        code,
                        ce_info.description.as_deref(),
                        ce_info.exit_code.as_deref(),
                    )
                    .await?;
                self.resubmit_or_fail().await
            }

            CeStatus::DoneFailed => {
                let finalized = self.finalize(sub_id, &ce_job_id).await?;
                let code = if finalized {
                    SubmitStatus::DoneFailed
                } else {
                    SubmitStatus::DoneFailedOutputProblem
                };
                self.catalog
                    .close_job_submission(
                        sub_id,
                        code,
                        ce_info.description.as_deref(),
                        ce_info.exit_code.as_deref(),
                    )
                    .await?;
                self.resubmit_or_fail().await
            }

            CeStatus::Cancelled => {
                let finalized = self.finalize(sub_id, &ce_job_id).await?;
                let code = if finalized {
                    SubmitStatus::Cancelled
                } else {
                    SubmitStatus::CancelledOutputProblem
                };
                self.catalog
                    .close_job_submission(
                        sub_id,
                        code,
                        ce_info.description.as_deref(),
                        ce_info.exit_code.as_deref(),
                    )
                    .await?;
                if !self.config.cancelled_resubmit && !self.quit {
                    return self.close_failed().await;
                }
                self.resubmit_or_fail().await
            }

            CeStatus::Aborted => {
                self.catalog
                    .close_job_submission(
                        sub_id,
                        SubmitStatus::Aborted,
                        ce_info.description.as_deref(),
                        ce_info.exit_code.as_deref(),
                    )
                    .await?;
                self.resubmit_or_fail().await
            }

            // Remaining states all track a live submission
            status => {
                if let Some(target) = status.tracking_status() {
                    if prev.status != target.code() {
                        self.catalog.set_job_submit_status(sub_id, target).await?;
                        if status.is_running() {
                            if let Some(node) = &ce_info.worker_node {
                                self.catalog.set_job_worker_node(sub_id, node).await?;
                            }
                            if let Some(user) = &ce_info.local_user {
                                self.catalog.set_job_wn_user(sub_id, user).await?;
                            }
                        }
                    }
                }
                if self.quit {
                    self.ce.cancel(&ce_job_id).await;
                }
                Ok(SweepToken::Active)
            }
        }
    }

    /// The submission ended badly: make the job submittable again, or close
    /// it when the production is quitting.
    async fn resubmit_or_fail(&mut self) -> Result<SweepToken, FsmError> {
        if self.quit {
            warn!(job = %self.name, "production in quit mode, job will not be resubmitted");
            return self.close_failed().await;
        }
        self.status = JobStatus::Created;
        self.catalog.set_job_status(self.job_id, self.status).await?;
        Ok(SweepToken::Created)
    }

    async fn close_failed(&mut self) -> Result<SweepToken, FsmError> {
        self.status = JobStatus::Failed;
        self.catalog.close_job(self.job_id, self.status).await?;
        Ok(SweepToken::Failed)
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Fetch the sandbox, stow it under `submit_NNN/`, parse the logs into
    /// the catalog and purge the CE. True iff the mandatory sandbox files
    /// were present and the logs show no retrieval problem.
    async fn finalize(&self, sub_id: SubmissionId, ce_job_id: &str) -> Result<bool, FsmError> {
        if let Err(err) = self.ce.fetch_output(ce_job_id, &self.job_dir).await {
            warn!(job = %self.name, error = %err, "output retrieval failed");
            return Ok(false);
        }

        let index = self.catalog.get_job_submit_index(sub_id).await?;
        let sub_dir = self.job_dir.join(paths::submit_dir_name(index));
        if let Err(err) = tokio::fs::create_dir_all(&sub_dir).await {
            warn!(job = %self.name, dir = %sub_dir.display(), error = %err,
                  "unable to create submission directory");
            return Ok(false);
        }

        let mut all_present = true;
        for (file, mandatory) in [
            (JOB_OUT, true),
            (JOB_ERR, true),
            (JOB_SH, true),
            (JOB_LOG, false),
            (JOB_STATUS, false),
        ] {
            let src = self.job_dir.join(file);
            if src.exists() {
                if let Err(err) = tokio::fs::rename(&src, sub_dir.join(file)).await {
                    warn!(job = %self.name, file, error = %err, "unable to stow sandbox file");
                    all_present = false;
                }
            } else if mandatory {
                warn!(job = %self.name, file, "expected sandbox file not found");
                all_present = false;
            }
        }
        if !all_present {
            warn!(job = %self.name, "sandbox incomplete, job will not be purged from CE");
            return Ok(false);
        }

        let stdout_text = tokio::fs::read_to_string(sub_dir.join(JOB_OUT))
            .await
            .unwrap_or_default();
        self.record_stdout(sub_id, &stdout_text).await?;

        let stderr_text = tokio::fs::read_to_string(sub_dir.join(JOB_ERR))
            .await
            .unwrap_or_default();
        let report = parse_stderr(&stderr_text);
        if !report.is_clean() {
            warn!(job = %self.name, copy_errors = report.copy_errors,
                  runtime_problem = report.runtime_problem,
                  "problems found in job error log");
            return Ok(false);
        }

        self.ce.purge(ce_job_id).await;
        Ok(true)
    }

    async fn record_stdout(&self, sub_id: SubmissionId, text: &str) -> Result<(), FsmError> {
        let parsed = parse_stdout(text);

        if let Some(node) = &parsed.worker_node {
            info!(job = %self.name, node = %node, "job ran on worker node");
            self.catalog.set_job_worker_node(sub_id, node).await?;
        }
        if let Some(user) = &parsed.wn_user {
            self.catalog.set_job_wn_user(sub_id, user).await?;
        }
        if let Some(dir) = &parsed.wn_dir {
            self.catalog.set_job_wn_dir(sub_id, dir).await?;
        }
        if let Some(stamp) = &parsed.time_start {
            self.catalog.set_job_time_start(sub_id, stamp).await?;
        }
        if let Some(stamp) = &parsed.time_end {
            self.catalog.set_job_time_end(sub_id, stamp).await?;
        }
        if let Some(stamp) = &parsed.prog_start {
            self.catalog.set_run_time_start(sub_id, stamp).await?;
        }
        if let Some(stamp) = &parsed.prog_end {
            self.catalog.set_run_time_end(sub_id, stamp).await?;
        }
        if let Some(events) = parsed.events() {
            info!(job = %self.name, events, "events recorded");
            self.catalog.set_job_n_events(self.job_id, events).await?;
        }
        if !parsed.files.is_empty() {
            self.catalog
                .set_job_n_files(self.job_id, parsed.files.len() as i64)
                .await?;
            for file in &parsed.files {
                info!(job = %self.name, name = %file.name, size = file.size,
                      adler32 = %file.adler32, "artifact recorded");
                match self
                    .catalog
                    .create_job_file(
                        self.job_id,
                        &file.name,
                        &file.file_type,
                        0,
                        0,
                        file.size,
                        &file.adler32,
                    )
                    .await
                {
                    Ok(()) => {}
                    // Re-finalization after a 207/10x close sees the same
                    // artifact names again
                    Err(CatalogError::Conflict(_)) => {
                        debug!(job = %self.name, name = %file.name, "artifact already recorded");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }
}
