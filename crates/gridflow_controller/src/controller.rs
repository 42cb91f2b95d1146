//! Production controller.
//!
//! Owns the per-job state machines and drives one sweep per tick: renew the
//! delegated credential, honor the quit sentinel, update every job,
//! persist rollups when they move, and sleep a jittered interval. The loop
//! exits when no job is left in a non-terminal state.

use anyhow::{bail, Context, Result};
use gridflow_db::Catalog;
use gridflow_grid::{ComputeElement, CredentialManager};
use gridflow_protocol::config::UNDEF_SWEEPS_MAX;
use gridflow_protocol::{paths, FsmConfig, ProdId, SweepConfig};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::fsm::{JobFsm, SweepToken};

/// Controller tuning, fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerConfig {
    pub sweep: SweepConfig,
    pub fsm: FsmConfig,
}

/// Per-sweep aggregation over all jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounters {
    pub created: u32,
    pub active: u32,
    pub successful: u32,
    pub failed: u32,
    pub undef: u32,
}

impl SweepCounters {
    fn add(&mut self, token: SweepToken) {
        match token {
            SweepToken::Created => self.created += 1,
            SweepToken::Active => self.active += 1,
            SweepToken::Successful => self.successful += 1,
            SweepToken::Failed => self.failed += 1,
            SweepToken::Undef => self.undef += 1,
        }
    }

    /// Jobs still needing attention. Zero means the production is drained.
    pub fn unfinished(&self) -> u32 {
        self.created + self.active + self.undef
    }
}

/// Final numbers reported when the production drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerReport {
    pub n_jobs: u32,
    pub jobs_ok: u32,
    pub jobs_fail: u32,
    pub n_events: i64,
}

/// Long-running supervisor for one production.
pub struct Controller {
    prod_id: ProdId,
    prod_name: String,
    prod_dir: PathBuf,
    n_jobs: u32,
    catalog: Catalog,
    credential: CredentialManager,
    fsms: Vec<JobFsm>,
    delay: Duration,
    jitter: Duration,
    quit_delay: Duration,
    quitting: bool,
}

impl Controller {
    /// Load the production from the catalog and build one state machine per
    /// job, assigning CEs round-robin from a random starting offset.
    pub async fn new(
        catalog: Catalog,
        credential: CredentialManager,
        prod_name: &str,
        ces: Vec<Arc<dyn ComputeElement>>,
        config: ControllerConfig,
    ) -> Result<Self> {
        if ces.is_empty() {
            bail!("no CE endpoints configured for production '{prod_name}'");
        }

        let prod_id = catalog
            .get_prod_id(prod_name)
            .await?
            .with_context(|| format!("production '{prod_name}' not found in catalog"))?;
        let prod_info = catalog.get_prod_info(prod_id).await?;

        let prod_dir = PathBuf::from(&prod_info.prod_dir);
        if !prod_dir.is_dir() {
            bail!("production directory '{}' not found", prod_dir.display());
        }

        let job_ids = catalog.list_job_ids(prod_id).await?;
        if job_ids.len() as i64 != prod_info.n_jobs {
            bail!(
                "catalog job count {} does not match production plan {}",
                job_ids.len(),
                prod_info.n_jobs
            );
        }

        let mut ce_idx = rand::thread_rng().gen_range(0..ces.len());
        let mut fsms = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            let fsm = JobFsm::load(
                catalog.clone(),
                job_id,
                &prod_dir,
                Arc::clone(&ces[ce_idx]),
                config.fsm,
            )
            .await?;
            ce_idx = (ce_idx + 1) % ces.len();
            fsms.push(fsm);
        }

        Ok(Self {
            prod_id,
            prod_name: prod_name.to_string(),
            prod_dir,
            n_jobs: prod_info.n_jobs as u32,
            catalog,
            credential,
            fsms,
            delay: config.sweep.delay,
            jitter: config.sweep.jitter,
            quit_delay: config.sweep.quit_delay,
            quitting: false,
        })
    }

    pub fn prod_id(&self) -> ProdId {
        self.prod_id
    }

    /// Drive the production to completion.
    pub async fn run(&mut self) -> Result<ControllerReport> {
        info!(production = %self.prod_name, jobs = self.n_jobs, "=== starting production ===");

        let mut undef_streak = 0u32;
        let mut last_rollup = (0u32, 0u32);
        let final_counters;

        loop {
            // Credential trouble is not fatal: CE calls will fail and be
            // retried on later sweeps
            if let Err(err) = self.credential.ensure_valid_default().await {
                warn!(error = %err, "credential renewal failed, proceeding with sweep");
            }

            if !self.quitting && paths::quit_file(&self.prod_dir).exists() {
                info!(production = %self.prod_name, "quit sentinel found, quitting production");
                self.quit_production();
            }

            let counters = self.sweep().await?;

            if (counters.successful, counters.failed) != last_rollup {
                self.catalog
                    .set_prod_job_numbers(self.prod_id, counters.successful, counters.failed)
                    .await?;
                let events = self.catalog.get_prod_total_events(self.prod_id).await?;
                self.catalog.set_prod_n_events(self.prod_id, events).await?;
                last_rollup = (counters.successful, counters.failed);
            }

            info!(
                production = %self.prod_name,
                "Jobs: unsubmitted {} active {} success {} fail {} undef {}",
                counters.created, counters.active, counters.successful,
                counters.failed, counters.undef
            );

            if counters.unfinished() == 0 {
                info!(production = %self.prod_name, "no unfinished jobs left, production is done");
                final_counters = counters;
                break;
            }

            if counters.undef == 0 {
                undef_streak = 0;
            } else {
                undef_streak += 1;
                if undef_streak < UNDEF_SWEEPS_MAX {
                    warn!(
                        jobs = counters.undef,
                        sweeps = undef_streak,
                        "jobs in UNDEF state"
                    );
                } else if !self.quitting {
                    warn!(
                        sweeps = undef_streak,
                        "too many consecutive sweeps with UNDEF jobs, quitting production"
                    );
                    self.quit_production();
                }
            }

            self.sleep_between_sweeps().await;
        }

        let n_events = self.catalog.get_prod_total_events(self.prod_id).await?;
        self.catalog
            .close_prod(
                self.prod_id,
                final_counters.successful,
                final_counters.failed,
                n_events,
            )
            .await?;

        let report = ControllerReport {
            n_jobs: self.n_jobs,
            jobs_ok: final_counters.successful,
            jobs_fail: final_counters.failed,
            n_events,
        };
        info!(
            production = %self.prod_name,
            jobs = report.n_jobs, ok = report.jobs_ok, fail = report.jobs_fail,
            events = report.n_events,
            "=== ending production ==="
        );
        Ok(report)
    }

    /// Update every job once. A poisoned job is contained and counted as
    /// Undef; only catalog unavailability stops the production.
    async fn sweep(&mut self) -> Result<SweepCounters> {
        info!(production = %self.prod_name, "checking status of production jobs");
        let mut counters = SweepCounters::default();
        for fsm in &mut self.fsms {
            match fsm.update().await {
                Ok(token) => counters.add(token),
                Err(err) if err.is_fatal() => {
                    return Err(err).context("catalog lost while sweeping");
                }
                Err(err) => {
                    warn!(job = %fsm.name(), error = %err,
                          "job sweep failed, counting as UNDEF");
                    counters.undef += 1;
                }
            }
        }
        Ok(counters)
    }

    /// Tell every job to wind down and tighten the sweep cadence.
    pub fn quit_production(&mut self) {
        for fsm in &mut self.fsms {
            fsm.set_quit();
        }
        self.delay = self.quit_delay;
        self.jitter = Duration::ZERO;
        self.quitting = true;
    }

    async fn sleep_between_sweeps(&self) {
        let jitter_secs = self.jitter.as_secs();
        let jitter = if jitter_secs == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(rand::thread_rng().gen_range(0..=jitter_secs))
        };
        tokio::time::sleep(self.delay + jitter).await;
    }
}
