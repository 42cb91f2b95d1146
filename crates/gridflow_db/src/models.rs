//! Row structs mapped from the catalog tables.

use gridflow_protocol::{JobStatus, SubmitStatus};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProductionRow {
    pub id: i64,
    pub name: String,
    /// Space-separated CE endpoint list, `host:port` each.
    pub prod_ce: String,
    pub prod_dir: String,
    pub storage_uri: String,
    pub storage_dir: String,
    pub proxy_info: String,
    pub n_jobs: i64,
    pub n_jobs_ok: i64,
    pub n_jobs_fail: i64,
    pub n_events: i64,
    pub time_create: String,
    pub time_complete: Option<String>,
}

impl ProductionRow {
    /// CE endpoints as a list, in catalog order.
    pub fn ce_list(&self) -> Vec<String> {
        self.prod_ce
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobRow {
    pub id: i64,
    pub production_id: i64,
    pub name: String,
    /// Directory relative to the production directory.
    pub job_dir: String,
    pub configuration: String,
    pub input_list: Option<String>,
    /// Seed pair `<seed1>,<seed2>` for simulation jobs.
    pub random: Option<String>,
    pub status: i64,
    pub n_events: i64,
    pub n_files: i64,
    pub time_create: String,
    pub time_complete: Option<String>,
}

impl JobRow {
    pub fn job_status(&self) -> Option<JobStatus> {
        JobStatus::from_code(self.status)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobSubmitRow {
    pub id: i64,
    pub job_id: i64,
    pub submit_index: i64,
    pub status: i64,
    pub ce_job_id: Option<String>,
    pub worker_node: Option<String>,
    pub wn_user: Option<String>,
    pub wn_dir: Option<String>,
    pub description: Option<String>,
    pub exit_code: Option<String>,
    pub time_submit: Option<String>,
    pub time_complete: Option<String>,
    pub time_job_start: Option<String>,
    pub time_job_end: Option<String>,
    pub time_run_start: Option<String>,
    pub time_run_end: Option<String>,
}

impl JobSubmitRow {
    pub fn submit_status(&self) -> Option<SubmitStatus> {
        SubmitStatus::from_code(self.status)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRow {
    pub job_id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub file_type: String,
    pub seq_index: i64,
    pub n_events: i64,
    pub size: i64,
    pub adler32: Option<String>,
}
