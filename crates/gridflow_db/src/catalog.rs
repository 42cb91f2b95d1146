//! Catalog operations.
//!
//! Every public operation runs through [`Catalog::retry`]: transient session
//! failures are retried with a fixed delay up to the attempt budget, then
//! surface as [`CatalogError::Unavailable`]. Each operation commits locally;
//! no transaction spans across public operations.

use crate::error::{CatalogError, Result};
use crate::models::{FileRow, JobRow, JobSubmitRow, ProductionRow};
use crate::schema::SCHEMA;
use chrono::Utc;
use gridflow_protocol::{JobId, JobStatus, ProdId, SubmissionId, SubmitStatus};
use gridflow_protocol::config::{DEFAULT_DB_ATTEMPTS_DELAY_SECS, DEFAULT_DB_ATTEMPTS_MAX};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Catalog connection configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// SQLx connection URL, e.g. `sqlite:prod.sqlite?mode=rwc`.
    pub url: String,
    pub max_connections: u32,
    /// Reconnection attempts per operation before `Unavailable`.
    pub attempts_max: u32,
    pub attempts_delay: Duration,
}

impl CatalogConfig {
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
            attempts_max: DEFAULT_DB_ATTEMPTS_MAX,
            attempts_delay: Duration::from_secs(DEFAULT_DB_ATTEMPTS_DELAY_SECS),
        }
    }

    /// In-memory catalog for tests. A single connection: each in-memory
    /// connection is its own database.
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            attempts_max: 3,
            attempts_delay: Duration::from_millis(10),
        }
    }
}

/// Production flavor recorded in the kind tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProdKind {
    Mc,
    Reco,
    Unknown,
}

/// Everything needed to register a simulation production.
#[derive(Debug, Clone)]
pub struct McProductionSpec {
    pub name: String,
    pub description: String,
    pub user_req: String,
    pub n_events_req: i64,
    pub mc_version: String,
    pub ce_list: Vec<String>,
    pub prod_dir: String,
    pub storage_uri: String,
    pub storage_dir: String,
    pub proxy_info: String,
    pub n_jobs: u32,
}

/// Everything needed to register a reconstruction production.
#[derive(Debug, Clone)]
pub struct RecoProductionSpec {
    pub name: String,
    pub description: String,
    pub run: String,
    pub reco_version: String,
    pub ce_list: Vec<String>,
    pub prod_dir: String,
    pub storage_uri: String,
    pub storage_dir: String,
    pub proxy_info: String,
    pub n_jobs: u32,
}

/// Handle to the production catalog.
#[derive(Clone)]
pub struct Catalog {
    pool: Pool<Sqlite>,
    attempts_max: u32,
    attempts_delay: Duration,
}

fn now_str() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Failures worth reconnecting for. Query/constraint errors are not.
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
    )
}

fn map_terminal(err: sqlx::Error) -> CatalogError {
    if err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        CatalogError::Conflict(err.to_string())
    } else {
        CatalogError::Sqlx(err)
    }
}

impl Catalog {
    /// Open a catalog with default budgets.
    pub async fn open(url: &str) -> Result<Self> {
        Self::open_with(CatalogConfig {
            url: url.to_string(),
            ..CatalogConfig::sqlite("")
        })
        .await
    }

    pub async fn open_with(config: CatalogConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self {
            pool,
            attempts_max: config.attempts_max.max(1),
            attempts_delay: config.attempts_delay,
        })
    }

    /// In-memory catalog with schema applied, for tests.
    pub async fn open_memory() -> Result<Self> {
        let catalog = Self::open_with(CatalogConfig::sqlite_memory()).await?;
        catalog.init_schema().await?;
        Ok(catalog)
    }

    pub async fn init_schema(&self) -> Result<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn retry<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let mut attempts = 0u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) => {
                    attempts += 1;
                    if attempts >= self.attempts_max {
                        warn!(op, attempts, error = %err, "catalog unavailable, budget exhausted");
                        return Err(CatalogError::Unavailable { op, attempts });
                    }
                    warn!(op, attempts, max = self.attempts_max, error = %err,
                          "catalog session error, retrying");
                    tokio::time::sleep(self.attempts_delay).await;
                }
                Err(err) => return Err(map_terminal(err)),
            }
        }
    }

    // ========================================================================
    // Productions
    // ========================================================================

    pub async fn production_exists(&self, name: &str) -> Result<bool> {
        let pool = &self.pool;
        let n: i64 = self
            .retry("production_exists", || async move {
                sqlx::query_scalar("SELECT COUNT(id) FROM production WHERE name = ?")
                    .bind(name)
                    .fetch_one(pool)
                    .await
            })
            .await?;
        Ok(n > 0)
    }

    async fn create_production(
        &self,
        name: &str,
        ce_list: &[String],
        prod_dir: &str,
        storage_uri: &str,
        storage_dir: &str,
        proxy_info: &str,
        n_jobs: u32,
    ) -> Result<ProdId> {
        let pool = &self.pool;
        let prod_ce = ce_list.join(" ");
        let prod_ce = prod_ce.as_str();
        let time_create = now_str();
        let time_create = time_create.as_str();
        let result = self
            .retry("create_production", || async move {
                sqlx::query(
                    r#"
                    INSERT INTO production
                        (name, prod_ce, prod_dir, storage_uri, storage_dir,
                         proxy_info, n_jobs, n_jobs_ok, n_jobs_fail, time_create)
                    VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
                    "#,
                )
                .bind(name)
                .bind(prod_ce)
                .bind(prod_dir)
                .bind(storage_uri)
                .bind(storage_dir)
                .bind(proxy_info)
                .bind(n_jobs as i64)
                .bind(time_create)
                .execute(pool)
                .await
            })
            .await
            .map_err(|err| match err {
                CatalogError::Conflict(_) => {
                    CatalogError::Conflict(format!("production '{name}' already exists"))
                }
                other => other,
            })?;
        Ok(ProdId::new(result.last_insert_rowid()))
    }

    pub async fn create_mc_production(&self, spec: &McProductionSpec) -> Result<ProdId> {
        let prod_id = self
            .create_production(
                &spec.name,
                &spec.ce_list,
                &spec.prod_dir,
                &spec.storage_uri,
                &spec.storage_dir,
                &spec.proxy_info,
                spec.n_jobs,
            )
            .await?;
        let pool = &self.pool;
        let id = prod_id.as_i64();
        self.retry("create_mc_production", || async move {
            sqlx::query(
                r#"
                INSERT INTO mc_prod (production_id, description, user_req, n_events_req, mc_version)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&spec.description)
            .bind(&spec.user_req)
            .bind(spec.n_events_req)
            .bind(&spec.mc_version)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await?;
        Ok(prod_id)
    }

    pub async fn create_reco_production(&self, spec: &RecoProductionSpec) -> Result<ProdId> {
        let prod_id = self
            .create_production(
                &spec.name,
                &spec.ce_list,
                &spec.prod_dir,
                &spec.storage_uri,
                &spec.storage_dir,
                &spec.proxy_info,
                spec.n_jobs,
            )
            .await?;
        let pool = &self.pool;
        let id = prod_id.as_i64();
        self.retry("create_reco_production", || async move {
            sqlx::query(
                r#"
                INSERT INTO reco_prod (production_id, description, run, reco_version)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&spec.description)
            .bind(&spec.run)
            .bind(&spec.reco_version)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await?;
        Ok(prod_id)
    }

    pub async fn get_prod_id(&self, name: &str) -> Result<Option<ProdId>> {
        let pool = &self.pool;
        let id: Option<i64> = self
            .retry("get_prod_id", || async move {
                sqlx::query_scalar("SELECT id FROM production WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
            })
            .await?;
        Ok(id.map(ProdId::new))
    }

    pub async fn get_prod_info(&self, prod_id: ProdId) -> Result<ProductionRow> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        let row: Option<ProductionRow> = self
            .retry("get_prod_info", || async move {
                sqlx::query_as("SELECT * FROM production WHERE id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            })
            .await?;
        row.ok_or_else(|| CatalogError::not_found(format!("production {prod_id}")))
    }

    pub async fn get_prod_type(&self, prod_id: ProdId) -> Result<ProdKind> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        let reco: Option<i64> = self
            .retry("get_prod_type_reco", || async move {
                sqlx::query_scalar("SELECT production_id FROM reco_prod WHERE production_id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            })
            .await?;
        if reco.is_some() {
            return Ok(ProdKind::Reco);
        }
        let mc: Option<i64> = self
            .retry("get_prod_type_mc", || async move {
                sqlx::query_scalar("SELECT production_id FROM mc_prod WHERE production_id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            })
            .await?;
        if mc.is_some() {
            return Ok(ProdKind::Mc);
        }
        Ok(ProdKind::Unknown)
    }

    pub async fn list_productions(&self) -> Result<Vec<ProductionRow>> {
        let pool = &self.pool;
        self.retry("list_productions", || async move {
            sqlx::query_as("SELECT * FROM production ORDER BY name")
                .fetch_all(pool)
                .await
        })
        .await
    }

    pub async fn set_prod_job_numbers(
        &self,
        prod_id: ProdId,
        jobs_ok: u32,
        jobs_fail: u32,
    ) -> Result<()> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        self.retry("set_prod_job_numbers", || async move {
            sqlx::query("UPDATE production SET n_jobs_ok = ?, n_jobs_fail = ? WHERE id = ?")
                .bind(jobs_ok as i64)
                .bind(jobs_fail as i64)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    pub async fn set_prod_n_events(&self, prod_id: ProdId, n_events: i64) -> Result<()> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        self.retry("set_prod_n_events", || async move {
            sqlx::query("UPDATE production SET n_events = ? WHERE id = ?")
                .bind(n_events)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    /// Sum of recorded event counts over this production's jobs.
    pub async fn get_prod_total_events(&self, prod_id: ProdId) -> Result<i64> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        let total: Option<i64> = self
            .retry("get_prod_total_events", || async move {
                sqlx::query_scalar("SELECT SUM(n_events) FROM job WHERE production_id = ?")
                    .bind(id)
                    .fetch_one(pool)
                    .await
            })
            .await?;
        Ok(total.unwrap_or(0))
    }

    pub async fn close_prod(
        &self,
        prod_id: ProdId,
        jobs_ok: u32,
        jobs_fail: u32,
        n_events: i64,
    ) -> Result<()> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        let stamp = now_str();
        let stamp = stamp.as_str();
        self.retry("close_prod", || async move {
            sqlx::query(
                r#"
                UPDATE production
                SET time_complete = ?, n_jobs_ok = ?, n_jobs_fail = ?, n_events = ?
                WHERE id = ?
                "#,
            )
            .bind(stamp)
            .bind(jobs_ok as i64)
            .bind(jobs_fail as i64)
            .bind(n_events)
            .bind(id)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await
    }

    /// Rename a production row (deletion tooling).
    pub async fn rename_production(&self, prod_id: ProdId, new_name: &str) -> Result<()> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        self.retry("rename_production", || async move {
            sqlx::query("UPDATE production SET name = ? WHERE id = ?")
                .bind(new_name)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub async fn create_job(
        &self,
        prod_id: ProdId,
        name: &str,
        job_dir: &str,
        configuration: &str,
        input_list: Option<&str>,
        random: Option<&str>,
    ) -> Result<JobId> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        let time_create = now_str();
        let time_create = time_create.as_str();
        let result = self
            .retry("create_job", || async move {
                sqlx::query(
                    r#"
                    INSERT INTO job
                        (production_id, name, job_dir, configuration, input_list,
                         random, status, time_create)
                    VALUES (?, ?, ?, ?, ?, ?, 0, ?)
                    "#,
                )
                .bind(id)
                .bind(name)
                .bind(job_dir)
                .bind(configuration)
                .bind(input_list)
                .bind(random)
                .bind(time_create)
                .execute(pool)
                .await
            })
            .await?;
        Ok(JobId::new(result.last_insert_rowid()))
    }

    pub async fn list_job_ids(&self, prod_id: ProdId) -> Result<Vec<JobId>> {
        let pool = &self.pool;
        let id = prod_id.as_i64();
        let rows: Vec<i64> = self
            .retry("list_job_ids", || async move {
                sqlx::query_scalar("SELECT id FROM job WHERE production_id = ? ORDER BY id")
                    .bind(id)
                    .fetch_all(pool)
                    .await
            })
            .await?;
        Ok(rows.into_iter().map(JobId::new).collect())
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<JobRow> {
        let pool = &self.pool;
        let id = job_id.as_i64();
        let row: Option<JobRow> = self
            .retry("get_job", || async move {
                sqlx::query_as("SELECT * FROM job WHERE id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            })
            .await?;
        row.ok_or_else(|| CatalogError::not_found(format!("job {job_id}")))
    }

    pub async fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<()> {
        let pool = &self.pool;
        let id = job_id.as_i64();
        self.retry("set_job_status", || async move {
            sqlx::query("UPDATE job SET status = ? WHERE id = ?")
                .bind(status.code())
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    /// Stamp `time_complete` and record the terminal status.
    pub async fn close_job(&self, job_id: JobId, status: JobStatus) -> Result<()> {
        let pool = &self.pool;
        let id = job_id.as_i64();
        let stamp = now_str();
        let stamp = stamp.as_str();
        self.retry("close_job", || async move {
            sqlx::query("UPDATE job SET status = ?, time_complete = ? WHERE id = ?")
                .bind(status.code())
                .bind(stamp)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    pub async fn set_job_n_events(&self, job_id: JobId, n_events: i64) -> Result<()> {
        let pool = &self.pool;
        let id = job_id.as_i64();
        self.retry("set_job_n_events", || async move {
            sqlx::query("UPDATE job SET n_events = ? WHERE id = ?")
                .bind(n_events)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    pub async fn set_job_n_files(&self, job_id: JobId, n_files: i64) -> Result<()> {
        let pool = &self.pool;
        let id = job_id.as_i64();
        self.retry("set_job_n_files", || async move {
            sqlx::query("UPDATE job SET n_files = ? WHERE id = ?")
                .bind(n_files)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    // ========================================================================
    // Submissions
    // ========================================================================

    /// Insert a submission row in Unsubmitted state. The caller supplies the
    /// per-job index and the schema enforces its uniqueness.
    pub async fn create_job_submission(
        &self,
        job_id: JobId,
        submit_index: u32,
    ) -> Result<SubmissionId> {
        let pool = &self.pool;
        let id = job_id.as_i64();
        let stamp = now_str();
        let stamp = stamp.as_str();
        let result = self
            .retry("create_job_submission", || async move {
                sqlx::query(
                    r#"
                    INSERT INTO job_submit (job_id, submit_index, status, time_submit)
                    VALUES (?, ?, 0, ?)
                    "#,
                )
                .bind(id)
                .bind(submit_index as i64)
                .bind(stamp)
                .execute(pool)
                .await
            })
            .await?;
        Ok(SubmissionId::new(result.last_insert_rowid()))
    }

    /// Record CE acceptance: status becomes Registered, submit time is
    /// refreshed to the moment the CE took the job.
    pub async fn set_job_submitted(&self, sub_id: SubmissionId, ce_job_id: &str) -> Result<()> {
        let pool = &self.pool;
        let id = sub_id.as_i64();
        let stamp = now_str();
        let stamp = stamp.as_str();
        self.retry("set_job_submitted", || async move {
            sqlx::query(
                "UPDATE job_submit SET status = ?, ce_job_id = ?, time_submit = ? WHERE id = ?",
            )
            .bind(SubmitStatus::Registered.code())
            .bind(ce_job_id)
            .bind(stamp)
            .bind(id)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await
    }

    pub async fn set_job_submit_status(
        &self,
        sub_id: SubmissionId,
        status: SubmitStatus,
    ) -> Result<()> {
        let pool = &self.pool;
        let id = sub_id.as_i64();
        self.retry("set_job_submit_status", || async move {
            sqlx::query("UPDATE job_submit SET status = ? WHERE id = ?")
                .bind(status.code())
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    /// Stamp `time_complete` and write the final status plus the optional
    /// CE-reported description and exit code.
    pub async fn close_job_submission(
        &self,
        sub_id: SubmissionId,
        status: SubmitStatus,
        description: Option<&str>,
        exit_code: Option<&str>,
    ) -> Result<()> {
        let pool = &self.pool;
        let id = sub_id.as_i64();
        let stamp = now_str();
        let stamp = stamp.as_str();
        self.retry("close_job_submission", || async move {
            sqlx::query(
                r#"
                UPDATE job_submit
                SET status = ?, time_complete = ?,
                    description = COALESCE(?, description),
                    exit_code = COALESCE(?, exit_code)
                WHERE id = ?
                "#,
            )
            .bind(status.code())
            .bind(stamp)
            .bind(description)
            .bind(exit_code)
            .bind(id)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await
    }

    pub async fn get_job_submit_info(&self, sub_id: SubmissionId) -> Result<JobSubmitRow> {
        let pool = &self.pool;
        let id = sub_id.as_i64();
        let row: Option<JobSubmitRow> = self
            .retry("get_job_submit_info", || async move {
                sqlx::query_as("SELECT * FROM job_submit WHERE id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            })
            .await?;
        row.ok_or_else(|| CatalogError::not_found(format!("submission {sub_id}")))
    }

    pub async fn get_job_submit_index(&self, sub_id: SubmissionId) -> Result<u32> {
        let row = self.get_job_submit_info(sub_id).await?;
        u32::try_from(row.submit_index)
            .map_err(|_| CatalogError::invalid_data(format!("submit_index {}", row.submit_index)))
    }

    pub async fn list_job_submissions(&self, job_id: JobId) -> Result<Vec<JobSubmitRow>> {
        let pool = &self.pool;
        let id = job_id.as_i64();
        self.retry("list_job_submissions", || async move {
            sqlx::query_as("SELECT * FROM job_submit WHERE job_id = ? ORDER BY submit_index")
                .bind(id)
                .fetch_all(pool)
                .await
        })
        .await
    }

    /// Production name owning a submission with this CE job id, if any.
    pub async fn find_prod_by_ce_job_id(&self, ce_job_id: &str) -> Result<Option<String>> {
        let pool = &self.pool;
        self.retry("find_prod_by_ce_job_id", || async move {
            sqlx::query_scalar(
                r#"
                SELECT p.name
                FROM job_submit s
                    INNER JOIN job j ON s.job_id = j.id
                    INNER JOIN production p ON j.production_id = p.id
                WHERE s.ce_job_id = ?
                "#,
            )
            .bind(ce_job_id)
            .fetch_optional(pool)
            .await
        })
        .await
    }

    /// Shared body of the per-column submission setters. `column` is always
    /// one of the fixed identifiers below, never user input.
    async fn set_submit_field(
        &self,
        op: &'static str,
        column: &'static str,
        sub_id: SubmissionId,
        value: &str,
    ) -> Result<()> {
        let pool = &self.pool;
        let id = sub_id.as_i64();
        let sql = format!("UPDATE job_submit SET {column} = ? WHERE id = ?");
        let sql = sql.as_str();
        self.retry(op, || async move {
            sqlx::query(sql)
                .bind(value)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    pub async fn set_job_worker_node(&self, sub_id: SubmissionId, node: &str) -> Result<()> {
        self.set_submit_field("set_job_worker_node", "worker_node", sub_id, node)
            .await
    }

    pub async fn set_job_wn_user(&self, sub_id: SubmissionId, user: &str) -> Result<()> {
        self.set_submit_field("set_job_wn_user", "wn_user", sub_id, user)
            .await
    }

    pub async fn set_job_wn_dir(&self, sub_id: SubmissionId, dir: &str) -> Result<()> {
        self.set_submit_field("set_job_wn_dir", "wn_dir", sub_id, dir)
            .await
    }

    /// Wall-clock start of the job wrapper on the worker node.
    pub async fn set_job_time_start(&self, sub_id: SubmissionId, stamp: &str) -> Result<()> {
        self.set_submit_field("set_job_time_start", "time_job_start", sub_id, stamp)
            .await
    }

    pub async fn set_job_time_end(&self, sub_id: SubmissionId, stamp: &str) -> Result<()> {
        self.set_submit_field("set_job_time_end", "time_job_end", sub_id, stamp)
            .await
    }

    /// Start of the payload program, inside the job wrapper bracket.
    pub async fn set_run_time_start(&self, sub_id: SubmissionId, stamp: &str) -> Result<()> {
        self.set_submit_field("set_run_time_start", "time_run_start", sub_id, stamp)
            .await
    }

    pub async fn set_run_time_end(&self, sub_id: SubmissionId, stamp: &str) -> Result<()> {
        self.set_submit_field("set_run_time_end", "time_run_end", sub_id, stamp)
            .await
    }

    // ========================================================================
    // Artifacts
    // ========================================================================

    pub async fn create_job_file(
        &self,
        job_id: JobId,
        name: &str,
        file_type: &str,
        seq_index: i64,
        n_events: i64,
        size: i64,
        adler32: &str,
    ) -> Result<()> {
        let pool = &self.pool;
        let id = job_id.as_i64();
        self.retry("create_job_file", || async move {
            sqlx::query(
                r#"
                INSERT INTO file (job_id, name, type, seq_index, n_events, size, adler32)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(file_type)
            .bind(seq_index)
            .bind(n_events)
            .bind(size)
            .bind(adler32)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await
        .map_err(|err| match err {
            CatalogError::Conflict(_) => CatalogError::Conflict(format!(
                "file '{name}' already recorded for job {job_id}"
            )),
            other => other,
        })
    }

    pub async fn get_prod_file_list(&self, prod_name: &str) -> Result<Vec<String>> {
        let pool = &self.pool;
        let mut names: Vec<String> = self
            .retry("get_prod_file_list", || async move {
                sqlx::query_scalar(
                    r#"
                    SELECT f.name
                    FROM file f
                        INNER JOIN job j ON j.id = f.job_id
                        INNER JOIN production p ON p.id = j.production_id
                    WHERE p.name = ?
                    "#,
                )
                .bind(prod_name)
                .fetch_all(pool)
                .await
            })
            .await?;
        names.sort();
        Ok(names)
    }

    /// Name, size and checksum of every artifact in a production.
    pub async fn get_prod_files_attr(&self, prod_name: &str) -> Result<Vec<FileRow>> {
        let pool = &self.pool;
        self.retry("get_prod_files_attr", || async move {
            sqlx::query_as(
                r#"
                SELECT f.*
                FROM file f
                    INNER JOIN job j ON j.id = f.job_id
                    INNER JOIN production p ON p.id = j.production_id
                WHERE p.name = ?
                ORDER BY f.name
                "#,
            )
            .bind(prod_name)
            .fetch_all(pool)
            .await
        })
        .await
    }
}
