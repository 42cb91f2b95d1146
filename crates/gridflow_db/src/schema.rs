//! Catalog schema.
//!
//! One production owns its jobs; one job owns its submissions and files.
//! Kind-specific columns (MC vs reconstruction) live in side tables keyed by
//! production id.

/// DDL statements executed by [`crate::Catalog::init_schema`], in order.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS production (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        name          TEXT NOT NULL UNIQUE,
        prod_ce       TEXT NOT NULL,
        prod_dir      TEXT NOT NULL,
        storage_uri   TEXT NOT NULL,
        storage_dir   TEXT NOT NULL,
        proxy_info    TEXT NOT NULL,
        n_jobs        INTEGER NOT NULL,
        n_jobs_ok     INTEGER NOT NULL DEFAULT 0,
        n_jobs_fail   INTEGER NOT NULL DEFAULT 0,
        n_events      INTEGER NOT NULL DEFAULT 0,
        time_create   TEXT NOT NULL,
        time_complete TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mc_prod (
        production_id INTEGER PRIMARY KEY REFERENCES production(id),
        description   TEXT NOT NULL,
        user_req      TEXT NOT NULL,
        n_events_req  INTEGER NOT NULL,
        mc_version    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reco_prod (
        production_id INTEGER PRIMARY KEY REFERENCES production(id),
        description   TEXT NOT NULL,
        run           TEXT NOT NULL,
        reco_version  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        production_id INTEGER NOT NULL REFERENCES production(id),
        name          TEXT NOT NULL,
        job_dir       TEXT NOT NULL,
        configuration TEXT NOT NULL,
        input_list    TEXT,
        random        TEXT,
        status        INTEGER NOT NULL DEFAULT 0,
        n_events      INTEGER NOT NULL DEFAULT 0,
        n_files       INTEGER NOT NULL DEFAULT 0,
        time_create   TEXT NOT NULL,
        time_complete TEXT,
        UNIQUE (production_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_submit (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id         INTEGER NOT NULL REFERENCES job(id),
        submit_index   INTEGER NOT NULL,
        status         INTEGER NOT NULL DEFAULT 0,
        ce_job_id      TEXT,
        worker_node    TEXT,
        wn_user        TEXT,
        wn_dir         TEXT,
        description    TEXT,
        exit_code      TEXT,
        time_submit    TEXT,
        time_complete  TEXT,
        time_job_start TEXT,
        time_job_end   TEXT,
        time_run_start TEXT,
        time_run_end   TEXT,
        UNIQUE (job_id, submit_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id    INTEGER NOT NULL REFERENCES job(id),
        name      TEXT NOT NULL,
        type      TEXT NOT NULL,
        seq_index INTEGER NOT NULL DEFAULT 0,
        n_events  INTEGER NOT NULL DEFAULT 0,
        size      INTEGER NOT NULL DEFAULT 0,
        adler32   TEXT,
        UNIQUE (job_id, name)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_production ON job(production_id)",
    "CREATE INDEX IF NOT EXISTS idx_submit_job ON job_submit(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_submit_ce_job ON job_submit(ce_job_id)",
    "CREATE INDEX IF NOT EXISTS idx_file_job ON file(job_id)",
];
