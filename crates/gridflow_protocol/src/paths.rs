//! On-disk layout of a production tree.
//!
//! `prod/<version>/<name>/` holds the credential files, the controller
//! lockfile and logs, the optional quit sentinel, and one `jobNNNNN/`
//! directory per job. Finalized submissions leave a `submit_NNN/` directory
//! with the retrieved sandbox inside the job directory.

use std::path::{Path, PathBuf};

/// Root of all production trees, relative to the controller's cwd.
pub const PROD_ROOT: &str = "prod";

/// Quit sentinel file name, valid at production and job scope.
pub const QUIT_FILE: &str = "quit";

/// Sandbox file names a finished job is expected to return.
pub const JOB_OUT: &str = "job.out";
pub const JOB_ERR: &str = "job.err";
pub const JOB_LOG: &str = "job.log";
pub const JOB_SH: &str = "job.sh";
pub const JOB_STATUS: &str = "job.status";

/// Files the factory writes into each job directory.
pub const JOB_SCRIPT: &str = "job.py";
pub const JOB_MACRO: &str = "job.mac";
pub const JOB_LIST: &str = "job.list";
pub const JOB_SUB_DESCRIPTOR: &str = "job.sub";
pub const JOB_JDL_DESCRIPTOR: &str = "job.jdl";
/// Per-job copy of the delegated credential, mode 0600.
pub const JOB_PROXY: &str = "job.proxy";

/// `prod/<version>/<name>`
pub fn prod_dir(version: &str, name: &str) -> PathBuf {
    Path::new(PROD_ROOT).join(version).join(name)
}

/// `jobNNNNN` directory name for the given 0-based job index.
pub fn job_dir_name(index: u32) -> String {
    format!("job{index:05}")
}

/// `submit_NNN` directory name for the given submission index.
pub fn submit_dir_name(index: u32) -> String {
    format!("submit_{index:03}")
}

pub fn quit_file(dir: &Path) -> PathBuf {
    dir.join(QUIT_FILE)
}

/// Long-lived credential handle: `<prod_dir>/<name>.proxy`
pub fn long_proxy_file(prod_dir: &Path, name: &str) -> PathBuf {
    prod_dir.join(format!("{name}.proxy"))
}

/// Delegated credential: `<prod_dir>/<name>.voms`
pub fn voms_proxy_file(prod_dir: &Path, name: &str) -> PathBuf {
    prod_dir.join(format!("{name}.voms"))
}

/// Controller lockfile: `<prod_dir>/<name>.pid`
pub fn pid_file(prod_dir: &Path, name: &str) -> PathBuf {
    prod_dir.join(format!("{name}.pid"))
}

/// Controller log: `<prod_dir>/<name>.log`
pub fn log_file(prod_dir: &Path, name: &str) -> PathBuf {
    prod_dir.join(format!("{name}.log"))
}

/// Controller error log: `<prod_dir>/<name>.err`
pub fn err_file(prod_dir: &Path, name: &str) -> PathBuf {
    prod_dir.join(format!("{name}.err"))
}
