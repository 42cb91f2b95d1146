//! Job factories.
//!
//! A factory performs the one-time layout of a new production: one
//! `jobNNNNN/` directory per job holding the payload script, its
//! configuration, the submission descriptor and a private credential copy.
//! The two production flavors differ only in how they slice work into jobs
//! (seed pairs vs raw-file chunks); the controller never cares which one
//! built the tree.

mod mc;
mod reco;

pub use mc::{McFactory, SeedList};
pub use reco::RecoFactory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gridflow_grid::Storage;
use gridflow_protocol::paths::{JOB_PROXY, JOB_SCRIPT, JOB_SUB_DESCRIPTOR};
use gridflow_protocol::MyProxyConfig;
use std::path::Path;

/// One job the factory laid out, ready to register in the catalog.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    /// Directory relative to the production directory (same as `name`).
    pub job_dir: String,
    /// Textual payload configuration recorded on the job row.
    pub configuration: String,
    pub input_list: Option<String>,
    /// Seed pair for simulation jobs.
    pub random: Option<String>,
}

/// Shared inputs for the per-job layout.
pub struct FactoryContext<'a> {
    pub prod_name: &'a str,
    /// Local production directory (already created, empty).
    pub prod_dir: &'a Path,
    pub version: &'a str,
    pub storage_uri: &'a str,
    pub storage_dir: &'a str,
    /// Payload script copied into every job directory.
    pub script_path: &'a Path,
    /// Local delegated credential shipped with every job.
    pub proxy_local: &'a Path,
    pub myproxy: &'a MyProxyConfig,
    /// Storage adapter, used by flavors that derive jobs from stored input.
    pub storage: &'a dyn Storage,
}

/// Flavor-specific production layout.
#[async_trait]
pub trait JobFactory: Send + Sync {
    /// Write the on-disk job tree under `ctx.prod_dir` and return the specs
    /// to register in the catalog, in job order.
    async fn layout_jobs(&self, ctx: &FactoryContext<'_>) -> Result<Vec<JobSpec>>;
}

/// Copy the payload script and the delegated credential into a job
/// directory. The credential copy is private to the job (mode 0600).
pub(crate) fn stage_common_files(ctx: &FactoryContext<'_>, job_dir: &Path) -> Result<()> {
    let script = job_dir.join(JOB_SCRIPT);
    std::fs::copy(ctx.script_path, &script).with_context(|| {
        format!(
            "unable to copy payload script {} to {}",
            ctx.script_path.display(),
            script.display()
        )
    })?;

    let proxy = job_dir.join(JOB_PROXY);
    std::fs::copy(ctx.proxy_local, &proxy).with_context(|| {
        format!(
            "unable to copy credential {} to {}",
            ctx.proxy_local.display(),
            proxy.display()
        )
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&proxy, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("unable to restrict permissions on {}", proxy.display()))?;
    }
    Ok(())
}

/// Write the submission descriptor for one job.
///
/// `arguments` is the payload command line; `extra_inputs` are job files to
/// ship beyond the script and the credential.
pub(crate) fn write_descriptor(
    ctx: &FactoryContext<'_>,
    job_dir: &Path,
    arguments: &str,
    extra_inputs: &[&str],
) -> Result<()> {
    let mut inputs = vec![JOB_SCRIPT.to_string()];
    inputs.extend(extra_inputs.iter().map(|s| s.to_string()));
    inputs.push(JOB_PROXY.to_string());

    let descriptor = format!(
        "universe = vanilla\n\
         +Owner = undefined\n\
         executable = /usr/bin/python\n\
         transfer_executable = False\n\
         arguments = {arguments}\n\
         output = job.out\n\
         error = job.err\n\
         log = job.log\n\
         should_transfer_files = yes\n\
         transfer_input_files = {inputs}\n\
         transfer_output_files = job.sh\n\
         when_to_transfer_output = on_exit\n\
         x509userproxy = {proxy}\n\
         MyProxyHost = {server}:{port}\n\
         MyProxyCredentialName = {credname}\n\
         MyProxyPassword = {passwd}\n\
         MyProxyRefreshThreshold = 600\n\
         MyProxyNewProxyLifetime = 1440\n\
         queue\n",
        inputs = inputs.join(","),
        proxy = JOB_PROXY,
        server = ctx.myproxy.server,
        port = ctx.myproxy.port,
        credname = ctx.myproxy.name,
        passwd = ctx.myproxy.passwd,
    );

    let path = job_dir.join(JOB_SUB_DESCRIPTOR);
    std::fs::write(&path, descriptor)
        .with_context(|| format!("unable to write descriptor {}", path.display()))
}
