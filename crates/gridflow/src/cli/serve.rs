//! Run the production controller.
//!
//! Foreground by default so the controller body stays testable; `--detach`
//! re-launches this same subcommand as a background process with its output
//! tied to the production's log files. Either way a PID lockfile keeps two
//! controllers for one production from coexisting.

use super::Context;
use crate::precondition_bail;
use anyhow::{Context as _, Result};
use clap::ValueEnum;
use gridflow_controller::{Controller, ControllerConfig, LockError, PidLock};
use gridflow_grid::{CeFlavor, ComputeElement, CredentialManager, GridCe};
use gridflow_logging::LogConfig;
use gridflow_protocol::{paths, CredentialConfig, MyProxyConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlavorArg {
    Condor,
    Cream,
}

impl FlavorArg {
    pub(crate) fn as_ce_flavor(self) -> CeFlavor {
        match self {
            FlavorArg::Condor => CeFlavor::Condor,
            FlavorArg::Cream => CeFlavor::Cream,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FlavorArg::Condor => "condor",
            FlavorArg::Cream => "cream",
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Production name
    #[arg(short = 'n', long)]
    pub name: String,

    /// CE protocol flavor
    #[arg(long, value_enum, default_value = "condor")]
    pub flavor: FlavorArg,

    /// Run detached with output on the production log files
    #[arg(long)]
    pub detach: bool,
}

pub async fn run(ctx: &Context, args: ServeArgs) -> Result<()> {
    let catalog = ctx.open_catalog().await?;

    let Some(prod_id) = catalog.get_prod_id(&args.name).await? else {
        precondition_bail!("production '{}' not found in catalog", args.name);
    };
    let info = catalog.get_prod_info(prod_id).await?;
    let prod_dir = PathBuf::from(&info.prod_dir);
    if !prod_dir.is_dir() {
        precondition_bail!("production directory '{}' not found", prod_dir.display());
    }

    if args.detach {
        return spawn_detached(ctx, &args, &prod_dir);
    }

    let lock = match PidLock::acquire(&paths::pid_file(&prod_dir, &args.name)) {
        Ok(lock) => lock,
        Err(LockError::AlreadyLocked(path)) => {
            precondition_bail!(
                "a controller for '{}' is already running (lock at {})",
                args.name,
                path.display()
            );
        }
        Err(err) => return Err(err.into()),
    };

    let _ = gridflow_logging::init_logging(LogConfig::with_file(
        ctx.verbose,
        paths::log_file(&prod_dir, &args.name),
    ));
    info!(production = %args.name, lock = %lock.path().display(), "controller starting");

    let myproxy = MyProxyConfig::from_proxy_info(&info.proxy_info);
    if myproxy.is_none() {
        warn!(
            production = %args.name,
            "no credential-store coordinates on the production, renewing locally"
        );
    }
    let credential = CredentialManager::new(CredentialConfig {
        proxy_file: Some(paths::voms_proxy_file(&prod_dir, &args.name)),
        myproxy,
        ..CredentialConfig::default()
    });
    // The first sweep renews on its own; an early failure is only logged
    if let Err(err) = credential.issue().await {
        warn!(error = %err, "initial credential issuance failed");
    }

    let flavor = args.flavor.as_ce_flavor();
    let ces: Vec<Arc<dyn ComputeElement>> = info
        .ce_list()
        .iter()
        .map(|endpoint| Arc::new(GridCe::new(endpoint, flavor)) as Arc<dyn ComputeElement>)
        .collect();

    let mut controller = Controller::new(
        catalog,
        credential,
        &args.name,
        ces,
        ControllerConfig::default(),
    )
    .await?;
    let report = controller.run().await?;

    println!(
        "Jobs submitted: {} - Jobs successful: {} - Jobs failed: {} - Total events: {}",
        report.n_jobs, report.jobs_ok, report.jobs_fail, report.n_events
    );
    Ok(())
}

/// Re-launch `serve` in the background with stdout/stderr on the production
/// log files.
fn spawn_detached(ctx: &Context, args: &ServeArgs, prod_dir: &Path) -> Result<()> {
    let exe = std::env::current_exe().context("cannot resolve own executable")?;
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths::log_file(prod_dir, &args.name))?;
    let err = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths::err_file(prod_dir, &args.name))?;

    let child = std::process::Command::new(exe)
        .arg("--database")
        .arg(&ctx.database)
        .arg("serve")
        .arg("--name")
        .arg(&args.name)
        .arg("--flavor")
        .arg(args.flavor.as_str())
        .stdin(std::process::Stdio::null())
        .stdout(log)
        .stderr(err)
        .spawn()
        .context("unable to spawn detached controller")?;

    println!(
        "Controller for '{}' started with pid {}",
        args.name,
        child.id()
    );
    Ok(())
}
