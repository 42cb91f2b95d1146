//! Shared pieces of the production front-ends.
//!
//! Both flavors walk the same road: register the long-lived credential,
//! locate the local delegated proxy, prepare the storage and local
//! directories, then hand over to the controller.

use super::serve::{self, FlavorArg, ServeArgs};
use super::Context;
use crate::precondition_bail;
use anyhow::{bail, Context as _, Result};
use gridflow_grid::{CommandRunner, GfalStorage, Storage};
use gridflow_protocol::config::{DEFAULT_MYPROXY_LIFETIME_HOURS, DEFAULT_PROXY_VALIDITY_HOURS, DEFAULT_PROXY_VO};
use gridflow_protocol::MyProxyConfig;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Register the long-lived credential with the credential store. Runs the
/// init tool on the user's terminal: it prompts for the passphrases itself.
pub fn register_long_lived_credential(myproxy: &MyProxyConfig) -> Result<()> {
    println!(
        "- Registering long-lived credential '{}' on {}",
        myproxy.name, myproxy.server
    );
    let status = std::process::Command::new("myproxy-init")
        .args([
            "--proxy_lifetime",
            &DEFAULT_PROXY_VALIDITY_HOURS.to_string(),
            "--cred_lifetime",
            &DEFAULT_MYPROXY_LIFETIME_HOURS.to_string(),
            "--voms",
            DEFAULT_PROXY_VO,
            "--pshost",
            &myproxy.server,
            "--dn_as_username",
            "--credname",
            &myproxy.name,
            "--local_proxy",
        ])
        .status()
        .context("unable to run myproxy-init")?;
    if !status.success() {
        bail!(
            "unable to register long-lived credential on {}",
            myproxy.server
        );
    }
    Ok(())
}

/// Path of the local delegated proxy left behind by credential setup.
pub async fn resolve_local_proxy() -> Result<PathBuf> {
    let runner = CommandRunner::new();
    let out = runner.run("voms-proxy-info").await?;
    if !out.success() {
        bail!("voms-proxy-info failed with exit {:?}", out.exit_code);
    }
    let path_re = Regex::new(r"^\s*path\s+:\s+(\S+)\s*$").expect("static regex");
    out.stdout
        .lines()
        .find_map(|line| path_re.captures(line))
        .map(|caps| PathBuf::from(&caps[1]))
        .ok_or_else(|| anyhow::anyhow!("unable to locate local delegated proxy"))
}

/// Create the production's archive directory on storage.
pub async fn create_storage_dir(storage_uri: &str, storage_dir: &str) -> Result<()> {
    println!("- Creating storage directory {storage_uri}{storage_dir}");
    let storage = GfalStorage::new();
    storage
        .mkdir(&format!("{storage_uri}{storage_dir}"))
        .await
        .with_context(|| format!("unable to create storage directory {storage_dir}"))?;
    Ok(())
}

/// Create `prod/<version>` (shared) and the production directory (fresh).
pub fn create_local_prod_dir(prod_dir: &Path) -> Result<()> {
    if let Some(parent) = prod_dir.parent() {
        if parent.exists() && !parent.is_dir() {
            precondition_bail!("'{}' exists but is not a directory", parent.display());
        }
        std::fs::create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }
    std::fs::create_dir(prod_dir)
        .with_context(|| format!("unable to create production directory {}", prod_dir.display()))?;
    Ok(())
}

/// Resolve the CE endpoints for a submission request.
pub fn resolve_ce_list(
    site: &str,
    ce_node: Option<&str>,
    ce_port: u16,
) -> Result<Vec<String>> {
    if let Some(node) = ce_node {
        return Ok(vec![format!("{node}:{ce_port}")]);
    }
    match super::sites::site_ces(site) {
        Some(ces) => Ok(ces.iter().map(|ce| ce.to_string()).collect()),
        None => precondition_bail!(
            "invalid submission site '{site}'. Valid: {}",
            super::sites::submission_site_names().join(",")
        ),
    }
}

/// Start the controller for a freshly created production.
pub async fn launch_controller(ctx: &Context, name: &str, foreground: bool) -> Result<()> {
    serve::run(
        ctx,
        ServeArgs {
            name: name.to_string(),
            flavor: FlavorArg::Condor,
            detach: !foreground,
        },
    )
    .await
}
