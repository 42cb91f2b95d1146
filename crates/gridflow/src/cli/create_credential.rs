//! Register a long-lived credential with the credential store.
//!
//! The init tool prompts for the two passphrases on the terminal; on
//! success the credential coordinates are printed in the
//! `server:port:name:password` form consumed by the production front-ends.

use super::Context;
use anyhow::{bail, Context as _, Result};
use gridflow_protocol::config::{
    DEFAULT_MYPROXY_LIFETIME_HOURS, DEFAULT_MYPROXY_PASSWD, DEFAULT_MYPROXY_PORT,
    DEFAULT_MYPROXY_SERVER, DEFAULT_PROXY_VALIDITY_HOURS, DEFAULT_PROXY_VO,
};

#[derive(clap::Args, Debug)]
pub struct CreateCredentialArgs {
    /// Name of the credential instance
    #[arg(short = 'N', long)]
    pub name: String,

    /// Password protecting the credential instance
    #[arg(short = 'P', long, default_value = DEFAULT_MYPROXY_PASSWD)]
    pub passwd: String,

    /// Credential store server
    #[arg(short = 's', long, default_value = DEFAULT_MYPROXY_SERVER)]
    pub server: String,

    /// Credential store port
    #[arg(short = 'p', long, default_value_t = DEFAULT_MYPROXY_PORT)]
    pub port: u16,
}

pub async fn run(_ctx: &Context, args: CreateCredentialArgs) -> Result<()> {
    let status = std::process::Command::new("myproxy-init")
        .args([
            "--proxy_lifetime",
            &DEFAULT_PROXY_VALIDITY_HOURS.to_string(),
            "--cred_lifetime",
            &DEFAULT_MYPROXY_LIFETIME_HOURS.to_string(),
            "--voms",
            DEFAULT_PROXY_VO,
            "--pshost",
            &args.server,
            "--dn_as_username",
            "--credname",
            &args.name,
        ])
        .status()
        .context("unable to run myproxy-init")?;
    if !status.success() {
        bail!("unable to register credential '{}' on {}", args.name, args.server);
    }

    println!("{}:{}:{}:{}", args.server, args.port, args.name, args.passwd);
    Ok(())
}
