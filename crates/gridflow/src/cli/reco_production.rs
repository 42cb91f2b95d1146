//! Create and launch a reconstruction production for one run.

use super::{launch, sites, Context};
use crate::precondition_bail;
use anyhow::{Context as _, Result};
use gridflow_controller::{FactoryContext, JobFactory, RecoFactory};
use gridflow_db::RecoProductionSpec;
use gridflow_grid::GfalStorage;
use gridflow_protocol::config::{
    DEFAULT_CE_PORT, DEFAULT_FILES_PER_JOB, DEFAULT_MYPROXY_PASSWD, DEFAULT_MYPROXY_PORT,
    DEFAULT_MYPROXY_SERVER, MAX_FILES_PER_JOB,
};
use gridflow_protocol::{paths, MyProxyConfig};
use regex::Regex;
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
pub struct RecoProductionArgs {
    /// Name of the run to process
    #[arg(short = 'r', long)]
    pub run: String,

    /// Reconstruction software version to run
    #[arg(short = 'v', long = "version")]
    pub version: String,

    /// Year of the run, when the run name is not self-documenting
    #[arg(short = 'y', long)]
    pub year: Option<String>,

    /// Raw files reconstructed per job
    #[arg(short = 'j', long, default_value_t = DEFAULT_FILES_PER_JOB)]
    pub files_per_job: u32,

    /// Production name. Default: <run>_<version>
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Site used for job submission
    #[arg(short = 's', long, default_value = "LNF")]
    pub site: String,

    /// URI holding the run's raw data. Default: the LNF storage
    #[arg(short = 'S', long)]
    pub source_uri: Option<String>,

    /// Explicit CE node, bypassing the site table
    #[arg(short = 'C', long)]
    pub ce_node: Option<String>,

    /// CE port for an explicit CE node
    #[arg(short = 'P', long, default_value_t = DEFAULT_CE_PORT)]
    pub ce_port: u16,

    /// Site where the job output is archived
    #[arg(short = 'd', long, default_value = "LNF")]
    pub storage_site: String,

    /// Production description recorded in the catalog
    #[arg(short = 'D', long, default_value = "TEST")]
    pub description: String,

    /// Payload script shipped with every job
    #[arg(long, env = "GRIDFLOW_RECO_SCRIPT", default_value = "script/reco_job.py")]
    pub script: PathBuf,

    /// Credential-store name. Default: the production name
    #[arg(long)]
    pub myproxy_name: Option<String>,

    #[arg(long, default_value = DEFAULT_MYPROXY_SERVER)]
    pub myproxy_server: String,

    #[arg(long, default_value_t = DEFAULT_MYPROXY_PORT)]
    pub myproxy_port: u16,

    #[arg(long, default_value = DEFAULT_MYPROXY_PASSWD)]
    pub myproxy_passwd: String,

    /// Keep the controller in the foreground instead of detaching
    #[arg(long)]
    pub foreground: bool,
}

/// Run names usually embed their year (`run_0042_20190415_...`).
fn year_from_run(run: &str) -> Option<String> {
    let re = Regex::new(r"_(20\d\d)\d{4}_").expect("static regex");
    re.captures(run).map(|caps| caps[1].to_string())
}

pub async fn run(ctx: &Context, args: RecoProductionArgs) -> Result<()> {
    let _ = gridflow_logging::init_logging(gridflow_logging::LogConfig::console(ctx.verbose));

    if args.files_per_job == 0 || args.files_per_job > MAX_FILES_PER_JOB {
        precondition_bail!(
            "invalid files per job {}. Must be >0 and <={MAX_FILES_PER_JOB}",
            args.files_per_job
        );
    }
    if !args.script.is_file() {
        precondition_bail!("payload script '{}' does not exist", args.script.display());
    }

    let Some(year) = args.year.clone().or_else(|| year_from_run(&args.run)) else {
        precondition_bail!(
            "cannot derive the year from run '{}'; pass it with -y",
            args.run
        );
    };

    let name = args
        .name
        .clone()
        .unwrap_or_else(|| format!("{}_{}", args.run, args.version));

    let ce_list = launch::resolve_ce_list(&args.site, args.ce_node.as_deref(), args.ce_port)?;
    let Some(storage_uri) = sites::storage_uri(&args.storage_site) else {
        precondition_bail!(
            "invalid storage site '{}'. Valid: {}",
            args.storage_site,
            sites::storage_site_names().join(",")
        );
    };
    let source_uri = args
        .source_uri
        .clone()
        .or_else(|| sites::storage_uri("LNF").map(str::to_string))
        .unwrap_or_default();

    let storage_dir = format!("/reco/{}/{}", args.version, args.run);
    let prod_dir = paths::prod_dir(&args.version, &name);

    if prod_dir.exists() {
        precondition_bail!("path '{}' already exists", prod_dir.display());
    }
    let catalog = ctx.open_catalog().await?;
    if catalog.production_exists(&name).await? {
        precondition_bail!("a production named '{name}' already exists in catalog");
    }

    let myproxy = MyProxyConfig {
        server: args.myproxy_server.clone(),
        port: args.myproxy_port,
        name: args.myproxy_name.clone().unwrap_or_else(|| name.clone()),
        passwd: args.myproxy_passwd.clone(),
    };

    println!("- Starting reconstruction production {name}");
    println!("- Run {} ({year}), reconstruction version {}", args.run, args.version);
    println!("- Submitting to CE {}", ce_list.join(" "));
    println!("- Storage: {storage_uri}{storage_dir}");

    launch::register_long_lived_credential(&myproxy)?;
    let proxy_local = launch::resolve_local_proxy().await?;
    println!("- Local delegated credential at {}", proxy_local.display());

    launch::create_storage_dir(storage_uri, &storage_dir).await?;
    launch::create_local_prod_dir(&prod_dir)?;
    std::fs::copy(&proxy_local, paths::long_proxy_file(&prod_dir, &name))
        .context("unable to stash credential handle in production directory")?;

    // Job count is only known once the run's raw files are chunked
    println!("- Creating directory structure for production jobs");
    let storage = GfalStorage::new();
    let factory = RecoFactory {
        run: args.run.clone(),
        year,
        files_per_job: args.files_per_job,
        source_uri,
    };
    let specs = factory
        .layout_jobs(&FactoryContext {
            prod_name: &name,
            prod_dir: &prod_dir,
            version: &args.version,
            storage_uri,
            storage_dir: &storage_dir,
            script_path: &args.script,
            proxy_local: &proxy_local,
            myproxy: &myproxy,
            storage: &storage,
        })
        .await?;
    println!("- Run {} split into {} jobs", args.run, specs.len());

    let prod_id = catalog
        .create_reco_production(&RecoProductionSpec {
            name: name.clone(),
            description: args.description.clone(),
            run: args.run.clone(),
            reco_version: args.version.clone(),
            ce_list,
            prod_dir: prod_dir.to_string_lossy().into_owned(),
            storage_uri: storage_uri.to_string(),
            storage_dir,
            proxy_info: myproxy.to_proxy_info(),
            n_jobs: specs.len() as u32,
        })
        .await?;
    for spec in &specs {
        catalog
            .create_job(
                prod_id,
                &spec.name,
                &spec.job_dir,
                &spec.configuration,
                spec.input_list.as_deref(),
                spec.random.as_deref(),
            )
            .await?;
    }

    launch::launch_controller(ctx, &name, args.foreground).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_extraction() {
        assert_eq!(
            year_from_run("run_0042_20190415_120000").as_deref(),
            Some("2019")
        );
        assert_eq!(year_from_run("mystery_run"), None);
    }
}
