//! Create and launch a simulation production.

use super::{launch, sites, Context};
use crate::precondition_bail;
use anyhow::{Context as _, Result};
use gridflow_controller::{FactoryContext, JobFactory, McFactory, SeedList};
use gridflow_db::McProductionSpec;
use gridflow_grid::GfalStorage;
use gridflow_protocol::config::{
    DEFAULT_CE_PORT, DEFAULT_MYPROXY_PASSWD, DEFAULT_MYPROXY_PORT, DEFAULT_MYPROXY_SERVER,
    MAX_JOBS_PER_PRODUCTION,
};
use gridflow_protocol::{paths, MyProxyConfig};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
pub struct McProductionArgs {
    /// Name for the production
    #[arg(short = 'n', long)]
    pub name: String,

    /// Number of production jobs to submit
    #[arg(short = 'j', long = "jobs")]
    pub n_jobs: u32,

    /// Simulation software version to run
    #[arg(short = 'v', long = "version")]
    pub version: String,

    /// Macro file with generator cards. Default: macro/<name>.mac
    #[arg(short = 'm', long)]
    pub macro_file: Option<PathBuf>,

    /// Site used for job submission
    #[arg(short = 's', long, default_value = "CNAF")]
    pub site: String,

    /// Explicit CE node, bypassing the site table
    #[arg(short = 'C', long)]
    pub ce_node: Option<String>,

    /// CE port for an explicit CE node
    #[arg(short = 'P', long, default_value_t = DEFAULT_CE_PORT)]
    pub ce_port: u16,

    /// Site where the job output is archived
    #[arg(short = 'd', long, default_value = "CNAF2")]
    pub storage_site: String,

    /// File with the production description. Default: description/<name>.txt
    #[arg(short = 'D', long)]
    pub description_file: Option<PathBuf>,

    /// User who requested the production
    #[arg(short = 'U', long, default_value = "Unknown")]
    pub user: String,

    /// Total number of events requested
    #[arg(short = 'N', long, default_value_t = 0)]
    pub events_requested: i64,

    /// File with seed pairs, one <seed1>,<seed2> per line. Default: generated
    #[arg(short = 'R', long)]
    pub seed_list: Option<PathBuf>,

    /// Payload script shipped with every job
    #[arg(long, env = "GRIDFLOW_MC_SCRIPT", default_value = "script/mc_job.py")]
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

pub async fn run(ctx: &Context, args: McProductionArgs) -> Result<()> {
    let _ = gridflow_logging::init_logging(gridflow_logging::LogConfig::console(ctx.verbose));

    if args.n_jobs == 0 || args.n_jobs > MAX_JOBS_PER_PRODUCTION {
        precondition_bail!(
            "invalid number of jobs {}. Must be >0 and <={MAX_JOBS_PER_PRODUCTION}",
            args.n_jobs
        );
    }

    let macro_file = args
        .macro_file
        .unwrap_or_else(|| PathBuf::from(format!("macro/{}.mac", args.name)));
    if !macro_file.is_file() {
        precondition_bail!("macro file '{}' does not exist", macro_file.display());
    }
    if !args.script.is_file() {
        precondition_bail!("payload script '{}' does not exist", args.script.display());
    }

    let description_file = args
        .description_file
        .unwrap_or_else(|| PathBuf::from(format!("description/{}.txt", args.name)));
    let description = std::fs::read_to_string(&description_file).map_err(|_| {
        crate::cli::error::Precondition(format!(
            "description file '{}' does not exist",
            description_file.display()
        ))
    })?;

    let ce_list = launch::resolve_ce_list(&args.site, args.ce_node.as_deref(), args.ce_port)?;
    let Some(storage_uri) = sites::storage_uri(&args.storage_site) else {
        precondition_bail!(
            "invalid storage site '{}'. Valid: {}",
            args.storage_site,
            sites::storage_site_names().join(",")
        );
    };
    let storage_dir = format!("/mc/{}/{}/sim", args.version, args.name);
    let prod_dir = paths::prod_dir(&args.version, &args.name);

    if prod_dir.exists() {
        precondition_bail!("path '{}' already exists", prod_dir.display());
    }
    let catalog = ctx.open_catalog().await?;
    if catalog.production_exists(&args.name).await? {
        precondition_bail!("a production named '{}' already exists in catalog", args.name);
    }

    let seeds = match &args.seed_list {
        Some(path) => {
            let seeds = SeedList::from_file(path)?;
            if (seeds.len() as u32) < args.n_jobs {
                precondition_bail!(
                    "seed list '{}' contains {} pairs but {} are required",
                    path.display(),
                    seeds.len(),
                    args.n_jobs
                );
            }
            seeds
        }
        None => SeedList::generate(args.n_jobs as usize),
    };

    let myproxy = MyProxyConfig {
        server: args.myproxy_server.clone(),
        port: args.myproxy_port,
        name: args.myproxy_name.clone().unwrap_or_else(|| args.name.clone()),
        passwd: args.myproxy_passwd.clone(),
    };

    println!("- Starting production {}", args.name);
    println!("- Simulation version {}", args.version);
    println!("- Submitting {} jobs to CE {}", args.n_jobs, ce_list.join(" "));
    println!("- Storage: {storage_uri}{storage_dir}");
    println!("- Production directory: {}", prod_dir.display());

    // No partial state before this point; from here on we write
    launch::register_long_lived_credential(&myproxy)?;
    let proxy_local = launch::resolve_local_proxy().await?;
    println!("- Local delegated credential at {}", proxy_local.display());

    launch::create_storage_dir(storage_uri, &storage_dir).await?;
    launch::create_local_prod_dir(&prod_dir)?;
    std::fs::copy(&proxy_local, paths::long_proxy_file(&prod_dir, &args.name))
        .context("unable to stash credential handle in production directory")?;

    let prod_id = catalog
        .create_mc_production(&McProductionSpec {
            name: args.name.clone(),
            description,
            user_req: args.user.clone(),
            n_events_req: args.events_requested,
            mc_version: args.version.clone(),
            ce_list,
            prod_dir: prod_dir.to_string_lossy().into_owned(),
            storage_uri: storage_uri.to_string(),
            storage_dir: storage_dir.clone(),
            proxy_info: myproxy.to_proxy_info(),
            n_jobs: args.n_jobs,
        })
        .await?;

    println!("- Creating directory structure for production jobs");
    let storage = GfalStorage::new();
    let factory = McFactory {
        n_jobs: args.n_jobs,
        macro_path: macro_file,
        seeds,
    };
    let specs = factory
        .layout_jobs(&FactoryContext {
            prod_name: &args.name,
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

    launch::launch_controller(ctx, &args.name, args.foreground).await
}
