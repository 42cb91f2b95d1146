//! Report jobs known to the CEs.
//!
//! Sweeps each endpoint with a batch status query, correlates the CE job
//! ids with productions in the catalog, and prints either per-job detail or
//! a per-endpoint summary table.

use super::{sites, Context};
use crate::precondition_bail;
use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Table};
use gridflow_db::Catalog;
use gridflow_grid::CommandRunner;
use gridflow_protocol::CeStatus;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

#[derive(clap::Args, Debug)]
pub struct ReportJobsArgs {
    /// Submission site to inspect, or ALL for every known endpoint
    #[arg(short = 'S', long, default_value = "ALL")]
    pub site: String,

    /// Job owners to show (repeatable). Default: all owners
    #[arg(short = 'O', long = "owner")]
    pub owners: Vec<String>,

    /// Show every job
    #[arg(short = 'A', long, conflicts_with = "production_only")]
    pub all: bool,

    /// Show only jobs tied to a production
    #[arg(short = 'P', long)]
    pub production_only: bool,

    /// Print a per-endpoint summary table
    #[arg(short = 'F', long)]
    pub summary: bool,

    /// Emit the full report as JSON instead of text
    #[arg(long, conflicts_with = "summary")]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CeJobReport {
    cluster: String,
    owner: String,
    status: CeStatus,
    production: Option<String>,
}

#[derive(Debug, Serialize)]
struct EndpointReport {
    endpoint: String,
    jobs: Vec<CeJobReport>,
}

/// Split a batch `-long` listing into per-job classads.
fn parse_batch_listing(stdout: &str) -> Vec<(String, String, CeStatus)> {
    let cluster_re = Regex::new(r"^\s*ClusterId\s+=\s+(\d+)\s*$").expect("static regex");
    let owner_re = Regex::new(r#"^\s*Owner\s+=\s+"(\S+)"\s*$"#).expect("static regex");
    let status_re = Regex::new(r"^\s*JobStatus\s+=\s+(\d+)\s*$").expect("static regex");

    let mut jobs = Vec::new();
    for block in stdout.split("\n\n") {
        let mut cluster = None;
        let mut owner = None;
        let mut status = CeStatus::Undef;
        for line in block.lines() {
            if let Some(caps) = cluster_re.captures(line) {
                cluster = Some(caps[1].to_string());
            } else if let Some(caps) = owner_re.captures(line) {
                owner = Some(caps[1].to_string());
            } else if let Some(caps) = status_re.captures(line) {
                status = CeStatus::from_condor_code(&caps[1]);
            }
        }
        if let (Some(cluster), Some(owner)) = (cluster, owner) {
            jobs.push((cluster, owner, status));
        }
    }
    jobs
}

async fn endpoint_jobs(
    runner: &CommandRunner,
    catalog: &Catalog,
    endpoint: &str,
    args: &ReportJobsArgs,
    production_only: bool,
) -> Result<Vec<CeJobReport>> {
    let host = endpoint.split(':').next().unwrap_or(endpoint);
    let cmd = format!("condor_q -long -pool {endpoint} -name {host}");
    let out = match runner.run(&cmd).await {
        Ok(out) if out.success() => out,
        Ok(out) => {
            warn!(endpoint, exit = ?out.exit_code, "status query returned error");
            return Ok(Vec::new());
        }
        Err(err) => {
            warn!(endpoint, error = %err, "endpoint unreachable");
            return Ok(Vec::new());
        }
    };

    let mut reports = Vec::new();
    for (cluster, owner, status) in parse_batch_listing(&out.stdout) {
        if !args.owners.is_empty()
            && !args.owners.iter().any(|o| o == "ALL" || *o == owner)
        {
            continue;
        }
        let production = catalog
            .find_prod_by_ce_job_id(&format!("{endpoint}/{cluster}"))
            .await?;
        if production_only && production.is_none() {
            continue;
        }
        reports.push(CeJobReport {
            cluster,
            owner,
            status,
            production,
        });
    }
    Ok(reports)
}

pub async fn run(ctx: &Context, args: ReportJobsArgs) -> Result<()> {
    let _ = gridflow_logging::init_logging(gridflow_logging::LogConfig::console(ctx.verbose));

    let endpoints: Vec<&str> = if args.site == "ALL" {
        sites::all_ces()
    } else {
        match sites::site_ces(&args.site) {
            Some(ces) => ces.to_vec(),
            None => precondition_bail!(
                "invalid site '{}'. Valid: {} or ALL",
                args.site,
                sites::submission_site_names().join(",")
            ),
        }
    };

    let catalog = ctx.open_catalog().await?;
    let runner = CommandRunner::new();
    // -A forces the unfiltered view; -P narrows to production-bound jobs
    let production_only = args.production_only && !args.all;

    if args.json {
        let mut reports = Vec::new();
        for endpoint in endpoints {
            let jobs = endpoint_jobs(&runner, &catalog, endpoint, &args, production_only).await?;
            reports.push(EndpointReport {
                endpoint: endpoint.to_string(),
                jobs,
            });
        }
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Endpoint", "Jobs", "Idle", "Running", "Held", "Other", "Production"]);

    for endpoint in endpoints {
        let jobs = endpoint_jobs(&runner, &catalog, endpoint, &args, production_only).await?;

        if args.summary {
            let idle = jobs.iter().filter(|j| j.status == CeStatus::Idle).count();
            let running = jobs.iter().filter(|j| j.status == CeStatus::Running).count();
            let held = jobs.iter().filter(|j| j.status == CeStatus::Held).count();
            let other = jobs.len() - idle - running - held;
            let bound = jobs.iter().filter(|j| j.production.is_some()).count();
            table.add_row(vec![
                endpoint.to_string(),
                jobs.len().to_string(),
                idle.to_string(),
                running.to_string(),
                held.to_string(),
                other.to_string(),
                bound.to_string(),
            ]);
        } else {
            println!("=== {endpoint} ===");
            for job in &jobs {
                println!(
                    "{:>10}  {:<12} {:<20} {}",
                    job.cluster,
                    job.owner,
                    job.status.to_string(),
                    job.production.as_deref().unwrap_or("-")
                );
            }
        }
    }

    if args.summary {
        println!("{table}");
    }
    Ok(())
}
