//! Cross-check catalog state against the CEs.
//!
//! Walks every submission of a production (or of all productions) and
//! reports the catalog's view; for submissions the catalog still considers
//! live, the owning CE is probed so drift shows up side by side. `--json`
//! emits the collected report instead of the text rendering.

use super::serve::FlavorArg;
use super::Context;
use crate::precondition_bail;
use anyhow::Result;
use gridflow_db::{Catalog, JobRow, JobSubmitRow, ProductionRow};
use gridflow_grid::{ComputeElement, GridCe};
use gridflow_protocol::{JobStatus, ProdId, SubmitStatus};
use serde::Serialize;

#[derive(clap::Args, Debug)]
pub struct VerifyProductionArgs {
    /// Production to verify. Default: every production in the catalog
    #[arg(short = 'p', long)]
    pub production: Option<String>,

    /// CE protocol flavor used for live probes
    #[arg(long, value_enum, default_value = "condor")]
    pub flavor: FlavorArg,

    /// Skip the live CE probes and report catalog state only
    #[arg(long)]
    pub offline: bool,

    /// Emit the report as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// What the CE answered for a submission the catalog considers live.
#[derive(Debug, Serialize)]
struct CeProbe {
    status: gridflow_protocol::CeStatus,
    exit_code: Option<String>,
    worker_node: Option<String>,
    local_user: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmissionVerification {
    #[serde(flatten)]
    row: JobSubmitRow,
    ce: Option<CeProbe>,
}

#[derive(Debug, Serialize)]
struct JobVerification {
    #[serde(flatten)]
    row: JobRow,
    submissions: Vec<SubmissionVerification>,
}

#[derive(Debug, Serialize)]
struct ProductionVerification {
    name: String,
    jobs: Vec<JobVerification>,
}

async fn verify_one(
    catalog: &Catalog,
    prod: &ProductionRow,
    args: &VerifyProductionArgs,
) -> Result<ProductionVerification> {
    let mut jobs = Vec::new();
    let prod_id = ProdId::new(prod.id);
    for job_id in catalog.list_job_ids(prod_id).await? {
        let job = catalog.get_job(job_id).await?;
        let mut submissions = Vec::new();
        for sub in catalog.list_job_submissions(job_id).await? {
            // A live submission of an unfinished job is worth probing
            let live = job.job_status() == Some(JobStatus::Active)
                && !sub.submit_status().is_some_and(SubmitStatus::is_terminal);
            let ce = if live && !args.offline {
                match sub.ce_job_id.as_deref() {
                    Some(ce_job_id) => {
                        let endpoint = ce_job_id.rsplit_once('/').map_or(ce_job_id, |(ep, _)| ep);
                        let adapter = GridCe::new(endpoint, args.flavor.as_ce_flavor());
                        let info = adapter.status(ce_job_id).await;
                        Some(CeProbe {
                            status: info.status,
                            exit_code: info.exit_code,
                            worker_node: info.worker_node,
                            local_user: info.local_user,
                        })
                    }
                    None => None,
                }
            } else {
                None
            };
            submissions.push(SubmissionVerification { row: sub, ce });
        }
        jobs.push(JobVerification {
            row: job,
            submissions,
        });
    }
    Ok(ProductionVerification {
        name: prod.name.clone(),
        jobs,
    })
}

fn print_text(report: &ProductionVerification) {
    println!("=== Production {} ===", report.name);
    for job in &report.jobs {
        let job_status = job
            .row
            .job_status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("status {}", job.row.status));

        if job.submissions.is_empty() {
            println!("{:<10} {:<12} UNSUBMITTED", job.row.name, job_status);
            continue;
        }
        for sub in &job.submissions {
            let sub_status = sub
                .row
                .submit_status()
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("status {}", sub.row.status));
            let mut line = format!(
                "{:<10} {:<12} {:>3} {:<28} {}",
                job.row.name,
                job_status,
                sub.row.submit_index,
                sub_status,
                sub.row.ce_job_id.as_deref().unwrap_or("-")
            );
            if let Some(probe) = &sub.ce {
                line.push_str(&format!(
                    " | CE: {} {}@{}",
                    probe.status,
                    probe.local_user.as_deref().unwrap_or("UNKNOWN"),
                    probe.worker_node.as_deref().unwrap_or("UNKNOWN")
                ));
            }
            println!("{line}");
        }
    }
}

pub async fn run(ctx: &Context, args: VerifyProductionArgs) -> Result<()> {
    let _ = gridflow_logging::init_logging(gridflow_logging::LogConfig::console(ctx.verbose));
    let catalog = ctx.open_catalog().await?;

    let productions = match &args.production {
        Some(name) => {
            let Some(prod_id) = catalog.get_prod_id(name).await? else {
                precondition_bail!("production '{name}' not found in catalog");
            };
            vec![catalog.get_prod_info(prod_id).await?]
        }
        None => catalog.list_productions().await?,
    };

    if productions.is_empty() {
        println!("No productions in catalog");
        return Ok(());
    }

    let mut reports = Vec::with_capacity(productions.len());
    for prod in &productions {
        reports.push(verify_one(&catalog, prod, &args).await?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_text(report);
        }
    }
    Ok(())
}
