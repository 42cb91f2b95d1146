//! Batch wrapper: one reconstruction production per run.

use super::{reco_production, Context};
use crate::precondition_bail;
use anyhow::Result;
use gridflow_protocol::config::{DEFAULT_INTER_SUBMIT_DELAY_SECS, MAX_INTER_SUBMIT_DELAY_SECS};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(clap::Args, Debug)]
pub struct RecoSubmitArgs {
    /// Run to process (repeatable)
    #[arg(short = 'r', long = "run")]
    pub runs: Vec<String>,

    /// File with runs to process, one per line (repeatable)
    #[arg(short = 'L', long = "list")]
    pub lists: Vec<PathBuf>,

    /// Reconstruction software version to run
    #[arg(short = 'v', long = "version")]
    pub version: String,

    /// Delay between run submissions, seconds
    #[arg(short = 'D', long, default_value_t = DEFAULT_INTER_SUBMIT_DELAY_SECS)]
    pub delay: u64,

    #[command(flatten)]
    pub common: CommonRecoArgs,
}

/// Options forwarded verbatim to every per-run submission.
#[derive(clap::Args, Debug)]
pub struct CommonRecoArgs {
    #[arg(short = 'j', long, default_value_t = gridflow_protocol::config::DEFAULT_FILES_PER_JOB)]
    pub files_per_job: u32,

    #[arg(short = 's', long, default_value = "LNF")]
    pub site: String,

    #[arg(short = 'S', long)]
    pub source_uri: Option<String>,

    #[arg(short = 'P', long, default_value_t = gridflow_protocol::config::DEFAULT_CE_PORT)]
    pub ce_port: u16,

    #[arg(short = 'd', long, default_value = "LNF")]
    pub storage_site: String,

    #[arg(long, env = "GRIDFLOW_RECO_SCRIPT", default_value = "script/reco_job.py")]
    pub script: PathBuf,
}

/// Merge `-r` and `-L` inputs: duplicates removed, sorted.
fn collect_runs(args: &RecoSubmitArgs) -> Result<Vec<String>> {
    let mut runs = BTreeSet::new();
    for run in &args.runs {
        runs.insert(run.trim().to_string());
    }
    for list in &args.lists {
        if !list.is_file() {
            precondition_bail!("run list file '{}' not found or not readable", list.display());
        }
        let text = std::fs::read_to_string(list)?;
        for line in text.lines() {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                runs.insert(trimmed.to_string());
            }
        }
    }
    Ok(runs.into_iter().collect())
}

pub async fn run(ctx: &Context, args: RecoSubmitArgs) -> Result<()> {
    if args.delay > MAX_INTER_SUBMIT_DELAY_SECS {
        precondition_bail!(
            "submission delay {} exceeds maximum {MAX_INTER_SUBMIT_DELAY_SECS}",
            args.delay
        );
    }
    let runs = collect_runs(&args)?;
    if runs.is_empty() {
        precondition_bail!("no runs specified: use -r and/or -L");
    }

    println!("- Submitting {} run(s)", runs.len());
    for (index, run_name) in runs.iter().enumerate() {
        if index > 0 && args.delay > 0 {
            tokio::time::sleep(Duration::from_secs(args.delay)).await;
        }
        println!("- Submitting run {run_name}");
        reco_production::run(
            ctx,
            reco_production::RecoProductionArgs {
                run: run_name.clone(),
                version: args.version.clone(),
                year: None,
                files_per_job: args.common.files_per_job,
                name: None,
                site: args.common.site.clone(),
                source_uri: args.common.source_uri.clone(),
                ce_node: None,
                ce_port: args.common.ce_port,
                storage_site: args.common.storage_site.clone(),
                description: "TEST".to_string(),
                script: args.common.script.clone(),
                myproxy_name: None,
                myproxy_server: gridflow_protocol::config::DEFAULT_MYPROXY_SERVER.to_string(),
                myproxy_port: gridflow_protocol::config::DEFAULT_MYPROXY_PORT,
                myproxy_passwd: gridflow_protocol::config::DEFAULT_MYPROXY_PASSWD.to_string(),
                foreground: false,
            },
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_are_deduped_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("runs.txt");
        std::fs::write(&list, "run_b\n# comment\nrun_a\n\nrun_c\n").unwrap();

        let args = RecoSubmitArgs {
            runs: vec!["run_c".to_string(), "run_a".to_string()],
            lists: vec![list],
            version: "v1".to_string(),
            delay: 0,
            common: CommonRecoArgs {
                files_per_job: 10,
                site: "LNF".to_string(),
                source_uri: None,
                ce_port: 9619,
                storage_site: "LNF".to_string(),
                script: PathBuf::from("script/reco_job.py"),
            },
        };
        let runs = collect_runs(&args).unwrap();
        assert_eq!(runs, vec!["run_a", "run_b", "run_c"]);
    }
}
