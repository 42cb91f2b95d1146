//! Reconstruction production factory.
//!
//! One job per chunk of raw-data files. The run's file list comes from the
//! source storage; files are ordered by their `_NN_MMM.root` sequence index
//! before chunking so every job processes a contiguous slice of the run.

use super::{stage_common_files, write_descriptor, FactoryContext, JobFactory, JobSpec};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use gridflow_grid::Storage;
use gridflow_protocol::paths::{job_dir_name, JOB_LIST};
use regex::Regex;
use std::sync::OnceLock;

static RAWFILE_INDEX: OnceLock<Regex> = OnceLock::new();

/// Ordering key of a raw-data file name `..._<NN>_<MMM>.root`: MMM is the
/// chunk counter, NN the stream. Unrecognized names sort first.
fn rawfile_sort_key(name: &str) -> u32 {
    let re = RAWFILE_INDEX
        .get_or_init(|| Regex::new(r"^.*_(\d\d)_(\d\d\d)\.root$").expect("static regex"));
    match re.captures(name) {
        Some(caps) => {
            let stream: u32 = caps[1].parse().unwrap_or(0);
            let chunk: u32 = caps[2].parse().unwrap_or(0);
            chunk * 100 + stream
        }
        None => 0,
    }
}

/// Lays out a reconstruction production.
pub struct RecoFactory {
    pub run: String,
    pub year: String,
    /// Raw files reconstructed per job.
    pub files_per_job: u32,
    /// Storage URI holding the run's raw data.
    pub source_uri: String,
}

impl RecoFactory {
    fn run_dir(&self) -> String {
        format!("{}/daq/{}/rawdata/{}", self.source_uri, self.year, self.run)
    }

    /// The run's raw files, in processing order.
    pub async fn list_run_files(&self, storage: &dyn Storage) -> Result<Vec<String>> {
        let run_dir = self.run_dir();
        let mut files = storage
            .list(&run_dir)
            .await
            .with_context(|| format!("unable to list raw files under {run_dir}"))?;
        files.retain(|name| name.ends_with(".root"));
        files.sort_by_key(|name| rawfile_sort_key(name));
        Ok(files)
    }
}

#[async_trait]
impl JobFactory for RecoFactory {
    async fn layout_jobs(&self, ctx: &FactoryContext<'_>) -> Result<Vec<JobSpec>> {
        if self.files_per_job == 0 {
            bail!("files_per_job must be positive");
        }
        let files = self.list_run_files(ctx.storage).await?;
        if files.is_empty() {
            bail!("no raw files found for run {}", self.run);
        }

        let run_dir = self.run_dir();
        let mut specs = Vec::new();
        for (index, chunk) in files.chunks(self.files_per_job as usize).enumerate() {
            let name = job_dir_name(index as u32);
            let job_dir = ctx.prod_dir.join(&name);
            std::fs::create_dir(&job_dir)
                .with_context(|| format!("unable to create job directory {}", job_dir.display()))?;

            stage_common_files(ctx, &job_dir)?;

            let list_text: String = chunk
                .iter()
                .map(|file| format!("{run_dir}/{file}\n"))
                .collect();
            std::fs::write(job_dir.join(JOB_LIST), &list_text)
                .with_context(|| format!("unable to write file list into {}", job_dir.display()))?;

            let arguments = format!(
                "-u job.py job.list {} {} {} {} {}",
                ctx.prod_name, name, ctx.version, ctx.storage_dir, ctx.storage_uri
            );
            write_descriptor(ctx, &job_dir, &arguments, &[JOB_LIST])?;

            specs.push(JobSpec {
                job_dir: name.clone(),
                name,
                configuration: list_text,
                input_list: Some(chunk.join(" ")),
                random: None,
            });
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_orders_by_chunk_then_stream() {
        let mut files = vec![
            "run_0042_01_002.root".to_string(),
            "run_0042_00_000.root".to_string(),
            "run_0042_01_000.root".to_string(),
            "run_0042_00_001.root".to_string(),
        ];
        files.sort_by_key(|name| rawfile_sort_key(name));
        assert_eq!(
            files,
            vec![
                "run_0042_00_000.root",
                "run_0042_01_000.root",
                "run_0042_00_001.root",
                "run_0042_01_002.root",
            ]
        );
    }

    #[test]
    fn unrecognized_names_sort_first() {
        assert_eq!(rawfile_sort_key("README"), 0);
        assert_eq!(rawfile_sort_key("run_0042_02_003.root"), 302);
    }
}
