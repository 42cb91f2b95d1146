//! Simulation production factory.
//!
//! One job per seed pair: every job runs the same macro with its own random
//! seeds and writes its artifacts under the production's storage directory.

use super::{stage_common_files, write_descriptor, FactoryContext, JobFactory, JobSpec};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use gridflow_protocol::paths::{job_dir_name, JOB_MACRO};
use rand::Rng;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Random seed pairs, one `<seed1>,<seed2>` entry per job.
#[derive(Debug, Clone)]
pub struct SeedList(Vec<String>);

impl SeedList {
    /// Generate `n` uniform seed pairs.
    pub fn generate(n: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self(
            (0..n)
                .map(|_| format!("{},{}", rng.gen::<u32>(), rng.gen::<u32>()))
                .collect(),
        )
    }

    /// Read seed pairs from a file: one `<seed1>,<seed2>` per line, blank
    /// lines and `#` comments skipped. Any other content is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read seed list {}", path.display()))?;
        let line_re = Regex::new(r"^\s*\d+,\d+\s*$").expect("static regex");

        let mut seeds = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if !line_re.is_match(line) {
                bail!(
                    "ill-formatted line in seed list {}: {line:?}",
                    path.display()
                );
            }
            seeds.push(trimmed.to_string());
        }
        Ok(Self(seeds))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lays out a simulation production.
pub struct McFactory {
    pub n_jobs: u32,
    /// Macro file with the generator cards shared by all jobs.
    pub macro_path: PathBuf,
    pub seeds: SeedList,
}

#[async_trait]
impl JobFactory for McFactory {
    async fn layout_jobs(&self, ctx: &FactoryContext<'_>) -> Result<Vec<JobSpec>> {
        if (self.seeds.len() as u32) < self.n_jobs {
            bail!(
                "seed list has {} pairs but {} jobs are required",
                self.seeds.len(),
                self.n_jobs
            );
        }
        let macro_text = std::fs::read_to_string(&self.macro_path)
            .with_context(|| format!("unable to read macro file {}", self.macro_path.display()))?;

        let mut specs = Vec::with_capacity(self.n_jobs as usize);
        for index in 0..self.n_jobs {
            let name = job_dir_name(index);
            let job_dir = ctx.prod_dir.join(&name);
            std::fs::create_dir(&job_dir)
                .with_context(|| format!("unable to create job directory {}", job_dir.display()))?;

            stage_common_files(ctx, &job_dir)?;
            std::fs::write(job_dir.join(JOB_MACRO), &macro_text)
                .with_context(|| format!("unable to write macro into {}", job_dir.display()))?;

            let seeds = &self.seeds.0[index as usize];
            let arguments = format!(
                "-u job.py job.mac {} {} {} {} {} {}",
                ctx.prod_name, name, ctx.version, ctx.storage_dir, ctx.storage_uri, seeds
            );
            write_descriptor(ctx, &job_dir, &arguments, &[JOB_MACRO])?;

            specs.push(JobSpec {
                job_dir: name.clone(),
                name,
                configuration: macro_text.clone(),
                input_list: None,
                random: Some(seeds.clone()),
            });
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_seeds_have_the_right_shape() {
        let seeds = SeedList::generate(10);
        assert_eq!(seeds.len(), 10);
        let re = Regex::new(r"^\d+,\d+$").unwrap();
        for pair in &seeds.0 {
            assert!(re.is_match(pair), "bad seed pair {pair:?}");
        }
    }

    #[test]
    fn seed_file_skips_comments_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("seeds.txt");
        std::fs::write(&good, "# header\n12,34\n\n56,78\n").unwrap();
        let seeds = SeedList::from_file(&good).unwrap();
        assert_eq!(seeds.0, vec!["12,34", "56,78"]);

        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "12,34\nnot-a-seed\n").unwrap();
        assert!(SeedList::from_file(&bad).is_err());
    }
}
