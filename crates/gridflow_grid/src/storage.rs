//! Archival storage adapter.
//!
//! Remote storage is reached through the gfal tool family. The one
//! non-obvious behavior lives in [`Storage::archive`]: re-finalizing a job
//! can try to copy an artifact whose name already exists (a previous
//! retrieval failed after the copy succeeded), so the incumbent is renamed
//! away with a two-digit suffix before the new copy lands.

use crate::command::CommandRunner;
use crate::error::AdapterError;
use async_trait::async_trait;
use gridflow_protocol::CeRetryConfig;
use tracing::{debug, warn};

/// Opaque storage surface.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create a directory, parents included. Idempotent.
    async fn mkdir(&self, uri: &str) -> Result<(), AdapterError>;

    /// Whether the URI names an existing object.
    async fn exists(&self, uri: &str) -> Result<bool, AdapterError>;

    /// Rename `src` to `dst`. Fails when `dst` exists.
    async fn rename(&self, src: &str, dst: &str) -> Result<(), AdapterError>;

    /// Copy `src` to `dst`.
    async fn copy(&self, src: &str, dst: &str) -> Result<(), AdapterError>;

    /// Entries of a storage directory, one name per line.
    async fn list(&self, uri: &str) -> Result<Vec<String>, AdapterError>;

    /// Copy with collision avoidance: an existing destination is renamed to
    /// `<dst>.00` .. `<dst>.99` first. One hundred incumbents is permanent
    /// failure.
    async fn archive(&self, src: &str, dst: &str) -> Result<(), AdapterError> {
        if self.exists(dst).await? {
            warn!(dst, "destination exists, renaming incumbent");
            let mut renamed = false;
            for idx in 0..100u32 {
                let shifted = format!("{dst}.{idx:02}");
                if self.rename(dst, &shifted).await.is_ok() {
                    debug!(dst, shifted = %shifted, "incumbent renamed");
                    renamed = true;
                    break;
                }
            }
            if !renamed {
                return Err(AdapterError::Permanent(format!(
                    "{dst}: too many copies, cannot rename incumbent"
                )));
            }
        }
        self.copy(src, dst).await
    }
}

/// gfal-backed storage adapter.
pub struct GfalStorage {
    runner: CommandRunner,
    retry: CeRetryConfig,
}

impl Default for GfalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl GfalStorage {
    pub fn new() -> Self {
        Self::with_retry(CeRetryConfig::default())
    }

    pub fn with_retry(retry: CeRetryConfig) -> Self {
        Self {
            runner: CommandRunner::new(),
            retry,
        }
    }

    async fn run_checked(&self, cmd: &str, what: &str) -> Result<(), AdapterError> {
        let out = self
            .runner
            .run_retrying(cmd, self.retry.retries_max, self.retry.retries_delay)
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(AdapterError::Transient(format!(
                "{what} failed with exit {:?}: {}",
                out.exit_code,
                out.stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl Storage for GfalStorage {
    async fn mkdir(&self, uri: &str) -> Result<(), AdapterError> {
        self.run_checked(&format!("gfal-mkdir -p {uri}"), "gfal-mkdir")
            .await
    }

    async fn exists(&self, uri: &str) -> Result<bool, AdapterError> {
        // gfal-stat exits non-zero for a missing object; a transport error
        // looks the same, which at worst costs one redundant rename attempt
        let out = self.runner.run(&format!("gfal-stat {uri}")).await?;
        Ok(out.success())
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), AdapterError> {
        let out = self.runner.run(&format!("gfal-rename {src} {dst}")).await?;
        if out.success() {
            Ok(())
        } else {
            Err(AdapterError::Transient(format!(
                "gfal-rename {src} -> {dst} failed with exit {:?}",
                out.exit_code
            )))
        }
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), AdapterError> {
        self.run_checked(&format!("gfal-copy {src} {dst}"), "gfal-copy")
            .await
    }

    async fn list(&self, uri: &str) -> Result<Vec<String>, AdapterError> {
        let out = self
            .runner
            .run_retrying(
                &format!("gfal-ls {uri}"),
                self.retry.retries_max,
                self.retry.retries_delay,
            )
            .await?;
        if !out.success() {
            return Err(AdapterError::Transient(format!(
                "gfal-ls {uri} failed with exit {:?}",
                out.exit_code
            )));
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory storage with real rename-fails-on-existing semantics.
    #[derive(Default)]
    struct MemStorage {
        objects: Mutex<BTreeMap<String, String>>,
    }

    #[async_trait]
    impl Storage for MemStorage {
        async fn mkdir(&self, _uri: &str) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn exists(&self, uri: &str) -> Result<bool, AdapterError> {
            Ok(self.objects.lock().unwrap().contains_key(uri))
        }

        async fn rename(&self, src: &str, dst: &str) -> Result<(), AdapterError> {
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(dst) {
                return Err(AdapterError::Transient(format!("{dst} exists")));
            }
            match objects.remove(src) {
                Some(content) => {
                    objects.insert(dst.to_string(), content);
                    Ok(())
                }
                None => Err(AdapterError::Transient(format!("{src} missing"))),
            }
        }

        async fn copy(&self, src: &str, dst: &str) -> Result<(), AdapterError> {
            let mut objects = self.objects.lock().unwrap();
            objects.insert(dst.to_string(), format!("copy of {src}"));
            Ok(())
        }

        async fn list(&self, _uri: &str) -> Result<Vec<String>, AdapterError> {
            Ok(self.objects.lock().unwrap().keys().cloned().collect())
        }
    }

    #[tokio::test]
    async fn archive_is_idempotent_under_collision() {
        let storage = MemStorage::default();
        storage.archive("src", "dst").await.unwrap();
        storage.archive("src", "dst").await.unwrap();

        let names = storage.list("").await.unwrap();
        assert_eq!(names, vec!["dst", "dst.00"]);

        // K repetitions leave exactly K named copies
        storage.archive("src", "dst").await.unwrap();
        storage.archive("src", "dst").await.unwrap();
        let names = storage.list("").await.unwrap();
        assert_eq!(names, vec!["dst", "dst.00", "dst.01", "dst.02"]);
    }

    #[tokio::test]
    async fn archive_exhausts_suffixes() {
        let storage = MemStorage::default();
        {
            let mut objects = storage.objects.lock().unwrap();
            objects.insert("dst".to_string(), "incumbent".to_string());
            for idx in 0..100u32 {
                objects.insert(format!("dst.{idx:02}"), "old".to_string());
            }
        }
        let err = storage.archive("src", "dst").await.unwrap_err();
        assert!(matches!(err, AdapterError::Permanent(_)));
    }
}
