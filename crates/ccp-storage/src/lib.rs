//! JSON-file-backed stores for content records and account stats.
//!
//! Both stores hold a single small single-user collection and are written
//! whole: callers read the full collection, mutate in memory, then flush it
//! back in one batch. There is no record-level write path and no locking;
//! two simultaneous writers race last-writer-wins. That is an accepted
//! limitation of the single-user scope and must be revisited before any
//! multi-user deployment.

use std::path::{Path, PathBuf};

use anyhow::Context;
use ccp_core::{AccountStats, ContentRecord};
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "ccp-storage";

/// Full-collection store over a `content.json` file.
#[derive(Debug, Clone)]
pub struct ContentStore {
    path: PathBuf,
}

impl ContentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: data_dir.into().join("content.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty collection, not an error.
    pub async fn load(&self) -> anyhow::Result<Vec<ContentRecord>> {
        read_json_or_default(&self.path).await
    }

    /// Replace the entire collection in one atomic write.
    pub async fn replace_all(&self, records: &[ContentRecord]) -> anyhow::Result<()> {
        write_json_atomic(&self.path, &records.to_vec()).await?;
        debug!(count = records.len(), path = %self.path.display(), "flushed content collection");
        Ok(())
    }
}

/// Store for per-platform account stats (`accounts.json`).
#[derive(Debug, Clone)]
pub struct AccountsStore {
    path: PathBuf,
}

impl AccountsStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: data_dir.into().join("accounts.json"),
        }
    }

    pub async fn load(&self) -> anyhow::Result<AccountStats> {
        read_json_or_default(&self.path).await
    }

    pub async fn save(&self, stats: &AccountStats) -> anyhow::Result<()> {
        write_json_atomic(&self.path, stats).await
    }
}

async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> anyhow::Result<T> {
    match fs::read_to_string(path).await {
        Ok(text) => {
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Write via temp file + rename so a crash mid-write never leaves a
/// truncated collection behind.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serializing collection")?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating data directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(&bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    match fs::rename(&temp_path, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&temp_path).await;
            Err(err).with_context(|| {
                format!(
                    "atomically renaming {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccp_core::Status;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_as_empty_collection() {
        let dir = tempdir().expect("tempdir");
        let store = ContentStore::new(dir.path());
        let records = store.load().await.expect("load");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn replace_all_round_trips_and_overwrites() {
        let dir = tempdir().expect("tempdir");
        let store = ContentStore::new(dir.path());

        let mut first = ContentRecord::new("1".into(), "Balcony garden tour".into());
        first.status = Status::Posted;
        first.views = 12000;
        store.replace_all(&[first.clone()]).await.expect("first write");
        assert_eq!(store.load().await.expect("load"), vec![first.clone()]);

        let second = ContentRecord::new("2".into(), "Compost update".into());
        store
            .replace_all(&[first.clone(), second.clone()])
            .await
            .expect("second write");
        assert_eq!(store.load().await.expect("reload"), vec![first, second]);
    }

    #[tokio::test]
    async fn write_leaves_no_temp_files_behind() {
        let dir = tempdir().expect("tempdir");
        let store = ContentStore::new(dir.path());
        store.replace_all(&[]).await.expect("write");

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.expect("read_dir");
        while let Some(entry) = entries.next_entry().await.expect("entry") {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["content.json".to_string()]);
    }

    #[tokio::test]
    async fn failed_flush_commits_nothing_and_cleans_its_temp_file() {
        let dir = tempdir().expect("tempdir");
        // A directory squatting on the target path makes the final rename
        // fail after the temp file was written.
        tokio::fs::create_dir(dir.path().join("content.json"))
            .await
            .expect("blocking dir");

        let store = ContentStore::new(dir.path());
        let record = ContentRecord::new("1".into(), "Garden tour".into());
        let err = store.replace_all(&[record]).await;
        assert!(err.is_err());

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.expect("read_dir");
        while let Some(entry) = entries.next_entry().await.expect("entry") {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["content.json".to_string()]);
        assert!(dir.path().join("content.json").is_dir());
    }

    #[tokio::test]
    async fn accounts_store_defaults_then_persists() {
        let dir = tempdir().expect("tempdir");
        let store = AccountsStore::new(dir.path());
        assert_eq!(store.load().await.expect("load"), AccountStats::default());

        let stats = AccountStats {
            tiktok: None,
            instagram: None,
            last_synced: Some(chrono::Utc::now()),
        };
        store.save(&stats).await.expect("save");
        assert_eq!(store.load().await.expect("reload"), stats);
    }
}
