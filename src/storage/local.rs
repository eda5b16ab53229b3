//! Local filesystem storage implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Snapshot, SnapshotPointer};
use crate::storage::SnapshotStore;

const POINTER_KEY: &str = "last_run.json";
const BODY_PREFIX: &str = "kitas_";
const BODY_SUFFIX: &str = ".json";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    keep_snapshots: usize,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory, keeping every body.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            keep_snapshots: 0,
        }
    }

    /// Keep only the newest `keep` snapshot bodies after each save (0 keeps all).
    pub fn with_retention(mut self, keep: usize) -> Self {
        self.keep_snapshots = keep;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Body key for a snapshot taken at `timestamp`.
    fn body_key(timestamp: DateTime<Utc>) -> String {
        format!("{BODY_PREFIX}{}{BODY_SUFFIX}", timestamp.timestamp_millis())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        tokio::fs::create_dir_all(&self.root_dir).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data; undecodable content is logged and reported as missing.
    async fn read_json_lenient<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.read_bytes(key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("Ignoring unreadable {}: {}", self.path(key).display(), e);
                Ok(None)
            }
        }
    }

    /// Current pointer record, if one was written.
    pub async fn load_pointer(&self) -> Result<Option<SnapshotPointer>> {
        self.read_json_lenient(POINTER_KEY).await
    }

    /// Timestamps of every snapshot body on disk, oldest first.
    pub async fn list_snapshots(&self) -> Result<Vec<i64>> {
        let mut entries = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut stamps = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let millis = name
                .to_str()
                .and_then(|n| n.strip_prefix(BODY_PREFIX))
                .and_then(|n| n.strip_suffix(BODY_SUFFIX))
                .and_then(|n| n.parse::<i64>().ok());
            if let Some(millis) = millis {
                stamps.push(millis);
            }
        }
        stamps.sort_unstable();
        Ok(stamps)
    }

    /// Delete the oldest bodies beyond the retention limit, never `current`.
    async fn prune(&self, current: DateTime<Utc>) -> Result<usize> {
        if self.keep_snapshots == 0 {
            return Ok(0);
        }

        let stamps = self.list_snapshots().await?;
        let excess = stamps.len().saturating_sub(self.keep_snapshots);
        let current = current.timestamp_millis();

        let mut removed = 0;
        for millis in stamps.into_iter().take(excess) {
            if millis == current {
                continue;
            }
            let key = format!("{BODY_PREFIX}{millis}{BODY_SUFFIX}");
            match tokio::fs::remove_file(self.path(&key)).await {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to remove old snapshot {}: {}", key, e),
            }
        }

        if removed > 0 {
            log::debug!("Pruned {} old snapshot(s)", removed);
        }
        Ok(removed)
    }
}

#[async_trait]
impl SnapshotStore for LocalStorage {
    async fn load_previous(&self) -> Result<Option<Snapshot>> {
        let Some(pointer) = self.load_pointer().await? else {
            log::debug!("No previous run recorded in {}", self.root_dir.display());
            return Ok(None);
        };

        let key = Self::body_key(pointer.last_modified);
        match self.read_json_lenient::<Snapshot>(&key).await? {
            Some(snapshot) => Ok(Some(snapshot)),
            None => {
                log::warn!(
                    "Loading of kitas failed - could not find {}",
                    self.path(&key).display()
                );
                Ok(None)
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let key = Self::body_key(snapshot.timestamp);
        self.write_json(&key, snapshot).await?;
        self.write_json(
            POINTER_KEY,
            &SnapshotPointer {
                last_modified: snapshot.timestamp,
            },
        )
        .await?;

        log::debug!(
            "Saved {} kitas to {}",
            snapshot.len(),
            self.path(&key).display()
        );

        if let Err(e) = self.prune(snapshot.timestamp).await {
            log::warn!("Pruning old snapshots failed: {}", e);
        }
        Ok(())
    }
}
