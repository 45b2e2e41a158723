use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::fs;

use super::StoreError;
use super::models::SnapshotRef;

/// Name of the diff file written next to a changed snapshot.
pub const DIFF_FILE: &str = "diff";

const SNAPSHOT_ID_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Snapshot directories of one endpoint: `<root>/<timestamp>/<file name>`.
/// Append-only; nothing here overwrites or deletes.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn snapshot_id(at: DateTime<Utc>) -> String {
        at.format(SNAPSHOT_ID_FORMAT).to_string()
    }

    pub fn path_of(&self, snapshot: &SnapshotRef) -> PathBuf {
        self.root.join(&snapshot.id).join(&snapshot.file_name)
    }

    pub fn diff_path_of(&self, snapshot: &SnapshotRef) -> PathBuf {
        self.root.join(&snapshot.id).join(DIFF_FILE)
    }

    /// Store content under a fresh directory named after `at`.
    /// Fails rather than reuse an existing directory.
    pub async fn persist(
        &self,
        at: DateTime<Utc>,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<SnapshotRef, StoreError> {
        let snapshot = SnapshotRef {
            id: Self::snapshot_id(at),
            file_name: file_name.to_owned(),
        };

        let dir = self.root.join(&snapshot.id);
        fs::create_dir(&dir).await.map_err(|source| StoreError::io(&dir, source))?;

        let path = self.path_of(&snapshot);
        fs::write(&path, bytes).await.map_err(|source| StoreError::io(&path, source))?;

        Ok(snapshot)
    }

    pub async fn read(&self, snapshot: &SnapshotRef) -> Result<Vec<u8>, StoreError> {
        let path = self.path_of(snapshot);
        fs::read(&path).await.map_err(|source| StoreError::io(&path, source))
    }

    pub async fn write_diff(&self, snapshot: &SnapshotRef, diff: &str) -> Result<(), StoreError> {
        let path = self.diff_path_of(snapshot);
        fs::write(&path, diff).await.map_err(|source| StoreError::io(&path, source))
    }

    /// Ids of all stored snapshots, oldest first.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|source| StoreError::io(&self.root, source))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::io(&self.root, source))?
        {
            let is_dir = entry.file_type().await.is_ok_and(|kind| kind.is_dir());
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                ids.push(name.to_owned());
            }
        }

        ids.sort();
        Ok(ids)
    }
}
