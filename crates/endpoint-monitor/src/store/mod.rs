/// Result store - durable per-endpoint persistence
///
/// Every endpoint gets its own directory `output_dir/country_code/storage_key/`
/// holding a LibSQL database (one mutable metadata row plus an append-only
/// check log) and the snapshot directories of changed content.
pub mod migrations;
pub mod models;
pub mod repository;
pub mod snapshots;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use models::{CheckRecord, EndpointMetadata, LatestState, LatestStateUpdate, SnapshotRef};
pub use repository::{DATABASE_FILE, EndpointStore, StoreSession};
pub use snapshots::{DIFF_FILE, SnapshotStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("endpoint {0} has no country code to file its results under")]
    Unpartitioned(String),
    #[error("endpoint metadata record is missing")]
    MissingMetadata,
    #[error("corrupt value in column {column}: {value:?}")]
    Corrupt { column: &'static str, value: String },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}
