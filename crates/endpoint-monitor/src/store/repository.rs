use std::path::{Path, PathBuf};

use libsql::{Builder, Connection, Database, Row, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::StoreError;
use super::migrations;
use super::models::{
    CheckRecord, EndpointMetadata, LatestState, LatestStateUpdate, SnapshotRef, format_timestamp,
    parse_timestamp,
};
use super::snapshots::SnapshotStore;
use crate::registry::Endpoint;

/// File name of the per-endpoint database.
pub const DATABASE_FILE: &str = "data.db";

/// `?1` if it is set and later than the stored check time. Stored timestamps
/// are fixed width, so text order is time order.
const LATER_CHECK_TS: &str =
    "CASE WHEN ?1 IS NOT NULL AND ?1 > IFNULL(latest_check_ts, '') THEN ?1 ELSE latest_check_ts END";

/// Durable store of one endpoint.
///
/// A single connection behind an async mutex is the one writer of the
/// endpoint: every write, and every read-modify-write sequence run through a
/// [`StoreSession`], is serialised on it. Stores of different endpoints share
/// nothing.
pub struct EndpointStore {
    dir: PathBuf,
    snapshots: SnapshotStore,
    conn: Mutex<Connection>,
    _database: Database,
}

impl EndpointStore {
    /// Create (or reopen) the store of an endpoint under
    /// `output_dir/country_code/storage_key/`, writing its identity record once.
    pub async fn create(output_dir: &Path, endpoint: &Endpoint) -> Result<Self, StoreError> {
        let country_code = endpoint
            .country_code()
            .ok_or_else(|| StoreError::Unpartitioned(endpoint.url().to_string()))?;
        let dir = output_dir.join(country_code).join(endpoint.storage_key());

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::io(&dir, source))?;

        let database = Builder::new_local(dir.join(DATABASE_FILE)).build().await?;
        let conn = database.connect()?;
        migrations::run_migrations(&conn).await?;

        // OR IGNORE: reopening an existing store never duplicates the identity record
        conn.execute(
            "INSERT OR IGNORE INTO metadata (id, country_code, service_type, url, storage_key) VALUES (1, ?, ?, ?, ?)",
            params![
                country_code,
                endpoint.service_type().unwrap_or_default(),
                endpoint.url().as_str(),
                endpoint.storage_key()
            ],
        )
        .await?;

        debug!(url = %endpoint.url(), dir = %dir.display(), "opened endpoint store");

        Ok(Self {
            snapshots: SnapshotStore::new(&dir),
            dir,
            conn: Mutex::new(conn),
            _database: database,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Take the endpoint's write lock for a sequence of operations.
    pub async fn session(&self) -> StoreSession<'_> {
        StoreSession {
            conn: self.conn.lock().await,
            snapshots: &self.snapshots,
        }
    }

    pub async fn append_check(&self, record: &CheckRecord) -> Result<(), StoreError> {
        self.session().await.append_check(record).await
    }

    pub async fn latest_state(&self) -> Result<LatestState, StoreError> {
        self.session().await.latest_state().await
    }

    pub async fn update_latest_state(&self, update: LatestStateUpdate) -> Result<(), StoreError> {
        self.session().await.update_latest_state(update).await
    }

    pub async fn metadata(&self) -> Result<EndpointMetadata, StoreError> {
        self.session().await.metadata().await
    }

    /// All check records, in append order.
    pub async fn checks(&self) -> Result<Vec<CheckRecord>, StoreError> {
        self.session().await.checks().await
    }
}

/// Exclusive access to one endpoint store. Dropping it releases the lock.
pub struct StoreSession<'a> {
    conn: MutexGuard<'a, Connection>,
    snapshots: &'a SnapshotStore,
}

impl StoreSession<'_> {
    pub fn snapshots(&self) -> &SnapshotStore {
        self.snapshots
    }

    /// Record a check and advance `latest_check_ts` to its time, in one transaction.
    pub async fn append_check(&self, record: &CheckRecord) -> Result<(), StoreError> {
        let ts = format_timestamp(record.timestamp);
        let tx = self.conn.transaction().await?;
        tx.execute(
            "INSERT INTO checks (ts, checksum, status, timeout, conn_error, content_error, note) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                ts.clone(),
                record.checksum.clone(),
                record.status.map(i64::from),
                i64::from(record.timeout),
                i64::from(record.connection_error),
                i64::from(record.content_error),
                record.note.clone()
            ],
        )
        .await?;
        let updated = tx
            .execute(
                &format!("UPDATE metadata SET latest_check_ts = {LATER_CHECK_TS} WHERE id = 1"),
                params![ts.clone()],
            )
            .await?;
        if updated == 0 {
            // dropping the transaction rolls the insert back
            return Err(StoreError::MissingMetadata);
        }
        tx.commit().await?;

        debug!(%ts, "saved check");
        Ok(())
    }

    pub async fn latest_state(&self) -> Result<LatestState, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT latest_check_ts, latest_checksum, latest_changed_ts, latest_changed_dir, latest_changed_file_name FROM metadata WHERE id = 1",
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(StoreError::MissingMetadata)?;

        let latest_check_ts: Option<String> = row.get(0)?;
        let latest_changed_ts: Option<String> = row.get(2)?;
        let changed_dir: Option<String> = row.get(3)?;
        let changed_file_name: Option<String> = row.get(4)?;

        Ok(LatestState {
            latest_check_timestamp: latest_check_ts
                .map(|value| parse_timestamp("latest_check_ts", &value))
                .transpose()?,
            latest_checksum: row.get(1)?,
            latest_changed_timestamp: latest_changed_ts
                .map(|value| parse_timestamp("latest_changed_ts", &value))
                .transpose()?,
            latest_changed_snapshot: changed_dir
                .zip(changed_file_name)
                .map(|(id, file_name)| SnapshotRef { id, file_name }),
        })
    }

    /// Apply the fields set in `update`, leaving the others untouched. The
    /// check time only ever moves forward.
    pub async fn update_latest_state(&self, update: LatestStateUpdate) -> Result<(), StoreError> {
        let (changed_dir, changed_file_name) = match update.latest_changed_snapshot {
            Some(snapshot) => (Some(snapshot.id), Some(snapshot.file_name)),
            None => (None, None),
        };

        let updated = self
            .conn
            .execute(
                &format!(
                    "UPDATE metadata SET
                    latest_check_ts = {LATER_CHECK_TS},
                    latest_checksum = COALESCE(?2, latest_checksum),
                    latest_changed_ts = COALESCE(?3, latest_changed_ts),
                    latest_changed_dir = COALESCE(?4, latest_changed_dir),
                    latest_changed_file_name = COALESCE(?5, latest_changed_file_name)
                WHERE id = 1"
                ),
                params![
                    update.latest_check_timestamp.map(format_timestamp),
                    update.latest_checksum,
                    update.latest_changed_timestamp.map(format_timestamp),
                    changed_dir,
                    changed_file_name
                ],
            )
            .await?;

        if updated == 0 {
            return Err(StoreError::MissingMetadata);
        }
        Ok(())
    }

    pub async fn metadata(&self) -> Result<EndpointMetadata, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT country_code, service_type, url, storage_key FROM metadata WHERE id = 1",
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(StoreError::MissingMetadata)?;

        Ok(EndpointMetadata {
            country_code: row.get(0)?,
            service_type: row.get(1)?,
            url: row.get(2)?,
            storage_key: row.get(3)?,
        })
    }

    pub async fn checks(&self) -> Result<Vec<CheckRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT ts, checksum, status, timeout, conn_error, content_error, note FROM checks ORDER BY id",
                (),
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(check_from_row(&row)?);
        }
        Ok(records)
    }
}

fn check_from_row(row: &Row) -> Result<CheckRecord, StoreError> {
    let ts: String = row.get(0)?;
    let status = row
        .get::<Option<i64>>(2)?
        .map(|value| {
            u16::try_from(value)
                .map_err(|_| StoreError::Corrupt { column: "status", value: value.to_string() })
        })
        .transpose()?;

    Ok(CheckRecord {
        timestamp: parse_timestamp("ts", &ts)?,
        checksum: row.get(1)?,
        status,
        timeout: row.get::<i64>(3)? != 0,
        connection_error: row.get::<i64>(4)? != 0,
        content_error: row.get::<i64>(5)? != 0,
        note: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::service(0, "DE", "GSDS", "https://example.de/ps.gml").unwrap()
    }

    fn record(second: u32, checksum: &str) -> CheckRecord {
        CheckRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap(),
            checksum: Some(checksum.to_owned()),
            status: Some(200),
            timeout: false,
            connection_error: false,
            content_error: false,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_store_layout_and_metadata() {
        let output = tempdir().unwrap();
        let endpoint = endpoint();
        let store = EndpointStore::create(output.path(), &endpoint).await.unwrap();

        let expected_dir = output.path().join("DE").join(endpoint.storage_key());
        assert_eq!(store.dir(), expected_dir);
        assert!(expected_dir.join(DATABASE_FILE).exists());

        let metadata = store.metadata().await.unwrap();
        assert_eq!(metadata.country_code, "DE");
        assert_eq!(metadata.service_type, "GSDS");
        assert_eq!(metadata.url, "https://example.de/ps.gml");
        assert_eq!(metadata.storage_key, endpoint.storage_key());
        assert_eq!(store.latest_state().await.unwrap(), LatestState::default());
    }

    #[tokio::test]
    async fn test_reopening_never_duplicates_metadata() {
        let output = tempdir().unwrap();
        let endpoint = endpoint();
        drop(EndpointStore::create(output.path(), &endpoint).await.unwrap());
        let store = EndpointStore::create(output.path(), &endpoint).await.unwrap();

        let session = store.session().await;
        let mut rows = session.conn.query("SELECT COUNT(*) FROM metadata", ()).await.unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unpartitioned_endpoint_is_rejected() {
        let output = tempdir().unwrap();
        let endpoint = Endpoint::url_only(0, "https://example.com").unwrap();

        let result = EndpointStore::create(output.path(), &endpoint).await;
        assert!(matches!(result, Err(StoreError::Unpartitioned(_))));
    }

    #[tokio::test]
    async fn test_update_is_partial() {
        let output = tempdir().unwrap();
        let store = EndpointStore::create(output.path(), &endpoint()).await.unwrap();
        let changed_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = SnapshotRef { id: "20240101_000000_000000".into(), file_name: "ps.gml".into() };

        store
            .update_latest_state(
                LatestStateUpdate::default()
                    .checksum("c1")
                    .changed(changed_at, snapshot.clone()),
            )
            .await
            .unwrap();
        let checked_at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        store
            .update_latest_state(LatestStateUpdate::default().checked_at(checked_at))
            .await
            .unwrap();

        let state = store.latest_state().await.unwrap();
        assert_eq!(state.latest_check_timestamp, Some(checked_at));
        assert_eq!(state.latest_checksum.as_deref(), Some("c1"));
        assert_eq!(state.latest_changed_timestamp, Some(changed_at));
        assert_eq!(state.latest_changed_snapshot, Some(snapshot));
    }

    #[tokio::test]
    async fn test_checks_are_appended_in_order() {
        let output = tempdir().unwrap();
        let store = EndpointStore::create(output.path(), &endpoint()).await.unwrap();
        let timeout = CheckRecord {
            checksum: None,
            status: None,
            timeout: true,
            note: Some("slow".into()),
            ..record(2, "")
        };

        store.append_check(&record(1, "c1")).await.unwrap();
        assert_eq!(
            store.latest_state().await.unwrap().latest_check_timestamp,
            Some(record(1, "c1").timestamp)
        );
        store.append_check(&timeout).await.unwrap();

        let state = store.latest_state().await.unwrap();
        assert_eq!(state.latest_check_timestamp, Some(timeout.timestamp));
        assert_eq!(state.latest_checksum, None);
        assert_eq!(store.checks().await.unwrap(), vec![record(1, "c1"), timeout]);
    }

    #[tokio::test]
    async fn test_check_time_never_moves_backwards() {
        let output = tempdir().unwrap();
        let store = EndpointStore::create(output.path(), &endpoint()).await.unwrap();
        let later = record(30, "c2");
        let earlier = record(10, "c1");

        store.append_check(&later).await.unwrap();
        store.append_check(&earlier).await.unwrap();
        assert_eq!(
            store.latest_state().await.unwrap().latest_check_timestamp,
            Some(later.timestamp)
        );

        store
            .update_latest_state(LatestStateUpdate::default().checked_at(earlier.timestamp))
            .await
            .unwrap();
        assert_eq!(
            store.latest_state().await.unwrap().latest_check_timestamp,
            Some(later.timestamp)
        );
        assert_eq!(store.checks().await.unwrap(), vec![later, earlier]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let output = tempdir().unwrap();
        let store = Arc::new(EndpointStore::create(output.path(), &endpoint()).await.unwrap());

        let writers = (0..20u32).map(|second| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append_check(&record(second, "c")).await })
        });
        for writer in futures::future::join_all(writers).await {
            writer.unwrap().unwrap();
        }

        let mut seconds: Vec<u32> = store
            .checks()
            .await
            .unwrap()
            .iter()
            .map(|check| chrono::Timelike::second(&check.timestamp))
            .collect();
        seconds.sort_unstable();
        assert_eq!(seconds, (0..20).collect::<Vec<_>>());
    }
}
