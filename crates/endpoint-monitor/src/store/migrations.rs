use chrono::Utc;
use libsql::Connection;

use super::StoreError;
use super::models::format_timestamp;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Bring an endpoint database up to the current schema.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;
    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Endpoint store schema is up to date (version {})", current_version);
        return Ok(());
    }

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Endpoint metadata and check log").await?;
    }

    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32, StoreError> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, format_timestamp(Utc::now()), description],
    )
    .await?;

    tracing::debug!("Applied endpoint store migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: the single metadata row and the append-only check log
async fn run_migration_v1(conn: &Connection) -> Result<(), StoreError> {
    // id is pinned to 1 so the identity record can never be duplicated
    conn.execute(
        "CREATE TABLE IF NOT EXISTS metadata (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            country_code TEXT NOT NULL,
            service_type TEXT NOT NULL,
            url TEXT NOT NULL,
            storage_key TEXT NOT NULL,
            latest_check_ts TEXT,
            latest_checksum TEXT,
            latest_changed_ts TEXT,
            latest_changed_dir TEXT,
            latest_changed_file_name TEXT
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            checksum TEXT,
            status INTEGER,
            timeout INTEGER NOT NULL DEFAULT 0,
            conn_error INTEGER NOT NULL DEFAULT 0,
            content_error INTEGER NOT NULL DEFAULT 0,
            note TEXT
        )",
        (),
    )
    .await?;

    Ok(())
}
