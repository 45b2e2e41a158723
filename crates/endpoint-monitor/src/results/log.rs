use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::checks::Probe;

const COLUMNS: usize = 9;

#[derive(Debug, Error)]
pub enum ResultLogError {
    #[error("I/O error on result log {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },
}

/// One row of the availability result log.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityRecord {
    pub timestamp: DateTime<Utc>,
    pub endpoint_id: usize,
    pub status_code: Option<u16>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub duration: Option<Duration>,
    pub last_modified: Option<String>,
    pub timeout: bool,
    pub connection_error: bool,
}

impl AvailabilityRecord {
    pub fn from_probe(endpoint_id: usize, probe: &Probe) -> Self {
        let meta = probe.outcome.meta();
        Self {
            timestamp: probe.checked_at,
            endpoint_id,
            status_code: probe.outcome.status_code(),
            content_length: meta.and_then(|meta| meta.content_length),
            content_type: meta.and_then(|meta| meta.content_type.clone()),
            duration: meta.map(|meta| meta.duration),
            last_modified: meta.and_then(|meta| meta.last_modified.clone()),
            timeout: probe.outcome.is_timeout(),
            connection_error: probe.outcome.is_connection_error(),
        }
    }

    /// Tab-separated row, without the line terminator. Absent values are empty columns.
    pub fn to_row(&self) -> String {
        let bit = |set: bool| if set { "1" } else { "0" };
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false),
            self.endpoint_id.to_string(),
            self.status_code.map(|code| code.to_string()).unwrap_or_default(),
            self.content_length.map(|len| len.to_string()).unwrap_or_default(),
            self.content_type.as_deref().map(clean).unwrap_or_default(),
            self.duration
                .map(|duration| format!("{:.6}", duration.as_secs_f64()))
                .unwrap_or_default(),
            self.last_modified.as_deref().map(clean).unwrap_or_default(),
            bit(self.timeout).to_owned(),
            bit(self.connection_error).to_owned(),
        ]
        .join("\t")
    }

    pub fn parse_row(line: usize, row: &str) -> Result<Self, ResultLogError> {
        let malformed = |reason: String| ResultLogError::MalformedRow { line, reason };

        let columns: Vec<&str> = row.split('\t').collect();
        let &[ts, id, status, length, kind, duration, modified, timeout, conn_error] =
            columns.as_slice()
        else {
            return Err(malformed(format!("expected {COLUMNS} columns, found {}", columns.len())));
        };

        let timestamp = DateTime::parse_from_rfc3339(ts)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| malformed(format!("bad timestamp {ts:?}: {e}")))?;
        let endpoint_id = id
            .parse()
            .map_err(|_| malformed(format!("bad endpoint id {id:?}")))?;
        let duration = optional::<f64>(duration, "duration", &malformed)?
            .map(Duration::try_from_secs_f64)
            .transpose()
            .map_err(|e| malformed(format!("bad duration: {e}")))?;

        Ok(Self {
            timestamp,
            endpoint_id,
            status_code: optional(status, "status code", &malformed)?,
            content_length: optional(length, "content length", &malformed)?,
            content_type: text(kind),
            duration,
            last_modified: text(modified),
            timeout: flag(timeout, "timeout", &malformed)?,
            connection_error: flag(conn_error, "connection error", &malformed)?,
        })
    }
}

fn clean(value: &str) -> String {
    value.replace(['\t', '\r', '\n'], " ")
}

fn text(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

fn optional<T: std::str::FromStr>(
    value: &str,
    column: &str,
    malformed: &impl Fn(String) -> ResultLogError,
) -> Result<Option<T>, ResultLogError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| malformed(format!("bad {column} {value:?}")))
}

fn flag(
    value: &str,
    column: &str,
    malformed: &impl Fn(String) -> ResultLogError,
) -> Result<bool, ResultLogError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(malformed(format!("bad {column} flag {other:?}"))),
    }
}

/// Append-only tab-delimited log shared by every availability job.
///
/// All appends go through one lock so concurrent jobs never interleave rows.
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &AvailabilityRecord) -> Result<(), ResultLogError> {
        let mut line = record.to_row();
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| self.io(source))?;
        file.write_all(line.as_bytes()).await.map_err(|source| self.io(source))?;
        file.flush().await.map_err(|source| self.io(source))
    }

    /// Every well-formed row; malformed ones are logged and skipped.
    pub async fn read_all(&self) -> Result<Vec<AvailabilityRecord>, ResultLogError> {
        let content = fs::read_to_string(&self.path).await.map_err(|source| self.io(source))?;
        Ok(parse_log(&content, &self.path))
    }

    fn io(&self, source: std::io::Error) -> ResultLogError {
        ResultLogError::Io { path: self.path.clone(), source }
    }
}

fn parse_log(content: &str, path: &Path) -> Vec<AvailabilityRecord> {
    content
        .lines()
        .enumerate()
        .filter(|(_, row)| !row.trim().is_empty())
        .filter_map(|(index, row)| match AvailabilityRecord::parse_row(index + 1, row) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping result row");
                None
            }
        })
        .collect()
}
