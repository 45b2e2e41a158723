use chrono::{DateTime, SecondsFormat, Utc};

use super::StoreError;
use crate::checks::Probe;

/// One row of an endpoint's append-only check log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRecord {
    pub timestamp: DateTime<Utc>,
    pub checksum: Option<String>,
    pub status: Option<u16>,
    pub timeout: bool,
    pub connection_error: bool,
    pub content_error: bool,
    pub note: Option<String>,
}

impl CheckRecord {
    /// Create the record of a probe. `checksum` is `None` when no content was kept.
    pub fn from_probe(probe: &Probe, checksum: Option<String>) -> Self {
        Self {
            timestamp: probe.checked_at,
            checksum,
            status: probe.outcome.status_code(),
            timeout: probe.outcome.is_timeout(),
            connection_error: probe.outcome.is_connection_error(),
            content_error: probe.outcome.is_unreadable(),
            note: probe.outcome.note().map(str::to_owned),
        }
    }
}

/// Where a stored snapshot lives, relative to the endpoint's store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    /// Directory name, a UTC timestamp
    pub id: String,
    pub file_name: String,
}

/// The mutable part of an endpoint's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestState {
    pub latest_check_timestamp: Option<DateTime<Utc>>,
    pub latest_checksum: Option<String>,
    pub latest_changed_timestamp: Option<DateTime<Utc>>,
    pub latest_changed_snapshot: Option<SnapshotRef>,
}

/// Partial update of [`LatestState`]. Fields left `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestStateUpdate {
    pub latest_check_timestamp: Option<DateTime<Utc>>,
    pub latest_checksum: Option<String>,
    pub latest_changed_timestamp: Option<DateTime<Utc>>,
    pub latest_changed_snapshot: Option<SnapshotRef>,
}

impl LatestStateUpdate {
    pub fn checked_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.latest_check_timestamp = Some(timestamp);
        self
    }

    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.latest_checksum = Some(checksum.into());
        self
    }

    pub fn changed(mut self, timestamp: DateTime<Utc>, snapshot: SnapshotRef) -> Self {
        self.latest_changed_timestamp = Some(timestamp);
        self.latest_changed_snapshot = Some(snapshot);
        self
    }
}

/// The immutable identity record written when a store is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMetadata {
    pub country_code: String,
    pub service_type: String,
    pub url: String,
    pub storage_key: String,
}

/// Fixed-width RFC 3339, so stored timestamps also sort as text.
pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt { column, value: value.to_owned() })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::checks::CheckOutcome;

    #[test]
    fn test_timestamps_survive_formatting() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let formatted = format_timestamp(timestamp);

        assert_eq!(formatted, "2024-03-01T12:30:05.000000Z");
        assert_eq!(parse_timestamp("ts", &formatted).unwrap(), timestamp);
        assert!(parse_timestamp("ts", "yesterday").is_err());
    }

    #[test]
    fn test_record_flags_follow_outcome() {
        let probe = Probe {
            checked_at: Utc::now(),
            outcome: CheckOutcome::ContentError {
                status_code: Some(200),
                note: "bad archive: invalid Zip archive".into(),
                unreadable: true,
            },
            payload: None,
        };
        let record = CheckRecord::from_probe(&probe, None);

        assert!(record.content_error);
        assert!(!record.timeout);
        assert_eq!(record.status, Some(200));
        assert_eq!(record.note.as_deref(), Some("bad archive: invalid Zip archive"));

        let timeout = Probe { outcome: CheckOutcome::Timeout, ..probe };
        let record = CheckRecord::from_probe(&timeout, None);
        assert!(record.timeout && !record.content_error);
        assert_eq!(record.status, None);
    }
}
