use std::time::Duration;

use chrono::{DateTime, Utc};

/// Metadata of a response that made it back to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status_code: u16,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    /// Time until the response headers arrived
    pub duration: Duration,
    pub last_modified: Option<String>,
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Success(ResponseMeta),
    Timeout,
    ConnectionError,
    /// The server answered but its content could not be handled as expected.
    ///
    /// `unreadable` is set when nothing usable could be extracted (a broken
    /// archive). Otherwise the content is still stored, it just cannot be diffed.
    ContentError {
        status_code: Option<u16>,
        note: String,
        unreadable: bool,
    },
}

impl CheckOutcome {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CheckOutcome::Success(meta) => Some(meta.status_code),
            CheckOutcome::ContentError { status_code, .. } => *status_code,
            CheckOutcome::Timeout | CheckOutcome::ConnectionError => None,
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            CheckOutcome::ContentError { note, .. } => Some(note),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CheckOutcome::Timeout)
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, CheckOutcome::ConnectionError)
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self, CheckOutcome::ContentError { unreadable: true, .. })
    }

    pub fn meta(&self) -> Option<&ResponseMeta> {
        match self {
            CheckOutcome::Success(meta) => Some(meta),
            _ => None,
        }
    }
}

/// Content retained from a full-body probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub file_name: String,
    /// Canonicalised XML when `diffable`, raw bytes otherwise
    pub bytes: Vec<u8>,
    pub diffable: bool,
}

/// Everything one probe produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub checked_at: DateTime<Utc>,
    pub outcome: CheckOutcome,
    pub payload: Option<Payload>,
}
