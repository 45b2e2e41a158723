use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use url::Url;

use super::archive::{self, Unpacked};
use super::fetcher::{FetchError, FetchMode, FetchedResponse, Fetcher};
use super::naming;
use super::types::{CheckOutcome, Payload, Probe};
use super::xml;
use crate::registry::Endpoint;

pub const NOTE_MULTI_FILE_ARCHIVE: &str = "diff_impossible: multi-file archive";
pub const NOTE_INVALID_XML: &str = "diff_impossible: invalid XML";

/// Executes individual probes. Network failures are folded into the outcome,
/// nothing past this boundary ever sees a fetch error.
pub struct CheckExecutor {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl CheckExecutor {
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Availability probe: headers only.
    pub async fn probe_headers(&self, endpoint: &Endpoint) -> Probe {
        let checked_at = Utc::now();
        let outcome = match self
            .fetcher
            .fetch(endpoint.url(), self.timeout, FetchMode::HeadersOnly)
            .await
        {
            Ok(response) => CheckOutcome::Success(response.meta()),
            Err(error) => failure_outcome(endpoint, error),
        };

        Probe { checked_at, outcome, payload: None }
    }

    /// Reliability probe: downloads the body and prepares it for checksumming.
    pub async fn execute(&self, endpoint: &Endpoint) -> Probe {
        let checked_at = Utc::now();
        match self
            .fetcher
            .fetch(endpoint.url(), self.timeout, FetchMode::FullBody)
            .await
        {
            Ok(response) => {
                let (outcome, payload) = inspect(endpoint.url(), response);
                Probe { checked_at, outcome, payload }
            }
            Err(error) => Probe {
                checked_at,
                outcome: failure_outcome(endpoint, error),
                payload: None,
            },
        }
    }
}

fn failure_outcome(endpoint: &Endpoint, error: FetchError) -> CheckOutcome {
    match error {
        FetchError::Timeout(after) => {
            warn!(url = %endpoint.url(), ?after, "check timed out");
            CheckOutcome::Timeout
        }
        FetchError::Connection(reason) => {
            warn!(url = %endpoint.url(), %reason, "connection failed");
            CheckOutcome::ConnectionError
        }
    }
}

/// Turn a downloaded body into the content whose checksum is tracked.
///
/// Single-file zip archives are unwrapped, multi-file ones are kept verbatim.
/// XML is canonicalised; anything that does not parse is kept raw and flagged
/// as not diffable.
pub fn inspect(url: &Url, response: FetchedResponse) -> (CheckOutcome, Option<Payload>) {
    let meta = response.meta();
    let mut file_name = naming::resolve_file_name(response.content_disposition.as_deref(), url);
    let mut bytes = response.body.unwrap_or_default();

    let zipped = naming::has_archive_extension(url)
        || meta.content_type.as_deref().is_some_and(|kind| kind.contains("zip"))
        || archive::looks_like_zip(&bytes);

    if zipped {
        match archive::unpack(&bytes) {
            Ok(Unpacked::Single { file_name: inner, bytes: inner_bytes }) => {
                debug!(%url, inner = %inner, "unwrapped single-file archive");
                file_name = naming::sanitize(&inner).unwrap_or(file_name);
                bytes = inner_bytes;
            }
            Ok(Unpacked::MultiFile { files }) => {
                debug!(%url, files, "multi-file archive stored as-is");
                if !file_name.to_ascii_lowercase().ends_with(".zip") {
                    file_name.push_str(".zip");
                }
                let outcome = degraded(meta.status_code, NOTE_MULTI_FILE_ARCHIVE);
                return (outcome, Some(Payload { file_name, bytes, diffable: false }));
            }
            Err(error) => {
                warn!(%url, %error, "unreadable archive");
                let outcome = CheckOutcome::ContentError {
                    status_code: Some(meta.status_code),
                    note: format!("bad archive: {error}"),
                    unreadable: true,
                };
                return (outcome, None);
            }
        }
    }

    match xml::pretty_print(&bytes) {
        Ok(pretty) => (
            CheckOutcome::Success(meta),
            Some(Payload { file_name, bytes: pretty, diffable: true }),
        ),
        Err(error) => {
            debug!(%url, %error, "content is not XML, checksumming raw bytes");
            let outcome = degraded(meta.status_code, NOTE_INVALID_XML);
            (outcome, Some(Payload { file_name, bytes, diffable: false }))
        }
    }
}

fn degraded(status_code: u16, note: &str) -> CheckOutcome {
    CheckOutcome::ContentError {
        status_code: Some(status_code),
        note: note.to_owned(),
        unreadable: false,
    }
}
