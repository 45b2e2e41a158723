/// Check executor - performs one HTTP probe against one endpoint
///
/// This module is responsible for:
/// - Fetching headers (availability) or full content (reliability)
/// - Unwrapping single-file archives and canonicalising XML before checksumming
/// - Folding timeouts and connection failures into the probe outcome
pub mod archive;
pub mod executor;
pub mod fetcher;
pub mod naming;
pub mod types;
pub mod xml;

pub use executor::{CheckExecutor, NOTE_INVALID_XML, NOTE_MULTI_FILE_ARCHIVE};
pub use fetcher::{FetchError, FetchMode, FetchedResponse, Fetcher, HttpFetcher};
pub use types::{CheckOutcome, Payload, Probe, ResponseMeta};
