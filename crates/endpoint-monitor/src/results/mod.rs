//! Availability results: the shared append-only log and its summaries.

pub mod log;
pub mod summary;

pub use log::{AvailabilityRecord, ResultLog, ResultLogError};
pub use summary::{AvailabilitySummary, render_table, service_label, summarize};
