//! Endpoint monitor - scheduled reliability and availability checks for
//! INSPIRE download services
//!
//! Reliability checks download each endpoint's content, detect changes by
//! checksum and keep a snapshot plus diff history per endpoint. Availability
//! checks only look at response headers and append one row per probe to a
//! shared result log.

pub mod checks;
pub mod detector;
pub mod monitor;
pub mod registry;
pub mod results;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use checks::{CheckExecutor, CheckOutcome, Fetcher, HttpFetcher, Probe};
pub use detector::{ChangeDetector, Detection};
pub use monitor::{AvailabilityMonitor, ReliabilityMonitor};
pub use registry::{ConfigError, Endpoint, Layout, Registry, RegistryError};
pub use results::{AvailabilityRecord, AvailabilitySummary, ResultLog, ResultLogError};
pub use scheduler::{Job, Scheduler, SchedulerError};
pub use store::{EndpointStore, StoreError};

/// User agent sent with every probe unless configured otherwise
pub const DEFAULT_USER_AGENT: &str = concat!("inspire-monitor/", env!("CARGO_PKG_VERSION"));
