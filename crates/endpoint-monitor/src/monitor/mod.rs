/// Monitor wiring - turns an endpoint list into scheduled jobs
///
/// This module is responsible for:
/// - Creating one result store per endpoint (reliability)
/// - Sharing one result log between all endpoints (availability)
/// - Registering one job per endpoint with the scheduler
pub mod availability;
pub mod reliability;

pub use availability::{AvailabilityJob, AvailabilityMonitor};
pub use reliability::{ReliabilityJob, ReliabilityMonitor};

use std::time::Duration;

/// Check every 12 hours unless told otherwise.
pub const DEFAULT_RELIABILITY_INTERVAL: Duration = Duration::from_secs(43_200);
pub const DEFAULT_RELIABILITY_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_AVAILABILITY_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_AVAILABILITY_TIMEOUT: Duration = Duration::from_millis(500);
