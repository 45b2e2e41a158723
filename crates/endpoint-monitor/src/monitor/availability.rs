use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::checks::CheckExecutor;
use crate::registry::Endpoint;
use crate::results::{AvailabilityRecord, ResultLog};
use crate::scheduler::{Job, Scheduler, SchedulerError};

/// Probes one endpoint's headers and appends the outcome to the shared log.
pub struct AvailabilityJob {
    name: String,
    endpoint: Endpoint,
    executor: Arc<CheckExecutor>,
    log: Arc<ResultLog>,
}

impl AvailabilityJob {
    pub fn new(endpoint: Endpoint, executor: Arc<CheckExecutor>, log: Arc<ResultLog>) -> Self {
        Self {
            name: format!("availability {endpoint}"),
            endpoint,
            executor,
            log,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn check(&self) -> anyhow::Result<AvailabilityRecord> {
        info!(endpoint = %self.endpoint, "Checking");
        let probe = self.executor.probe_headers(&self.endpoint).await;
        let record = AvailabilityRecord::from_probe(self.endpoint.id(), &probe);

        self.log
            .append(&record)
            .await
            .with_context(|| format!("failed to log availability of {}", self.endpoint.url()))?;
        Ok(record)
    }
}

#[async_trait]
impl Job for AvailabilityJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.check().await.map(drop)
    }
}

/// Availability jobs for a whole endpoint list, all writing to one log.
pub struct AvailabilityMonitor {
    jobs: Vec<Arc<AvailabilityJob>>,
    interval: Duration,
}

impl AvailabilityMonitor {
    pub fn new(
        endpoints: Vec<Endpoint>,
        log: Arc<ResultLog>,
        executor: Arc<CheckExecutor>,
        interval: Duration,
    ) -> Self {
        let jobs = endpoints
            .into_iter()
            .map(|endpoint| {
                Arc::new(AvailabilityJob::new(endpoint, Arc::clone(&executor), Arc::clone(&log)))
            })
            .collect();

        Self { jobs, interval }
    }

    pub fn jobs(&self) -> &[Arc<AvailabilityJob>] {
        &self.jobs
    }

    pub fn schedule(&self, scheduler: &mut Scheduler) -> Result<(), SchedulerError> {
        for job in &self.jobs {
            info!(endpoint = %job.endpoint(), interval = ?self.interval, "Scheduling availability check");
            scheduler.every(self.interval, Arc::clone(job) as Arc<dyn Job>)?;
        }
        Ok(())
    }
}
