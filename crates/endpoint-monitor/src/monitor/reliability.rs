use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::checks::CheckExecutor;
use crate::detector::{ChangeDetector, Detection};
use crate::registry::Endpoint;
use crate::scheduler::{Job, Scheduler, SchedulerError};
use crate::store::{EndpointStore, StoreError};

/// Downloads one endpoint's content and feeds it to its change detector.
pub struct ReliabilityJob {
    name: String,
    endpoint: Endpoint,
    executor: Arc<CheckExecutor>,
    detector: ChangeDetector,
}

impl ReliabilityJob {
    pub fn new(endpoint: Endpoint, executor: Arc<CheckExecutor>, store: Arc<EndpointStore>) -> Self {
        Self {
            name: format!("reliability {endpoint}"),
            endpoint,
            executor,
            detector: ChangeDetector::new(store),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn store(&self) -> &Arc<EndpointStore> {
        self.detector.store()
    }

    /// Probe once and record the result.
    pub async fn check(&self) -> anyhow::Result<Detection> {
        info!(endpoint = %self.endpoint, "Checking");
        let probe = self.executor.execute(&self.endpoint).await;

        let detection = self
            .detector
            .process(probe)
            .await
            .with_context(|| format!("failed to record check of {}", self.endpoint.url()))?;

        debug!(endpoint = %self.endpoint, ?detection, "check recorded");
        Ok(detection)
    }
}

#[async_trait]
impl Job for ReliabilityJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.check().await.map(drop)
    }
}

/// Reliability jobs for a whole endpoint list.
pub struct ReliabilityMonitor {
    jobs: Vec<Arc<ReliabilityJob>>,
    interval: Duration,
}

impl ReliabilityMonitor {
    /// Open (or create) the result store of every endpoint under `output_dir`.
    pub async fn new(
        endpoints: Vec<Endpoint>,
        output_dir: &Path,
        executor: Arc<CheckExecutor>,
        interval: Duration,
    ) -> Result<Self, StoreError> {
        let mut jobs = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let store = Arc::new(EndpointStore::create(output_dir, &endpoint).await?);
            jobs.push(Arc::new(ReliabilityJob::new(endpoint, Arc::clone(&executor), store)));
        }

        Ok(Self { jobs, interval })
    }

    pub fn jobs(&self) -> &[Arc<ReliabilityJob>] {
        &self.jobs
    }

    pub fn schedule(&self, scheduler: &mut Scheduler) -> Result<(), SchedulerError> {
        for job in &self.jobs {
            info!(endpoint = %job.endpoint(), interval = ?self.interval, "Scheduling reliability check");
            scheduler.every(self.interval, Arc::clone(job) as Arc<dyn Job>)?;
        }
        Ok(())
    }
}
