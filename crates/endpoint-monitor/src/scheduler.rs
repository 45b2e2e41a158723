use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// How often the loop looks for due jobs unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A unit of recurring work.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("job {0:?} needs an interval greater than zero")]
    ZeroInterval(String),
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
}

/// Point-in-time view of a scheduled job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub name: String,
    pub interval: Duration,
    pub next_run: Instant,
    pub last_run: Option<Instant>,
    pub state: JobState,
    /// Runs of this job currently executing; more than one when runs overlap
    pub in_flight: usize,
}

struct ScheduledJob {
    job: Arc<dyn Job>,
    interval: Duration,
    next_run: Instant,
    last_run: Option<Instant>,
    in_flight: Arc<AtomicUsize>,
}

/// Runs recurring jobs from a single coordinating loop.
///
/// Every tick dispatches each due job onto its own task and reschedules it
/// right away (`next_run = now + interval`), without waiting for the run to
/// finish. A job slower than its interval therefore overlaps with itself.
/// Errors and panics of a run are logged and never reach the loop.
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    poll_interval: Duration,
    run_all_first: bool,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new(poll_interval: Duration) -> Result<Self, SchedulerError> {
        if poll_interval.is_zero() {
            return Err(SchedulerError::ZeroPollInterval);
        }

        Ok(Self {
            jobs: Vec::new(),
            poll_interval,
            run_all_first: false,
            tracker: TaskTracker::new(),
        })
    }

    /// Also run every job once as soon as the loop starts.
    pub fn run_all_first(mut self, enabled: bool) -> Self {
        self.run_all_first = enabled;
        self
    }

    /// Schedule `job` every `interval`, first due one interval from now.
    pub fn every(&mut self, interval: Duration, job: Arc<dyn Job>) -> Result<(), SchedulerError> {
        self.every_starting(interval, job, Instant::now())
    }

    /// Schedule `job` every `interval`, measured from `start`.
    pub fn every_starting(
        &mut self,
        interval: Duration,
        job: Arc<dyn Job>,
        start: Instant,
    ) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval(job.name().to_owned()));
        }

        debug!(job = job.name(), ?interval, "scheduled job");
        self.jobs.push(ScheduledJob {
            job,
            interval,
            next_run: start + interval,
            last_run: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        self.jobs
            .iter()
            .map(|entry| {
                let in_flight = entry.in_flight.load(Ordering::SeqCst);
                JobInfo {
                    name: entry.job.name().to_owned(),
                    interval: entry.interval,
                    next_run: entry.next_run,
                    last_run: entry.last_run,
                    state: if in_flight > 0 { JobState::Running } else { JobState::Idle },
                    in_flight,
                }
            })
            .collect()
    }

    /// Tracks every dispatched run. Closed once [`Scheduler::run`] returns, so
    /// callers may `wait()` on it to drain in-flight work.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Dispatch every job whose next run is due at `now`. Returns how many were dispatched.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut dispatched = 0;
        for index in 0..self.jobs.len() {
            if self.jobs[index].next_run <= now {
                self.dispatch(index, now);
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Dispatch every job regardless of its schedule.
    pub fn dispatch_all(&mut self, now: Instant) -> usize {
        for index in 0..self.jobs.len() {
            self.dispatch(index, now);
        }
        self.jobs.len()
    }

    fn dispatch(&mut self, index: usize, now: Instant) {
        let entry = &mut self.jobs[index];
        let job = Arc::clone(&entry.job);
        let in_flight = Arc::clone(&entry.in_flight);

        in_flight.fetch_add(1, Ordering::SeqCst);
        self.tracker.spawn(async move {
            match AssertUnwindSafe(job.run()).catch_unwind().await {
                Ok(Ok(())) => debug!(job = job.name(), "job finished"),
                Ok(Err(e)) => error!(job = job.name(), "Scheduled job failed: {:#}", e),
                Err(_) => error!(job = job.name(), "Scheduled job panicked"),
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        entry.last_run = Some(now);
        entry.next_run = now + entry.interval;
    }

    /// Run the loop until `shutdown` is cancelled.
    ///
    /// Cancellation only stops further dispatches; runs already in flight are
    /// left to finish. The returned tracker is closed and can be awaited.
    pub async fn run(mut self, shutdown: CancellationToken) -> TaskTracker {
        info!(jobs = self.jobs.len(), poll_interval = ?self.poll_interval, "Starting scheduler");

        if self.run_all_first {
            let dispatched = self.dispatch_all(Instant::now());
            debug!(dispatched, "ran all jobs at startup");
        }

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, no further checks will be dispatched");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Instant::now());
                }
            }
        }

        self.tracker.close();
        self.tracker
    }
}
