#![warn(clippy::all)]

mod cli;
mod config;
mod report;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use endpoint_monitor::{
    AvailabilityMonitor, CheckExecutor, HttpFetcher, Layout, Registry, ReliabilityMonitor,
    ResultLog, Scheduler,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use cli::{AvailabilityArgs, Cli, Command, ReliabilityArgs};
use config::{Config, ModeConfig};

/// Scheduler and HTTP settings after applying CLI overrides to the config file.
struct Settings {
    poll_interval: Duration,
    run_all_first: bool,
    /// Unset waits for in-flight checks without bound
    shutdown_grace: Option<Duration>,
    config: Config,
}

impl Settings {
    fn resolve(cli: &Cli, config: Config) -> Result<Self> {
        let poll = cli.poll_interval.unwrap_or(config.scheduler.poll_interval_secs);
        let grace = cli.shutdown_grace.or(config.scheduler.shutdown_grace_secs);

        Ok(Self {
            poll_interval: config::positive("--poll-interval", poll)?,
            run_all_first: config.scheduler.run_all_first && !cli.no_run_all_first,
            shutdown_grace: grace
                .map(|grace| config::non_negative("--shutdown-grace", grace))
                .transpose()?,
            config,
        })
    }

    fn scheduler(&self) -> Result<Scheduler> {
        Ok(Scheduler::new(self.poll_interval)?.run_all_first(self.run_all_first))
    }

    /// Check interval and timeout of a mode.
    fn timing(
        &self,
        mode: &ModeConfig,
        check_interval: Option<f64>,
        timeout: Option<f64>,
    ) -> Result<(Duration, Duration)> {
        let interval = check_interval.unwrap_or(mode.check_interval_secs);
        let timeout = timeout.unwrap_or(mode.timeout_secs);
        Ok((config::positive("--check-interval", interval)?, config::positive("--timeout", timeout)?))
    }

    fn executor(&self, timeout: Duration) -> Result<Arc<CheckExecutor>> {
        let fetcher = HttpFetcher::new(&self.config.http.user_agent, self.config.http.max_redirects)
            .context("failed to build HTTP client")?;
        Ok(Arc::new(CheckExecutor::new(Arc::new(fetcher), timeout)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let config = Config::from_config(cli.config.as_ref()).context("failed to load configuration")?;
    debug!("{config}");
    let settings = Settings::resolve(&cli, config)?;

    match cli.command {
        Command::Reliability(args) => run_reliability(args, &settings).await,
        Command::Availability(args) => run_availability(args, &settings).await,
        Command::Report(args) => report::run(args).await,
    }
}

async fn run_reliability(args: ReliabilityArgs, settings: &Settings) -> Result<()> {
    let (interval, timeout) =
        settings.timing(&settings.config.reliability, args.check_interval, args.timeout)?;
    let endpoints = load_endpoints(&args.endpoints, Layout::Reliability)?;

    tokio::fs::create_dir_all(&args.output)
        .await
        .with_context(|| format!("failed to create output directory {}", args.output.display()))?;

    let monitor =
        ReliabilityMonitor::new(endpoints, &args.output, settings.executor(timeout)?, interval)
            .await
            .context("failed to open result stores")?;

    let mut scheduler = settings.scheduler()?;
    monitor.schedule(&mut scheduler)?;
    serve(scheduler, settings.shutdown_grace).await
}

async fn run_availability(args: AvailabilityArgs, settings: &Settings) -> Result<()> {
    let (interval, timeout) =
        settings.timing(&settings.config.availability, args.check_interval, args.timeout)?;
    let layout = Layout::Availability { url_column: args.url_column };
    let endpoints = load_endpoints(&args.endpoints, layout)?;

    if let Some(parent) = args.output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let log = Arc::new(ResultLog::new(&args.output));
    info!(log = %log.path().display(), "Appending availability results");
    let monitor = AvailabilityMonitor::new(endpoints, log, settings.executor(timeout)?, interval);

    let mut scheduler = settings.scheduler()?;
    monitor.schedule(&mut scheduler)?;
    serve(scheduler, settings.shutdown_grace).await
}

fn load_endpoints(path: &Path, layout: Layout) -> Result<Vec<endpoint_monitor::Endpoint>> {
    let registry = Registry::load(path, layout)
        .with_context(|| format!("failed to load endpoint list {}", path.display()))?;
    Ok(registry.into_endpoints())
}

/// Run the scheduler until a shutdown signal arrives, then wait for
/// in-flight checks. `grace` bounds the wait and a second signal cuts it short.
async fn serve(scheduler: Scheduler, grace: Option<Duration>) -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.cancel();
        }
    });

    let tracker = scheduler.run(shutdown).await;
    if !tracker.is_empty() {
        info!(
            in_flight = tracker.len(),
            ?grace,
            "Waiting for in-flight checks, signal again to stop now"
        );
    }
    match drain(&tracker, grace, wait_for_signal()).await {
        Drain::Finished => info!("Monitor stopped"),
        Drain::GraceElapsed => {
            warn!(in_flight = tracker.len(), "Shutdown grace elapsed, abandoning in-flight checks")
        }
        Drain::Forced => {
            warn!(in_flight = tracker.len(), "Forced shutdown, abandoning in-flight checks")
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Drain {
    Finished,
    GraceElapsed,
    Forced,
}

/// Wait for every task of a closed tracker, up to `grace` if set, or until
/// `force` resolves.
async fn drain(
    tracker: &TaskTracker,
    grace: Option<Duration>,
    force: impl Future<Output = ()>,
) -> Drain {
    let deadline = async {
        match grace {
            Some(grace) => tokio::time::sleep(grace).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = tracker.wait() => Drain::Finished,
        () = deadline => Drain::GraceElapsed,
        () = force => Drain::Forced,
    }
}

/// Resolves on Ctrl+C (or SIGTERM on unix). Never resolves if no signal can be watched.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                warn!("Failed to listen for SIGTERM: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down monitor."),
        _ = terminate => info!("SIGTERM received, shutting down monitor."),
    }
}
