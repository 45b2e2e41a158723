use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "inspire-monitor", version, about = "Monitor INSPIRE download services")]
pub struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(long, global = true, env = "INSPIRE_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Seconds between scheduler ticks [config: scheduler.poll_interval_secs]
    #[arg(long, global = true, env = "INSPIRE_MONITOR_POLL_INTERVAL")]
    pub poll_interval: Option<f64>,

    /// Upper bound in seconds on waiting for in-flight checks after a shutdown
    /// signal; unset waits until they finish [config: scheduler.shutdown_grace_secs]
    #[arg(long, global = true, env = "INSPIRE_MONITOR_SHUTDOWN_GRACE")]
    pub shutdown_grace: Option<f64>,

    /// Do not check every endpoint once at startup
    #[arg(long, global = true, env = "INSPIRE_MONITOR_NO_RUN_ALL_FIRST")]
    pub no_run_all_first: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Track content changes of service endpoints
    Reliability(ReliabilityArgs),
    /// Record header-level availability of service endpoints
    Availability(AvailabilityArgs),
    /// Summarise an availability result log
    Report(ReportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReliabilityArgs {
    /// Tab-separated list of `country_code`, `service_type`, `url`
    #[arg(long, env = "INSPIRE_MONITOR_ENDPOINTS")]
    pub endpoints: PathBuf,

    /// Root directory of the per-endpoint result stores
    #[arg(long, env = "INSPIRE_MONITOR_OUTPUT")]
    pub output: PathBuf,

    /// Seconds between checks of one endpoint
    #[arg(long, env = "INSPIRE_MONITOR_CHECK_INTERVAL")]
    pub check_interval: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, env = "INSPIRE_MONITOR_TIMEOUT")]
    pub timeout: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct AvailabilityArgs {
    /// Tab-separated endpoint list
    #[arg(long, env = "INSPIRE_MONITOR_ENDPOINTS")]
    pub endpoints: PathBuf,

    /// Result log the checks are appended to
    #[arg(long, env = "INSPIRE_MONITOR_OUTPUT")]
    pub output: PathBuf,

    /// Zero-based column holding the URL
    #[arg(long, env = "INSPIRE_MONITOR_URL_COLUMN", default_value_t = 0)]
    pub url_column: usize,

    /// Seconds between checks of one endpoint
    #[arg(long, env = "INSPIRE_MONITOR_CHECK_INTERVAL")]
    pub check_interval: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, env = "INSPIRE_MONITOR_TIMEOUT")]
    pub timeout: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// The three-column endpoint list the availability monitor ran with
    #[arg(long, env = "INSPIRE_MONITOR_ENDPOINTS")]
    pub endpoints: PathBuf,

    /// Availability result log
    #[arg(long, env = "INSPIRE_MONITOR_RESULTS")]
    pub results: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_reliability_flags() {
        let cli = Cli::try_parse_from([
            "inspire-monitor",
            "-vv",
            "reliability",
            "--endpoints",
            "endpoints.tsv",
            "--output",
            "out",
            "--check-interval",
            "3600",
            "--no-run-all-first",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert!(cli.no_run_all_first);
        let Command::Reliability(args) = cli.command else {
            panic!("expected the reliability subcommand");
        };
        assert_eq!(args.endpoints, PathBuf::from("endpoints.tsv"));
        assert_eq!(args.check_interval, Some(3600.0));
        assert_eq!(args.timeout, None);
    }

    #[test]
    fn test_availability_defaults_to_first_column() {
        let cli = Cli::try_parse_from([
            "inspire-monitor",
            "availability",
            "--endpoints",
            "urls.tsv",
            "--output",
            "results.tsv",
            "--timeout",
            "0.5",
        ])
        .unwrap();

        let Command::Availability(args) = cli.command else {
            panic!("expected the availability subcommand");
        };
        assert_eq!(args.url_column, 0);
        assert_eq!(args.timeout, Some(0.5));
    }

    #[test]
    fn test_endpoints_are_required() {
        assert!(Cli::try_parse_from(["inspire-monitor", "report", "--results", "r.tsv"]).is_err());
    }
}
