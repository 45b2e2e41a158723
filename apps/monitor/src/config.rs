use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use endpoint_monitor::DEFAULT_USER_AGENT;
use endpoint_monitor::monitor::{
    DEFAULT_AVAILABILITY_INTERVAL, DEFAULT_AVAILABILITY_TIMEOUT, DEFAULT_RELIABILITY_INTERVAL,
    DEFAULT_RELIABILITY_TIMEOUT,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    ParseFailed {
        path: path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
    #[error("{field} must be a positive number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub http: HttpConfig,
    pub reliability: ModeConfig,
    pub availability: ModeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: f64,
    pub run_all_first: bool,
    /// Upper bound on waiting for in-flight checks on shutdown. Unset waits
    /// until they finish.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub max_redirects: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub check_interval_secs: f64,
    pub timeout_secs: f64,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().is_none_or(|ext| ext != "toml") {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/inspire-monitor/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("inspire-monitor/config.toml"))
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 1.0, run_all_first: true, shutdown_grace_secs: None }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { user_agent: DEFAULT_USER_AGENT.into(), max_redirects: 10 }
    }
}

impl ModeConfig {
    fn reliability() -> Self {
        Self {
            check_interval_secs: DEFAULT_RELIABILITY_INTERVAL.as_secs_f64(),
            timeout_secs: DEFAULT_RELIABILITY_TIMEOUT.as_secs_f64(),
        }
    }

    fn availability() -> Self {
        Self {
            check_interval_secs: DEFAULT_AVAILABILITY_INTERVAL.as_secs_f64(),
            timeout_secs: DEFAULT_AVAILABILITY_TIMEOUT.as_secs_f64(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            http: HttpConfig::default(),
            reliability: ModeConfig::reliability(),
            availability: ModeConfig::availability(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Monitor Configuration:")?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Poll Interval (s)", &self.scheduler.poll_interval_secs)?;
        write_1(f, "Run All First", &self.scheduler.run_all_first)?;
        match self.scheduler.shutdown_grace_secs {
            Some(grace) => write_1(f, "Shutdown Grace (s)", &grace)?,
            None => write_1(f, "Shutdown Grace (s)", &"unbounded")?,
        }
        write_title_1(f, "HTTP")?;
        write_1(f, "User Agent", &self.http.user_agent)?;
        write_1(f, "Max Redirects", &self.http.max_redirects)?;
        for (title, mode) in [("Reliability", &self.reliability), ("Availability", &self.availability)] {
            write_title_1(f, title)?;
            write_1(f, "Check Interval (s)", &mode.check_interval_secs)?;
            write_1(f, "Timeout (s)", &mode.timeout_secs)?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/inspire-monitor/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| Error::ParseFailed { path: config_path.clone(), source })?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;
        let write_failed = |source| Error::WriteFailed { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }

    pub fn validate(&self) -> Result<(), Error> {
        positive("scheduler.poll_interval_secs", self.scheduler.poll_interval_secs)?;
        if let Some(grace) = self.scheduler.shutdown_grace_secs {
            non_negative("scheduler.shutdown_grace_secs", grace)?;
        }
        positive("reliability.check_interval_secs", self.reliability.check_interval_secs)?;
        positive("reliability.timeout_secs", self.reliability.timeout_secs)?;
        positive("availability.check_interval_secs", self.availability.check_interval_secs)?;
        positive("availability.timeout_secs", self.availability.timeout_secs)?;
        Ok(())
    }
}

/// A strictly positive number of seconds.
pub fn positive(field: &'static str, value: f64) -> Result<Duration, Error> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(Error::InvalidDuration { field, value }),
    }
}

pub fn non_negative(field: &'static str, value: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(value).map_err(|_| Error::InvalidDuration { field, value })
}
