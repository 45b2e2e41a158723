//! Endpoint registry.
//!
//! Loads the monitored targets from a tab-delimited list without a header.
//! Reliability lists carry `country_code \t service_type \t url`, availability
//! lists only need the URL column. Lines starting with `#` and blank lines are
//! ignored; rows that fail validation are skipped with a warning.

mod countries;

use std::fmt;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

pub use countries::is_recognized_country;

/// Why a single endpoint could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("unrecognized country code {0:?}")]
    UnknownCountry(String),
    #[error("empty service type")]
    EmptyServiceType,
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A rejected configuration row. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("line {line}: expected {expected} columns, found {found}")]
    MalformedRow { line: usize, expected: usize, found: usize },
    #[error("line {line}: {source}")]
    InvalidEndpoint {
        line: usize,
        #[source]
        source: EndpointError,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read endpoint list {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no endpoints to monitor in {0}")]
    NoEndpoints(String),
}

/// Column layout of an endpoint list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `country_code \t service_type \t url`
    Reliability,
    /// URL read from the given zero-based column, other columns ignored.
    Availability { url_column: usize },
}

/// A monitored target. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    id: usize,
    country_code: Option<String>,
    service_type: Option<String>,
    url: Url,
    storage_key: String,
}

impl Endpoint {
    /// A service endpoint of a member state, as monitored for reliability.
    pub fn service(
        id: usize,
        country_code: &str,
        service_type: &str,
        url: &str,
    ) -> Result<Self, EndpointError> {
        let country_code = country_code.trim().to_ascii_uppercase();
        if !is_recognized_country(&country_code) {
            return Err(EndpointError::UnknownCountry(country_code));
        }

        let service_type = service_type.trim();
        if service_type.is_empty() {
            return Err(EndpointError::EmptyServiceType);
        }

        Ok(Self {
            id,
            country_code: Some(country_code),
            service_type: Some(service_type.to_owned()),
            url: parse_url(url)?,
            storage_key: mint_storage_key(),
        })
    }

    /// A bare URL, as monitored for availability.
    pub fn url_only(id: usize, url: &str) -> Result<Self, EndpointError> {
        Ok(Self {
            id,
            country_code: None,
            service_type: None,
            url: parse_url(url)?,
            storage_key: mint_storage_key(),
        })
    }

    /// Ordinal of the endpoint's row among the data rows of its list.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    pub fn service_type(&self) -> Option<&str> {
        self.service_type.as_deref()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Directory name of the endpoint's result store, unique per load.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.country_code, &self.service_type) {
            (Some(country), Some(service)) => write!(f, "[{country}/{service}] {}", self.url),
            _ => write!(f, "{}", self.url),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, EndpointError> {
    let raw = raw.trim();
    let invalid = |reason: String| EndpointError::InvalidUrl { url: raw.to_owned(), reason };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

fn mint_storage_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The endpoints accepted from one list, plus the rows that were rejected.
#[derive(Debug, Default)]
pub struct Registry {
    endpoints: Vec<Endpoint>,
    rejected: Vec<ConfigError>,
}

impl Registry {
    /// Load an endpoint list from disk.
    pub fn load(path: impl AsRef<Path>, layout: Layout) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let source = std::fs::read_to_string(path)
            .map_err(|source| RegistryError::Read { path: origin.clone(), source })?;
        Self::parse(&source, layout, &origin)
    }

    /// Parse an endpoint list. `origin` only shows up in log lines and errors.
    pub fn parse(source: &str, layout: Layout, origin: &str) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        let data_rows = source
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'));

        for (ordinal, (line, row)) in data_rows.enumerate() {
            match parse_row(ordinal, line, row, layout) {
                Ok(endpoint) => registry.endpoints.push(endpoint),
                Err(error) => {
                    warn!(source = origin, %error, "skipping endpoint row");
                    registry.rejected.push(error);
                }
            }
        }

        if registry.endpoints.is_empty() {
            return Err(RegistryError::NoEndpoints(origin.to_owned()));
        }

        info!(
            source = origin,
            accepted = registry.endpoints.len(),
            rejected = registry.rejected.len(),
            "loaded endpoint list"
        );
        Ok(registry)
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn rejected(&self) -> &[ConfigError] {
        &self.rejected
    }

    pub fn into_endpoints(self) -> Vec<Endpoint> {
        self.endpoints
    }
}

fn parse_row(ordinal: usize, line: usize, row: &str, layout: Layout) -> Result<Endpoint, ConfigError> {
    let columns: Vec<&str> = row.split('\t').collect();
    let invalid = |source| ConfigError::InvalidEndpoint { line, source };

    match layout {
        Layout::Reliability => match columns.as_slice() {
            [country, service, url] => Endpoint::service(ordinal, country, service, url).map_err(invalid),
            _ => Err(ConfigError::MalformedRow { line, expected: 3, found: columns.len() }),
        },
        Layout::Availability { url_column } => match columns.get(url_column) {
            Some(url) => Endpoint::url_only(ordinal, url).map_err(invalid),
            None => Err(ConfigError::MalformedRow {
                line,
                expected: url_column + 1,
                found: columns.len(),
            }),
        },
    }
}
