use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, LAST_MODIFIED};
use thiserror::Error;
use url::Url;

use super::types::ResponseMeta;

/// How much of the response a probe needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Stop once the headers are in, the body is never downloaded
    HeadersOnly,
    FullBody,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub content_disposition: Option<String>,
    pub elapsed: Duration,
    pub body: Option<Vec<u8>>,
}

impl FetchedResponse {
    pub fn meta(&self) -> ResponseMeta {
        ResponseMeta {
            status_code: self.status,
            content_length: self.content_length,
            content_type: self.content_type.clone(),
            duration: self.elapsed,
            last_modified: self.last_modified.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connection(String),
}

/// HTTP GET capability used by the check executor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
        mode: FetchMode,
    ) -> Result<FetchedResponse, FetchError>;
}

/// `reqwest` backed fetcher. Redirects are followed up to the configured limit.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, max_redirects: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
        mode: FetchMode,
    ) -> Result<FetchedResponse, FetchError> {
        let start = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let elapsed = start.elapsed();
        let headers = response.headers();
        let mut fetched = FetchedResponse {
            status: response.status().as_u16(),
            content_length: header(headers, CONTENT_LENGTH.as_str())
                .and_then(|value| value.trim().parse().ok()),
            content_type: header(headers, CONTENT_TYPE.as_str()),
            last_modified: header(headers, LAST_MODIFIED.as_str()),
            content_disposition: header(headers, CONTENT_DISPOSITION.as_str()),
            elapsed,
            body: None,
        };

        // Dropping the response in headers-only mode severs the connection
        if mode == FetchMode::FullBody {
            let body = response.bytes().await.map_err(|e| classify(e, timeout))?;
            fetched.body = Some(body.to_vec());
        }

        Ok(fetched)
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn classify(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Connection(error.to_string())
    }
}
