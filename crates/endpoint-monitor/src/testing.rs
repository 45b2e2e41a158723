//! A scripted [`Fetcher`] for tests; never touches the network.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::checks::{FetchError, FetchMode, FetchedResponse, Fetcher};

/// Answers each fetch with the next scripted result. Once the script runs out
/// every further fetch fails with a connection error.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<FetchedResponse, FetchError>>>,
    modes: Mutex<Vec<FetchMode>>,
    delay: Duration,
}

impl ScriptedFetcher {
    pub fn new(script: impl IntoIterator<Item = Result<FetchedResponse, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    /// A script of `200 OK` responses carrying the given bodies.
    pub fn bodies<B: AsRef<[u8]>>(bodies: impl IntoIterator<Item = B>) -> Self {
        Self::new(bodies.into_iter().map(|body| Ok(ok(body.as_ref()))))
    }

    /// Delay every answer, to simulate slow servers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The mode of every fetch so far, in call order.
    pub fn modes(&self) -> Vec<FetchMode> {
        self.modes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls(&self) -> usize {
        self.modes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A `200 OK` response with the given body.
pub fn ok(body: &[u8]) -> FetchedResponse {
    FetchedResponse {
        status: 200,
        content_length: Some(body.len() as u64),
        body: Some(body.to_vec()),
        ..Default::default()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _url: &Url,
        _timeout: Duration,
        mode: FetchMode,
    ) -> Result<FetchedResponse, FetchError> {
        self.modes.lock().unwrap_or_else(PoisonError::into_inner).push(mode);
        let next = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        next.unwrap_or_else(|| Err(FetchError::Connection("script exhausted".into())))
    }
}
