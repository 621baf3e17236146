//! Fetching published calendar documents.

use std::future::Future;
use std::time::Duration;

use crate::constants::{DEFAULT_FETCH_TIMEOUT_SECS, USER_AGENT};
use crate::error::{CalFeedError, CalFeedResult};
use crate::source::ExternalSource;

/// Retrieves the raw calendar document for an external source.
pub trait FeedFetcher: Sync {
    fn fetch(&self, source: &ExternalSource) -> impl Future<Output = CalFeedResult<String>> + Send;
}

/// Plain HTTP GET fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> CalFeedResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| CalFeedError::Config(format!("Could not build HTTP client: {e}")))?;
        Ok(HttpFetcher { http })
    }

    pub fn with_defaults() -> CalFeedResult<Self> {
        Self::new(USER_AGENT, Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }
}

impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, source: &ExternalSource) -> CalFeedResult<String> {
        let url = source.fetch_url();
        tracing::debug!(source = %source.name, %url, "Fetching feed");

        let fetch_error = |e: reqwest::Error| CalFeedError::Fetch {
            source_name: source.name.clone(),
            message: e.to_string(),
        };

        let response = self.http.get(&url).send().await.map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CalFeedError::HttpStatus {
                source_name: source.name.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(fetch_error)?;
        if body.trim().is_empty() {
            return Err(CalFeedError::EmptyFeed(source.name.clone()));
        }

        tracing::debug!(source = %source.name, bytes = body.len(), "Fetched feed");
        Ok(body)
    }
}
