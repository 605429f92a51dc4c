//! Candidate sources: the remote profile feed and the local decision cache.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use deck::{CandidateSource, DecisionStore};
use reqwest::Client;
use shared::{
    domain::{Candidate, PersistedDecision},
    error::FetchError,
    protocol::FeedResponse,
};
use tracing::{info, warn};
use url::Url;

pub struct HttpCandidateSource {
    http: Client,
    feed_url: Url,
}

impl HttpCandidateSource {
    pub fn new(feed_url: &str, timeout: Duration) -> Result<Self> {
        let feed_url =
            Url::parse(feed_url).with_context(|| format!("invalid candidate feed url '{feed_url}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, feed_url })
    }

    pub fn feed_url(&self) -> &Url {
        &self.feed_url
    }

    fn request_url(&self, count: usize) -> Url {
        let mut url = self.feed_url.clone();
        url.query_pairs_mut()
            .append_pair("results", &count.to_string());
        url
    }
}

fn map_transport_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_decode() {
        FetchError::Decode(error.to_string())
    } else if let Some(status) = error.status() {
        FetchError::Status {
            status: status.as_u16(),
        }
    } else {
        FetchError::Transport(error.to_string())
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    async fn fetch(&self, count: usize) -> std::result::Result<Vec<Candidate>, FetchError> {
        let url = self.request_url(count);
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "feed: non-success response");
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body: FeedResponse = response
            .json()
            .await
            .map_err(|error| FetchError::Decode(error.to_string()))?;
        let mut candidates = body.into_candidates();
        candidates.truncate(count);
        info!(%url, candidates = candidates.len(), "feed: fetched candidate batch");
        Ok(candidates)
    }
}

/// Serves the display snapshots kept alongside persisted decisions, so a
/// session can run without the network.
pub struct CachedCandidateSource {
    store: Arc<dyn DecisionStore>,
}

impl CachedCandidateSource {
    pub fn new(store: Arc<dyn DecisionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CandidateSource for CachedCandidateSource {
    async fn fetch(&self, count: usize) -> std::result::Result<Vec<Candidate>, FetchError> {
        let records = self
            .store
            .load_all()
            .await
            .map_err(|error| FetchError::Other(format!("decision cache unavailable: {error:#}")))?;
        cached_batch(&records, count)
    }

    fn is_authoritative(&self) -> bool {
        false
    }
}

/// Rebuilds candidates from stored records, in stored order, until `count`
/// undecided ones have been collected. Decided records along the way are
/// kept for history views.
pub fn cached_batch(
    records: &[PersistedDecision],
    count: usize,
) -> std::result::Result<Vec<Candidate>, FetchError> {
    let mut undecided = 0;
    let mut batch = Vec::new();
    for record in records {
        if undecided >= count {
            break;
        }
        if !record.decision.is_terminal() {
            undecided += 1;
        }
        batch.push(record.to_candidate());
    }

    if undecided == 0 {
        return Err(FetchError::EmptyCache);
    }
    info!(candidates = batch.len(), undecided, "cache: serving cached candidate batch");
    Ok(batch)
}

#[cfg(test)]
#[path = "tests/source_tests.rs"]
mod tests;
