//! Remote state fetcher.
//!
//! Every operation is built on [`HttpStatusSource::get_json`], so they all
//! share one timeout and one notion of failure. Failures never reach the
//! caller as errors: an unreachable endpoint is routine and is reported as
//! `None`, `false` or an empty list.
use std::future::Future;
use std::time::Duration;

use kink_proto::protocol::{station_ids, PlaybackStatus};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("malformed body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Source of now-playing data for the poll loop.
pub trait StatusSource: Send + Sync + 'static {
    /// True iff the endpoint answers HTTP 200 within `timeout`.
    fn is_reachable(&self, endpoint: &str, timeout: Duration)
        -> impl Future<Output = bool> + Send;

    /// Now-playing fields for `station`, or `None` when unavailable.
    fn fetch_status(
        &self,
        endpoint: &str,
        station: &str,
        timeout: Duration,
    ) -> impl Future<Output = Option<PlaybackStatus>> + Send;

    /// Known station ids, sorted. Empty when unavailable.
    fn list_stations(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> impl Future<Output = Vec<String>> + Send;

    /// Raw album art bytes.
    fn fetch_art(&self, url: &str, timeout: Duration)
        -> impl Future<Output = Option<Vec<u8>>> + Send;
}

#[derive(Clone)]
pub struct HttpStatusSource {
    client: Client,
}

impl HttpStatusSource {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("kink-playing/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn get_ok(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status(resp.status()));
        }
        Ok(resp)
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        let body = self.get_ok(url, timeout).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl StatusSource for HttpStatusSource {
    async fn is_reachable(&self, endpoint: &str, timeout: Duration) -> bool {
        match self.get_ok(endpoint, timeout).await {
            Ok(_) => true,
            Err(e) => {
                debug!("[fetch] {} unreachable: {}", endpoint, e);
                false
            }
        }
    }

    async fn fetch_status(
        &self,
        endpoint: &str,
        station: &str,
        timeout: Duration,
    ) -> Option<PlaybackStatus> {
        match self.get_json(endpoint, timeout).await {
            Ok(doc) => Some(PlaybackStatus::from_document(&doc, station)),
            Err(e) => {
                debug!("[fetch] status for {} unavailable: {}", station, e);
                None
            }
        }
    }

    async fn list_stations(&self, endpoint: &str, timeout: Duration) -> Vec<String> {
        match self.get_json(endpoint, timeout).await {
            Ok(doc) => station_ids(&doc),
            Err(e) => {
                debug!("[fetch] station list unavailable: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_art(&self, url: &str, timeout: Duration) -> Option<Vec<u8>> {
        let result = async {
            let body = self.get_ok(url, timeout).await?.bytes().await?;
            Ok::<_, FetchError>(body.to_vec())
        }
        .await;
        match result {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("[fetch] album art {} unavailable: {}", url, e);
                None
            }
        }
    }
}
