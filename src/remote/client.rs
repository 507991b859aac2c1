//! Remote status client: asks the management server what this device's
//! policy currently is.
//!
//! One request per call, no retries here: the scheduler owns retry/backoff.
//! A failed fetch never touches the store.

use crate::remote::protocol::{RemoteStatus, StatusRequest};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can arise from a status fetch.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The request never produced a response (DNS, connect, timeout...).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The server answered with a non-success status code.
    #[error("server returned HTTP {0}")]
    Status(u16),
    /// The body was not a JSON object.
    #[error("malformed status payload: {0}")]
    Malformed(String),
}

/// A fetched status plus the raw body it was decoded from.
#[derive(Debug, Clone)]
pub struct FetchedStatus {
    pub status: RemoteStatus,
    pub raw: String,
}

/// Anything that can report the server-side policy for a device.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, device_id: &str) -> Result<FetchedStatus, RemoteError>;
}

/// HTTP client for the status endpoint.
pub struct HttpStatusClient {
    status_url: String,
    client: reqwest::Client,
}

impl HttpStatusClient {
    /// Create a client posting to `status_url` with a per-request timeout.
    pub fn new(status_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lockwarden/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            status_url: status_url.into(),
            client,
        })
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }
}

#[async_trait]
impl StatusSource for HttpStatusClient {
    async fn fetch_status(&self, device_id: &str) -> Result<FetchedStatus, RemoteError> {
        let body = StatusRequest {
            device_id: device_id.to_string(),
        };

        let response = self.client.post(&self.status_url).json(&body).send().await?;

        let code = response.status();
        if !code.is_success() {
            return Err(RemoteError::Status(code.as_u16()));
        }

        let raw = response.text().await?;
        let status =
            RemoteStatus::from_json(&raw).map_err(|e| RemoteError::Malformed(e.to_string()))?;

        tracing::debug!(device_id, "fetched remote status");
        Ok(FetchedStatus { status, raw })
    }
}
