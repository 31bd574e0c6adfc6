use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::protocol::Snapshot;
use url::Url;

/// Optional mirror of the board snapshot. Nothing local ever waits on it.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// `Ok(None)` when the remote holds nothing yet.
    async fn fetch(&self) -> Result<Option<Snapshot>>;

    async fn push(&self, snapshot: &Snapshot) -> Result<()>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Local-only mode.
pub struct NoRemote;

#[async_trait]
impl RemoteSync for NoRemote {
    async fn fetch(&self) -> Result<Option<Snapshot>> {
        Ok(None)
    }

    async fn push(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Upper bound on a single remote request unless overridden.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// `GET` and `POST` of the snapshot JSON against a single endpoint. Each
/// request gives up after `timeout`.
pub struct HttpRemote {
    http: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpRemote {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RemoteSync for HttpRemote {
    async fn fetch(&self) -> Result<Option<Snapshot>> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("remote fetch from {} failed", self.endpoint))?;

        if matches!(
            response.status(),
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND
        ) {
            return Ok(None);
        }

        let body = response.error_for_status()?.text().await?;
        let body = body.trim();
        if body.is_empty() || body == "null" {
            return Ok(None);
        }
        let snapshot = serde_json::from_str(body).context("remote snapshot is malformed")?;
        Ok(Some(snapshot))
    }

    async fn push(&self, snapshot: &Snapshot) -> Result<()> {
        self.http
            .post(self.endpoint.clone())
            .json(snapshot)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("remote push to {} failed", self.endpoint))?
            .error_for_status()?;
        Ok(())
    }
}
