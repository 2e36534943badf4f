//! REST implementation of [`RemoteEndpoint`].
//!
//! `POST {base}/{collection}`, `PUT {base}/{collection}/{id}` and
//! `DELETE {base}/{collection}/{id}` with the entity payload as JSON.
//! A delete answered with 404 counts as done: the record is already gone.

use super::{RemoteEndpoint, RemoteError};
use async_trait::async_trait;
use cultura_sync_types::EntityKind;
use std::time::Duration;

/// REST client for the remote sync endpoint.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRemote {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RemoteError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got {:?}",
                base_url
            )));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.to_string(),
            http,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the URL for a collection.
    pub fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.base_url, kind.collection().name())
    }

    /// Build the URL for a single record.
    pub fn record_url(&self, kind: EntityKind, id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), id)
    }

    async fn check(
        response: Result<reqwest::Response, reqwest::Error>,
        missing_ok: bool,
    ) -> Result<(), RemoteError> {
        let response = response.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else if e.is_connect() {
                RemoteError::Unavailable(e.to_string())
            } else {
                RemoteError::Http(e)
            }
        })?;

        let status = response.status();
        if missing_ok && status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("Record already absent remotely");
            return Ok(());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemote {
    async fn create(&self, kind: EntityKind, payload: &serde_json::Value) -> Result<(), RemoteError> {
        let url = self.collection_url(kind);
        tracing::debug!("POST {}", url);
        Self::check(self.http.post(&url).json(payload).send().await, false).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        let url = self.record_url(kind, id);
        tracing::debug!("PUT {}", url);
        Self::check(self.http.put(&url).json(payload).send().await, false).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
        let url = self.record_url(kind, id);
        tracing::debug!("DELETE {}", url);
        Self::check(self.http.delete(&url).send().await, true).await
    }
}
