//! Mock remote endpoint for testing.
//!
//! Captures every call, fails on demand and can hold calls in flight until
//! released, which lets tests observe a drain while it is running.

use super::{RemoteEndpoint, RemoteError};
use async_trait::async_trait;
use cultura_sync_types::{EntityKind, SyncOperation};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// One call received by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Operation requested.
    pub operation: SyncOperation,
    /// Entity kind.
    pub kind: EntityKind,
    /// Record id (update and delete only).
    pub id: Option<String>,
    /// Payload (create and update only).
    pub payload: Option<serde_json::Value>,
}

/// Mock remote endpoint for testing.
///
/// Clones share state, so a test can keep one handle while the queue
/// manager owns another.
#[derive(Debug, Clone)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
    /// `true` while calls may proceed.
    gate: Arc<watch::Sender<bool>>,
    /// Number of calls that have entered the endpoint.
    started: Arc<watch::Sender<usize>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    calls: Vec<MockCall>,
    fail_next: usize,
    fail_always: bool,
    reject_next: Option<u16>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            gate: Arc::new(watch::channel(true).0),
            started: Arc::new(watch::channel(0).0),
        }
    }
}

impl MockRemote {
    /// Create a new mock remote that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all calls that completed (successfully or not).
    pub fn calls(&self) -> Vec<MockCall> {
        let inner = self.inner.lock().unwrap();
        inner.calls.clone()
    }

    /// Cause the next `n` calls to fail.
    pub fn fail_next(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next = n;
    }

    /// Make every call fail until turned off again.
    pub fn fail_always(&self, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_always = fail;
    }

    /// Answer the next call with a non-success `status`.
    pub fn reject_next(&self, status: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.reject_next = Some(status);
    }

    /// Block calls at entry until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held and future calls proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Number of calls that have entered the endpoint so far.
    pub fn calls_started(&self) -> usize {
        *self.started.borrow()
    }

    /// Wait until at least `n` calls have entered the endpoint.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut started = self.started.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = started.wait_for(|count| *count >= n).await;
    }

    /// Clear all state (calls, failures) and open the gate.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockRemoteInner::default();
        self.gate.send_replace(true);
    }

    async fn call(&self, call: MockCall) -> Result<(), RemoteError> {
        self.started.send_modify(|count| *count += 1);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let mut inner = self.inner.lock().unwrap();
        let fail = if inner.fail_always {
            true
        } else if inner.fail_next > 0 {
            inner.fail_next -= 1;
            true
        } else {
            false
        };

        let rejected = inner.reject_next.take();

        let description = format!("{} {}", call.operation, call.kind);
        inner.calls.push(call);

        if let Some(status) = rejected {
            Err(RemoteError::Rejected {
                status,
                message: format!("mock rejection: {}", description),
            })
        } else if fail {
            Err(RemoteError::Unavailable(format!("mock failure: {}", description)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteEndpoint for MockRemote {
    async fn create(&self, kind: EntityKind, payload: &serde_json::Value) -> Result<(), RemoteError> {
        self.call(MockCall {
            operation: SyncOperation::Create,
            kind,
            id: None,
            payload: Some(payload.clone()),
        })
        .await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        self.call(MockCall {
            operation: SyncOperation::Update,
            kind,
            id: Some(id.to_string()),
            payload: Some(payload.clone()),
        })
        .await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
        self.call(MockCall {
            operation: SyncOperation::Delete,
            kind,
            id: Some(id.to_string()),
            payload: None,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn mock_remote_captures_calls() {
        let remote = MockRemote::new();

        remote.create(EntityKind::Event, &json!({ "id": "e1" })).await.unwrap();
        remote.delete(EntityKind::Task, "t1").await.unwrap();

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].operation, SyncOperation::Create);
        assert_eq!(calls[0].payload, Some(json!({ "id": "e1" })));
        assert_eq!(calls[1].id.as_deref(), Some("t1"));
        assert_eq!(calls[1].payload, None);
    }

    #[tokio::test]
    async fn mock_remote_fails_next_n_calls() {
        let remote = MockRemote::new();
        remote.fail_next(2);

        assert!(remote.delete(EntityKind::Task, "a").await.is_err());
        assert!(remote.delete(EntityKind::Task, "b").await.is_err());
        assert!(remote.delete(EntityKind::Task, "c").await.is_ok());
        assert_eq!(remote.calls().len(), 3);
    }

    #[tokio::test]
    async fn mock_remote_fail_always_until_cleared() {
        let remote = MockRemote::new();
        remote.fail_always(true);
        assert!(remote.delete(EntityKind::Task, "a").await.is_err());

        remote.fail_always(false);
        assert!(remote.delete(EntityKind::Task, "a").await.is_ok());
    }

    #[tokio::test]
    async fn mock_remote_holds_calls_until_released() {
        let remote = MockRemote::new();
        remote.hold();

        let handle = tokio::spawn({
            let remote = remote.clone();
            async move { remote.delete(EntityKind::Task, "a").await }
        });

        remote.wait_for_calls(1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        assert!(remote.calls().is_empty());

        remote.release();
        handle.await.unwrap().unwrap();
        assert_eq!(remote.calls().len(), 1);
        assert_eq!(remote.calls_started(), 1);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let remote = MockRemote::new();
        let clone = remote.clone();

        clone.create(EntityKind::Article, &json!({})).await.unwrap();
        assert_eq!(remote.calls().len(), 1);

        remote.reset();
        assert!(clone.calls().is_empty());
    }
}
