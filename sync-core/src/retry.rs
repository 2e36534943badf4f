//! Per-item replay decisions for a drain pass.
//!
//! The drain loop in sync-client asks [`decide`] what to do with each queue
//! item and, when a replay fails, persists the item returned by
//! [`after_failure`].

use chrono::{DateTime, Utc};
use cultura_sync_types::SyncQueueItem;

use crate::backoff::BackoffPolicy;

/// What a drain pass should do with one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayDecision {
    /// Retries exhausted: move the item out of the queue, never replay it.
    GiveUp,
    /// Backoff has not elapsed yet: leave the item for a later pass.
    NotYetDue,
    /// Replay the item against the remote endpoint now.
    Replay,
}

/// Decide what to do with `item` at time `now`.
///
/// Exhaustion is checked first, so an item with `retries >= max_retries`
/// is given up on even if its backoff has not elapsed.
pub fn decide(item: &SyncQueueItem, policy: &BackoffPolicy, now: DateTime<Utc>) -> ReplayDecision {
    if policy.is_exhausted(item.retries) {
        ReplayDecision::GiveUp
    } else if item.timestamp > now {
        ReplayDecision::NotYetDue
    } else {
        ReplayDecision::Replay
    }
}

/// The item as it must be stored after a failed replay at `now`.
///
/// `retries` goes up by exactly one and `timestamp` moves to
/// `now + base * 2^retries`.
pub fn after_failure(
    item: &SyncQueueItem,
    policy: &BackoffPolicy,
    now: DateTime<Utc>,
) -> SyncQueueItem {
    let retries = item.retries.saturating_add(1);
    SyncQueueItem {
        retries,
        timestamp: policy.next_attempt(now, retries),
        ..item.clone()
    }
}

/// Sort items oldest first; equal timestamps fall back to enqueue order.
pub fn sort_for_replay(items: &mut [SyncQueueItem]) {
    items.sort_by_key(|item| (item.timestamp, item.seq));
}
