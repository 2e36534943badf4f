//! Retry backoff for queued mutations.
//!
//! A failed replay is rescheduled `base * 2^retries` after the failure,
//! where `retries` is the already-incremented failure count. After one
//! failure with the default base of one second the item becomes eligible
//! again two seconds later.
//!
//! Jitter is off by default: a single client talking to its own backend has
//! no thundering herd to spread out.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Number of failed attempts after which an item is given up on.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Exponent cap so delays stay representable.
const MAX_EXPONENT: u32 = 20;

/// Retry schedule for sync queue items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Items with `retries >= max_retries` are not replayed again.
    pub max_retries: u32,
    /// Base delay multiplied by `2^retries`.
    pub base: Duration,
    /// Upper bound of the random delay added on top (zero disables jitter).
    pub max_jitter: Duration,
}

impl BackoffPolicy {
    /// Create the default policy: 5 retries, 1s base, no jitter.
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base: Duration::from_secs(1),
            max_jitter: Duration::ZERO,
        }
    }

    /// Set the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay.
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Add up to `max_jitter` of random delay to every reschedule.
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Check whether an item with this many failures should be given up on.
    pub fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }

    /// Deterministic part of the delay: `base * 2^retries`.
    pub fn base_delay(&self, retries: u32) -> Duration {
        let factor = 2u32.saturating_pow(retries.min(MAX_EXPONENT));
        self.base.saturating_mul(factor)
    }

    /// Full delay including jitter. Saturates instead of overflowing.
    pub fn delay(&self, retries: u32) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(random_jitter_ms(max_ms))
        };
        self.base_delay(retries).saturating_add(jitter)
    }

    /// Time at which an item that has failed `retries` times may be replayed.
    pub fn next_attempt(&self, now: DateTime<Utc>, retries: u32) -> DateTime<Utc> {
        let delay = TimeDelta::from_std(self.delay(retries)).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate random jitter between 0 and `max_ms` milliseconds.
///
/// Falls back to no jitter if the OS random source is unavailable.
fn random_jitter_ms(max_ms: u64) -> u64 {
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return 0;
    }
    let value = u64::from_le_bytes(bytes);
    match max_ms.checked_add(1) {
        Some(bound) => value % bound,
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base, Duration::from_secs(1));
        assert!(policy.max_jitter.is_zero());
    }

    #[test]
    fn delay_doubles_per_retry() {
        let policy = BackoffPolicy::new();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(32));
    }

    #[test]
    fn one_failure_reschedules_two_seconds_out() {
        let policy = BackoffPolicy::new();
        let t_fail = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let next = policy.next_attempt(t_fail, 1);
        assert_eq!(next - t_fail, TimeDelta::seconds(2));
    }

    #[test]
    fn exhaustion_at_ceiling() {
        let policy = BackoffPolicy::new();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
    }

    #[test]
    fn huge_retry_counts_do_not_overflow() {
        let policy = BackoffPolicy::new().with_base(Duration::from_secs(3600));
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let next = policy.next_attempt(now, u32::MAX);
        assert!(next > now);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = BackoffPolicy::new().with_jitter(Duration::from_millis(500));

        for _ in 0..20 {
            let delay = policy.delay(2);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_millis(4500));
        }
    }

    #[test]
    fn jitter_creates_variance() {
        let policy = BackoffPolicy::new().with_jitter(Duration::from_millis(5000));
        let delays: Vec<Duration> = (0..20).map(|_| policy.delay(3)).collect();

        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();
        assert!(
            max.as_millis() - min.as_millis() >= 100,
            "Expected jitter variance, got min={:?} max={:?}",
            min,
            max
        );
    }

    #[test]
    fn extreme_settings_saturate() {
        let policy = BackoffPolicy::new().with_jitter(Duration::from_millis(u64::MAX));
        assert!(policy.delay(1) >= Duration::from_secs(2));

        let policy = BackoffPolicy::new()
            .with_base(Duration::from_secs(u64::MAX))
            .with_jitter(Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::MAX);

        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(policy.next_attempt(now, 3), DateTime::<Utc>::MAX_UTC);
    }
}
