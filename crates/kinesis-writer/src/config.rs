// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::client::KinesisClient;
use crate::errors::Error;
use crate::splitter::{LineSplitter, Splitter};
use crate::Record;

pub const DEFAULT_RECORD_WINDOW: usize = 10;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

pub const DEFAULT_RETRY_MIN_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Called with the terminal error and the exact records that were dropped.
///
/// Runs on the blocking thread pool, so it may perform I/O.
pub type ErrorHandler = Arc<dyn Fn(&Error, &[Record]) + Send + Sync>;

/// Writes the error and every dropped record to stderr.
///
/// This goes straight to stderr rather than through `tracing` so a writer
/// used as a log sink does not feed its own failures back into itself.
#[must_use]
pub fn stderr_error_handler() -> ErrorHandler {
    Arc::new(|error: &Error, records: &[Record]| {
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = writeln!(out, "kinesis-writer: error {error}");
        for (i, record) in records.iter().enumerate() {
            let _ = writeln!(
                out,
                "failed to write logs [{i}]={}",
                String::from_utf8_lossy(record)
            );
        }
    })
}

/// Backoff for re-submitting records rejected by the service.
///
/// The n-th retry (0-based) waits `min_delay * 2^n`, clamped to `max_delay`
/// and to an even share of the time left before the flush deadline, so the
/// whole ladder fits in one flush timeout. No delay is shorter than
/// `min_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn for_flush_timeout(flush_timeout: Duration) -> Self {
        RetryPolicy {
            min_delay: DEFAULT_RETRY_MIN_DELAY,
            max_delay: flush_timeout,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.min_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before the n-th retry when `remaining` is left until the flush
    /// deadline, or `None` once that retry can no longer fit.
    ///
    /// The budget is split between the retries still allowed and the call
    /// after the last one.
    #[must_use]
    pub fn delay_within(&self, retry: u32, remaining: Duration) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let share = remaining / (self.max_retries - retry + 1);
        let delay = self.delay(retry).min(share).max(self.min_delay);
        (delay < remaining).then_some(delay)
    }
}

/// Options for [`crate::writer::Writer`].
///
/// Every field has a default; override only what you need:
///
/// ```rust
/// use kinesis_writer::config::WriterConfig;
/// use std::time::Duration;
///
/// let config = WriterConfig {
///     record_window: 3,
///     flush_interval: Duration::from_millis(10),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct WriterConfig {
    /// How raw writes are cut into records.
    pub splitter: Arc<dyn Splitter>,
    /// Record count that triggers an immediate flush.
    pub record_window: usize,
    /// Max time `write` waits for buffer capacity.
    pub write_timeout: Duration,
    /// Deadline for one flush, retries included.
    pub flush_timeout: Duration,
    /// Max time a non-empty batch sits unflushed.
    pub flush_interval: Duration,
    /// Number of pending commands the buffer accepts before `write` blocks.
    pub buffer_capacity: usize,
    /// Defaults to [`RetryPolicy::for_flush_timeout`].
    pub retry_policy: Option<RetryPolicy>,
    pub error_handler: ErrorHandler,
    /// Resolved from the ambient AWS configuration when unset.
    pub client: Option<Arc<dyn KinesisClient>>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            splitter: Arc::new(LineSplitter),
            record_window: DEFAULT_RECORD_WINDOW,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            retry_policy: None,
            error_handler: stderr_error_handler(),
            client: None,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.record_window == 0 {
            return Err(Error::InvalidConfig(
                "record window must be at least 1".to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(Error::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("write timeout", self.write_timeout),
            ("flush timeout", self.flush_timeout),
            ("flush interval", self.flush_interval),
        ] {
            if value.is_zero() {
                return Err(Error::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
            .unwrap_or_else(|| RetryPolicy::for_flush_timeout(self.flush_timeout))
    }
}

impl std::fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterConfig")
            .field("record_window", &self.record_window)
            .field("write_timeout", &self.write_timeout)
            .field("flush_timeout", &self.flush_timeout)
            .field("flush_interval", &self.flush_interval)
            .field("buffer_capacity", &self.buffer_capacity)
            .field("retry_policy", &self.retry_policy)
            .field("client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WriterConfig::default();
        assert_eq!(config.record_window, 10);
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.flush_timeout, Duration::from_secs(30));
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert!(config.client.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_follows_flush_timeout() {
        let config = WriterConfig {
            flush_timeout: Duration::from_secs(12),
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.min_delay, Duration::from_secs(5));
        assert_eq!(policy.max_delay, Duration::from_secs(12));
        assert_eq!(policy.max_retries, 3);
    }

    #[test]
    fn test_retry_delays_are_monotonic_and_capped() {
        let policy = RetryPolicy {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
        };
        let delays: Vec<_> = (0..3).map(|retry| policy.delay(retry)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20)
            ]
        );

        let tight = RetryPolicy {
            max_delay: Duration::from_secs(8),
            ..policy
        };
        let delays: Vec<_> = (0..3).map(|retry| tight.delay(retry)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(8),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn test_default_ladder_fits_flush_timeout() {
        let policy = RetryPolicy::for_flush_timeout(DEFAULT_FLUSH_TIMEOUT);

        let mut remaining = DEFAULT_FLUSH_TIMEOUT;
        let mut delays = Vec::new();
        for retry in 0..policy.max_retries {
            let delay = policy
                .delay_within(retry, remaining)
                .expect("retry should fit the deadline");
            remaining -= delay;
            delays.push(delay);
        }

        assert_eq!(delays.len(), 3);
        assert_eq!(delays[0], Duration::from_secs(5));
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(delays.iter().all(|delay| *delay >= policy.min_delay));
        assert!(remaining >= Duration::from_secs(5));
        assert_eq!(policy.delay_within(3, remaining), None);
    }

    #[test]
    fn test_delay_within_keeps_uncapped_ladder_on_long_deadlines() {
        let policy = RetryPolicy::for_flush_timeout(Duration::from_secs(120));
        assert_eq!(
            policy.delay_within(0, Duration::from_secs(120)),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            policy.delay_within(1, Duration::from_secs(115)),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            policy.delay_within(2, Duration::from_secs(105)),
            Some(Duration::from_secs(20))
        );
    }

    #[test]
    fn test_delay_within_refuses_retry_past_deadline() {
        let policy = RetryPolicy::for_flush_timeout(Duration::from_secs(12));
        assert_eq!(
            policy.delay_within(1, Duration::from_secs(7)),
            Some(Duration::from_secs(5))
        );
        assert_eq!(policy.delay_within(2, Duration::from_secs(2)), None);
    }

    #[test]
    fn test_retry_delay_does_not_overflow() {
        let policy = RetryPolicy {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            max_retries: 64,
        };
        assert_eq!(policy.delay(63), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = WriterConfig {
            record_window: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = WriterConfig {
            flush_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: flush interval must be non-zero"
        );
    }
}
