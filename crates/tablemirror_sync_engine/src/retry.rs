//! Bounded retry with exponential backoff.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{error, warn};

/// Blocks the calling flow for a backoff delay.
pub trait Sleeper: Send + Sync {
    /// Sleeps for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays without sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates a new recording sleeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every delay requested so far.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    /// Returns the sum of requested delays.
    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts
/// `config.max_attempts`.
///
/// The closure receives the 0-indexed attempt number. The last failure is
/// returned unchanged once attempts run out.
pub fn with_backoff<T, F>(
    operation_name: &str,
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> SyncResult<T>
where
    F: FnMut(u32) -> SyncResult<T>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt);
            warn!(
                operation = operation_name,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure"
            );
            sleeper.sleep(delay);
        }

        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < config.max_attempts => {
                last_error = Some(e);
            }
            Err(e) => {
                if e.is_retryable() {
                    error!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %e,
                        "giving up after retries"
                    );
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SyncError::Protocol("no attempts made".into())))
}
