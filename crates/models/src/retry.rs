//! Retry policy for transient backend failures.
//!
//! Modeled as a small state machine (attempts + backoff curve + error
//! classifier) driven by the caller, rather than ad-hoc control flow.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use af_domain::{Error, Result};

/// Error-message substrings treated as transient.
const RETRYABLE_PATTERNS: [&str; 8] = [
    "timeout",
    "connection",
    "network",
    "temporary",
    "rate limit",
    "500",
    "502",
    "503",
];

/// Whether the error is worth another attempt.
pub fn is_retryable(err: &Error) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| message.contains(p))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backoff curves
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delay curve between attempts. `attempt` is the 1-based number of the
/// attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base × attempt`.
    Linear { base: Duration },
    /// `base × 2^attempt`.
    Exponential { base: Duration },
    Fixed { delay: Duration },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear {
            base: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Resolve a strategy by name. Unknown names are a configuration error.
    pub fn from_name(name: &str, base: Duration) -> Result<Self> {
        match name {
            "linear" => Ok(Backoff::Linear { base }),
            "exponential" => Ok(Backoff::Exponential { base }),
            "fixed" => Ok(Backoff::Fixed { delay: base }),
            other => Err(Error::Config(format!("unknown retry strategy: {other}"))),
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Linear { base } => *base * attempt,
            Backoff::Exponential { base } => *base * 2u32.saturating_pow(attempt),
            Backoff::Fixed { delay } => *delay,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Attempt budget plus backoff curve.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` means no retries.
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Drive `op` until it succeeds, fails terminally, or the budget is
    /// exhausted. Sleeps between attempts are cancellation-aware; a
    /// cancelled token surfaces as [`Error::Cancelled`].
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.attempts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt == self.attempts || !is_retryable(&e) {
                        return Err(e);
                    }
                    let delay = self.backoff.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient backend error, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                    }
                }
            }
        }
        unreachable!("attempts >= 1 always returns from the loop")
    }
}
