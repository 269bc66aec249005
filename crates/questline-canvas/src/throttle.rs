//! Rate-limit budget tracking and bounded retry with backoff.
//!
//! Canvas enforces a per-token quota and reports the remaining budget in the
//! `X-Rate-Limit-Remaining` response header. [`RateLimitBudget`] is the one
//! shared, synchronized resource in the whole engine: every worker reads the
//! latest observed quota before issuing a call and pauses when it runs low.
//!
//! [`RetryPolicy`] wraps a single API call in a bounded attempt loop:
//! throttle and transient errors back off and retry, terminal errors return
//! immediately, and exhausting the attempt budget yields
//! [`CanvasError::RetriesExhausted`].

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{CanvasError, CanvasResult};

/// Shared view of the Canvas per-token rate-limit quota.
///
/// `observe` is called with the remaining-quota header after every response;
/// `pause_before_call` consults the last observation and sleeps when the
/// quota has dropped below the low-water mark.
#[derive(Debug)]
pub struct RateLimitBudget {
    remaining: Mutex<Option<f64>>,
    /// Quota level below which callers pause before the next request.
    low_water: f64,
    /// Pause applied when below the low-water mark.
    pause: Duration,
}

impl Default for RateLimitBudget {
    fn default() -> Self {
        Self {
            remaining: Mutex::new(None),
            low_water: 50.0,
            pause: Duration::from_millis(500),
        }
    }
}

impl RateLimitBudget {
    pub fn new(low_water: f64, pause: Duration) -> Self {
        Self {
            remaining: Mutex::new(None),
            low_water,
            pause,
        }
    }

    /// Record the remaining quota reported by a response header.
    pub fn observe(&self, remaining: Option<f64>) {
        if let Some(value) = remaining {
            let mut guard = self.remaining.lock().unwrap();
            *guard = Some(value);
        }
    }

    /// Last observed remaining quota, if any response carried the header.
    pub fn remaining(&self) -> Option<f64> {
        *self.remaining.lock().unwrap()
    }

    /// Sleep briefly when the observed quota is below the low-water mark.
    pub async fn pause_before_call(&self) {
        let low = {
            let guard = self.remaining.lock().unwrap();
            matches!(*guard, Some(r) if r < self.low_water)
        };
        if low {
            debug!(pause_ms = self.pause.as_millis() as u64, "rate budget low, pausing");
            tokio::time::sleep(self.pause).await;
        }
    }
}

/// Bounded exponential backoff policy for Canvas calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying `attempt` (1-based, the attempt that just
    /// failed). Honors the throttle `retry_after` hint when present,
    /// otherwise doubles the base delay per attempt, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &CanvasError) -> Duration {
        if let CanvasError::RateLimited {
            retry_after: Some(secs),
        } = error
        {
            return Duration::from_secs_f64(secs.max(0.0)).min(self.max_delay);
        }
        let exp = self
            .base_delay
            .saturating_mul(1u32 << (attempt - 1).min(16));
        exp.min(self.max_delay)
    }

    /// Run `op` under this policy against the shared `budget`.
    ///
    /// Retryable errors sleep and retry; terminal errors propagate as-is;
    /// running out of attempts returns `RetriesExhausted` carrying the last
    /// error's message.
    pub async fn execute<T, F, Fut>(
        &self,
        budget: &RateLimitBudget,
        mut op: F,
    ) -> CanvasResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CanvasResult<T>>,
    {
        let mut last_error: Option<CanvasError> = None;

        for attempt in 1..=self.max_attempts {
            budget.pause_before_call().await;

            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &err);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retryable Canvas error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(err);
                }
                Err(err) if err.is_retryable() => {
                    return Err(CanvasError::RetriesExhausted {
                        attempts: self.max_attempts,
                        last_error: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        // Unreachable for max_attempts >= 1; keep the compiler honest.
        Err(CanvasError::RetriesExhausted {
            attempts: self.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}
