// src/throttle.rs
use backon::{ExponentialBuilder, Retryable};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics;
use crate::providers::FetchError;
use crate::types::ExchangeId;

/// Per-exchange request spacing. Each exchange keeps its own clock, so a slow
/// venue never delays requests to another one.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    overrides: HashMap<ExchangeId, Duration>,
    next_slot: Mutex<HashMap<ExchangeId, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, overrides: HashMap::new(), next_slot: Mutex::new(HashMap::new()) }
    }

    /// No spacing at all; for tests and replays.
    pub fn unthrottled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with_override(mut self, exchange: ExchangeId, min_interval: Duration) -> Self {
        self.overrides.insert(exchange, min_interval);
        self
    }

    pub fn interval_for(&self, exchange: ExchangeId) -> Duration {
        self.overrides.get(&exchange).copied().unwrap_or(self.min_interval)
    }

    /// Wait until the next request to `exchange` is allowed, then claim it.
    pub async fn throttle(&self, exchange: ExchangeId) {
        let interval = self.interval_for(exchange);
        // lock is released before sleeping
        let wait = {
            let mut slots = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = slots.get(&exchange).map_or(now, |s| (*s).max(now));
            slots.insert(exchange, slot + interval);
            slot - now
        };
        if !wait.is_zero() {
            debug!(%exchange, wait_ms = wait.as_millis() as u64, "throttling");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Exponential backoff for transient exchange failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32, // total tries, including the first
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: base_delay * 32,
            jitter: false,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        let b = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay.max(self.base_delay))
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize);
        if self.jitter { b.with_jitter() } else { b }
    }

    /// Run `op`, retrying transient failures with `base_delay * 2^attempt`
    /// (capped at `max_delay`) up to `max_attempts` tries in total.
    ///
    /// Permanent failures come back untouched after the first try. When the
    /// budget runs out the last transient error becomes `RateLimitExceeded`
    /// if the exchange was pushing back, `FetchFailed` otherwise.
    pub async fn with_retry<T, F, Fut>(&self, exchange: ExchangeId, op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let attempts = AtomicU32::new(1);
        let result = op
            .retry(self.backoff())
            .when(FetchError::is_transient)
            .notify(|err: &FetchError, delay: Duration| {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed);
                metrics::record_retry(exchange);
                warn!(
                    %exchange,
                    attempt,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
            })
            .await;

        result.map_err(|err| {
            let attempts = attempts.load(Ordering::Relaxed);
            match err {
                FetchError::Transient { rate_limited: true, .. } => {
                    FetchError::RateLimitExceeded { exchange, attempts }
                }
                FetchError::Transient { reason, .. } => {
                    FetchError::FetchFailed { exchange, attempts, reason }
                }
                other => other,
            }
        })
    }
}
