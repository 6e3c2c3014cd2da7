//! Retry engine with exponential backoff, jitter and server wait hints.
//!
//! [`RetryEngine::execute`] runs an operation up to `max_retries + 1` times.
//! Terminal faults end the loop at once; retryable faults sleep for the
//! server-specified wait when one is present, otherwise for
//! `max(0.1s, base * multiplier^attempt ± jitter)`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::fault::ClassifiedFault;
use crate::source::ProviderFamily;
use crate::ValidationError;

/// Lower bound for computed backoff delays.
pub const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Immutable retry settings for one provider family.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    timeout: Duration,
    max_retries: u32,
    base: Duration,
    multiplier: f64,
    jitter: Duration,
}

impl RetryPolicy {
    /// Validates and builds a policy.
    ///
    /// `base` and `timeout` must be non-zero and `multiplier` finite and `>= 1`.
    pub fn new(
        timeout: Duration,
        max_retries: u32,
        base: Duration,
        multiplier: f64,
        jitter: Duration,
    ) -> Result<Self, ValidationError> {
        if timeout.is_zero() {
            return Err(ValidationError::NonPositiveValue { field: "timeout" });
        }
        if base.is_zero() {
            return Err(ValidationError::NonPositiveValue { field: "base" });
        }
        if !multiplier.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "multiplier" });
        }
        if multiplier < 1.0 {
            return Err(ValidationError::InvalidMultiplier { value: multiplier });
        }

        Ok(Self {
            timeout,
            max_retries,
            base,
            multiplier,
            jitter,
        })
    }

    /// Market data HTTP APIs: short timeouts, moderate retries.
    pub fn data_api_default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            base: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: Duration::from_millis(250),
        }
    }

    /// Social APIs rate-limit aggressively, so start from a longer base.
    pub fn social_default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 3,
            base: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: Duration::from_millis(500),
        }
    }

    /// LLM completions are slow; each attempt gets a much longer timeout.
    pub fn llm_default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            base: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: Duration::from_millis(500),
        }
    }

    pub fn default_for(family: ProviderFamily) -> Self {
        match family {
            ProviderFamily::DataApi => Self::data_api_default(),
            ProviderFamily::Social => Self::social_default(),
            ProviderFamily::Llm => Self::llm_default(),
        }
    }

    /// Disable retries while keeping the given per-attempt timeout.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            base: MIN_BACKOFF,
            multiplier: 1.0,
            jitter: Duration::ZERO,
        }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts, always `max_retries + 1`.
    pub const fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub const fn base(&self) -> Duration {
        self.base
    }

    pub const fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub const fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Deterministic part of the delay after a failed `attempt` (0-based).
    pub fn nominal_delay_secs(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.base.as_secs_f64() * self.multiplier.powi(exponent)
    }

    /// Backoff delay after a failed `attempt` (0-based), jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = self.jitter.as_secs_f64();
        let offset = if jitter > 0.0 {
            (fastrand::f64() * 2.0 - 1.0) * jitter
        } else {
            0.0
        };

        let seconds = (self.nominal_delay_secs(attempt) + offset).max(MIN_BACKOFF.as_secs_f64());
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::data_api_default()
    }
}

/// Timed wait used between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep<'a>(&'a self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep<'a>(&'a self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// Provider-agnostic retry loop.
#[derive(Clone)]
pub struct RetryEngine {
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine").finish_non_exhaustive()
    }
}

impl RetryEngine {
    pub fn new() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Runs `operation` until it succeeds, fails terminally, exhausts the
    /// policy, or `cancel` fires.
    ///
    /// Each attempt is bounded by [`RetryPolicy::timeout`]; an elapsed attempt
    /// counts as a retryable fault. Cancellation is checked before every
    /// attempt and raced against every sleep, and yields
    /// [`ClassifiedFault::cancelled`].
    pub async fn execute<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ClassifiedFault>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedFault>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ClassifiedFault::cancelled());
            }

            debug!(attempt, max_retries = policy.max_retries, "invoking operation");
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClassifiedFault::cancelled()),
                result = tokio::time::timeout(policy.timeout, operation()) => result,
            };

            let fault = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(fault)) => fault,
                Err(_elapsed) => ClassifiedFault::retryable(format!(
                    "attempt timed out after {:.1}s",
                    policy.timeout.as_secs_f64()
                )),
            };

            if !fault.is_retryable() {
                return Err(fault);
            }
            if attempt >= policy.max_retries {
                warn!(attempts = attempt + 1, error = %fault, "retries exhausted");
                return Err(fault);
            }

            let server_hint = fault.retry_after();
            let delay = server_hint.unwrap_or_else(|| policy.delay_for_attempt(attempt));
            warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                server_hint = server_hint.is_some(),
                error = %fault,
                "retrying after backoff"
            );

            if cancel.is_cancelled() {
                return Err(ClassifiedFault::cancelled());
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClassifiedFault::cancelled()),
                _ = self.sleeper.sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
