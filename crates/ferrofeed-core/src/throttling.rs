use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::fault::ClassifiedFault;
use crate::source::ProviderId;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client-side request budget for one provider.
///
/// An exhausted budget is reported as a retryable fault carrying the
/// limiter's wait, so the retry engine sleeps exactly as long as the quota
/// requires instead of guessing with backoff.
#[derive(Clone)]
pub struct Throttle {
    provider: ProviderId,
    limiter: Arc<DirectRateLimiter>,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl Throttle {
    /// A `limit` of zero is treated as one request a minute.
    pub fn per_minute(provider: ProviderId, limit: u32) -> Self {
        let limit = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
        Self {
            provider,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(limit))),
        }
    }

    /// Takes one cell of budget or reports how long to wait for the next.
    pub fn acquire(&self) -> Result<(), ClassifiedFault> {
        match self.limiter.check() {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                debug!(
                    provider = %self.provider,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "local quota exhausted"
                );
                Err(ClassifiedFault::retryable_after(
                    format!("{} request budget exhausted", self.provider),
                    Some(wait),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn exhausted_budget_is_retryable_with_wait() {
        let throttle = Throttle::per_minute(ProviderId::Finnhub, 2);

        assert!(throttle.acquire().is_ok());
        assert!(throttle.acquire().is_ok());

        let fault = throttle.acquire().expect_err("third request should be throttled");
        assert!(fault.is_retryable());
        let wait = fault.retry_after().expect("wait hint");
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(30), "wait={wait:?}");
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        let throttle = Throttle::per_minute(ProviderId::Reddit, 0);
        assert!(throttle.acquire().is_ok());
        assert!(throttle.acquire().is_err());
    }
}
