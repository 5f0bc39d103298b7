use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::chain::{Interceptor, Next};
use crate::clock::{Clock, TokioClock};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

const DEFAULT_RETRIES: usize = 3;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(1000);

/// Delay before the attempt following failed attempt number `attempt`
/// (1-based).
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: usize) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: usize) -> Duration {
        (self)(attempt)
    }
}

/// `base * 2^(attempt - 1)`, optionally capped and jittered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Option<Duration>,
    jitter_ratio: f64,
}

impl ExponentialBackoff {
    pub const fn new(base: Duration) -> Self {
        Self {
            base,
            max: None,
            jitter_ratio: 0.0,
        }
    }

    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.max = Some(max.max(self.base));
        self
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }

        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }
        let max_backoff_ms = self
            .max
            .map_or(u64::MAX, |max| max.as_millis().min(u64::MAX as u128) as u64);

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = backoff_ms.saturating_sub(jitter_span);
        let high = backoff_ms.saturating_add(jitter_span).max(low);
        let mut rng = rand::rng();
        let sampled_ms = rng.random_range(low..=high).min(max_backoff_ms.max(1));
        Duration::from_millis(sampled_ms)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_BACKOFF)
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: usize) -> Duration {
        let capped_exponent = attempt.saturating_sub(1).min(63) as u32;
        let multiplier = 1_u128 << capped_exponent;
        let base_ms = self.base.as_millis();
        let max_ms = self.max.map_or(u64::MAX as u128, |max| max.as_millis());
        let delay_ms = base_ms
            .saturating_mul(multiplier)
            .min(max_ms)
            .min(u64::MAX as u128) as u64;
        self.apply_jitter(Duration::from_millis(delay_ms))
    }
}

/// Decides whether a failed attempt is worth repeating.
pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, error: &Error) -> bool;
}

impl<F> RetryClassifier for F
where
    F: Fn(&Error) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &Error) -> bool {
        (self)(error)
    }
}

/// Re-runs the rest of the chain on failure, sleeping between attempts.
///
/// Makes at most `retries + 1` attempts. Once they are exhausted the error of
/// the **last** attempt is returned unchanged; errors of earlier attempts are
/// only logged. There is no distinct "retries exhausted" error.
///
/// Every attempt receives a fresh clone of the request exactly as `Retry`
/// received it, so rewrites done further down the chain (a URL prefix, an
/// added header) are never applied twice. Place `Retry` outermost so that it
/// also covers timeouts and status checks.
pub struct Retry {
    retries: usize,
    backoff: Arc<dyn Backoff>,
    classifier: Option<Arc<dyn RetryClassifier>>,
    clock: Arc<dyn Clock>,
}

impl Retry {
    pub fn new(retries: usize) -> Self {
        Self {
            retries,
            backoff: Arc::new(ExponentialBackoff::default()),
            classifier: None,
            clock: Arc::new(TokioClock),
        }
    }

    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Restricts retries to errors the classifier accepts. Without one every
    /// error is retried.
    pub fn classifier(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    pub fn max_attempts(&self) -> usize {
        self.retries.saturating_add(1)
    }

    fn should_retry(&self, error: &Error) -> bool {
        self.classifier
            .as_ref()
            .is_none_or(|classifier| classifier.should_retry(error))
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES)
    }
}

impl std::fmt::Debug for Retry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Retry")
            .field("retries", &self.retries)
            .field("classified", &self.classifier.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for Retry {
    async fn intercept(&self, request: Request, next: Next) -> crate::Result<Response> {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            let error = match next.run(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };
            if attempt >= max_attempts || !self.should_retry(&error) {
                return Err(error);
            }

            let delay = self.backoff.delay(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying request after failure"
            );
            self.clock.sleep(delay).await;
            attempt += 1;
        }
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}
