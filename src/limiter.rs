use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::chain::{Interceptor, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::semaphore::Semaphore;

/// Bounds the number of requests running through the rest of the chain.
///
/// Requests beyond the limit wait in arrival order. The permit is held until
/// the downstream call settles and is returned whether it succeeded, failed
/// or was cancelled.
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyLimiter {
    /// A limit of zero is raised to one.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn try_new(max_concurrent: usize) -> crate::Result<Self> {
        if max_concurrent == 0 {
            return Err(Error::InvalidConfig {
                field: "max_concurrent",
                message: "must be at least 1",
            });
        }
        Ok(Self::new(max_concurrent))
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Requests currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Requests queued behind the limit.
    pub fn waiting(&self) -> usize {
        self.semaphore.waiting()
    }

    /// Fails queued and future requests with [`Error::ConcurrencyLimitClosed`].
    /// Requests already admitted finish normally.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConcurrencyLimiter")
            .field("max_concurrent", &self.max_concurrent)
            .field("semaphore", &self.semaphore)
            .finish()
    }
}

#[async_trait]
impl Interceptor for ConcurrencyLimiter {
    async fn intercept(&self, request: Request, next: Next) -> crate::Result<Response> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::ConcurrencyLimitClosed)?;
        trace!(
            in_flight = self.in_flight(),
            waiting = self.waiting(),
            "request admitted"
        );
        next.run(request).await
    }

    fn name(&self) -> &'static str {
        "concurrency_limiter"
    }
}
