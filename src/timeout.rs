use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::chain::{Interceptor, Next};
use crate::clock::{Clock, TokioClock};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Fails a request that has not settled within `duration`.
///
/// The rest of the chain is always started before the deadline is armed, so
/// it runs exactly once even for a very short duration. Whichever side
/// settles first decides the outcome:
///
/// * the request settles first: its response or error is returned as is and
///   the deadline timer is dropped, so it can never fire later;
/// * the deadline fires first: [`Error::Timeout`] is returned and the
///   in-flight request future is dropped. That cancels it at its next
///   suspension point, but work the transport already handed to another
///   task (a pooled connection, for example) may still run to completion.
pub struct Timeout {
    duration: Duration,
    clock: Arc<dyn Clock>,
}

impl Timeout {
    /// A zero duration is raised to one millisecond.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration: duration.max(MIN_TIMEOUT),
            clock: Arc::new(TokioClock),
        }
    }

    pub fn try_new(duration: Duration) -> crate::Result<Self> {
        if duration.is_zero() {
            return Err(Error::InvalidConfig {
                field: "timeout",
                message: "must be greater than zero",
            });
        }
        Ok(Self::new(duration))
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Timeout")
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for Timeout {
    async fn intercept(&self, request: Request, next: Next) -> crate::Result<Response> {
        let method = request.method().clone();
        let uri = request.redacted_url();
        let deadline = self.clock.sleep(self.duration);

        tokio::select! {
            biased;
            result = next.run(request) => result,
            () = deadline => {
                let timeout_ms = self.duration.as_millis();
                debug!(timeout_ms = timeout_ms as u64, method = %method, uri = %uri, "request deadline elapsed");
                Err(Error::Timeout {
                    timeout_ms,
                    method,
                    uri,
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}
