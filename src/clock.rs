use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Source of timers for interceptors that wait: [`Retry`](crate::Retry)
/// between attempts and [`Timeout`](crate::Timeout) for its deadline.
///
/// Dropping the returned future must cancel the timer.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Timers backed by the tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}
