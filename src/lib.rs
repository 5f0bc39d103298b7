//! `relay` wraps a single HTTP call in a composable chain of interceptors:
//! retry with backoff, deadlines, admission control, logging, status checks
//! and fault injection, each a small unit that sees the request on the way in
//! and the outcome on the way out.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use relay::prelude::{CheckStatus, Client, PipelineConfig};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Item {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .client_name("my-sdk")
//!         .base_url("https://api.example.com/v1")
//!         .pipeline(
//!             PipelineConfig::default()
//!                 .with_retries(2)
//!                 .with_backoff(Duration::from_millis(100), Some(Duration::from_millis(800)))
//!                 .with_timeout(Some(Duration::from_secs(3)))
//!                 .with_max_concurrent(Some(16)),
//!         )
//!         .interceptor(CheckStatus::default())
//!         .try_build()?;
//!
//!     let item: Item = client.get("/items/42").await?.json()?;
//!     println!("item id={}", item.id);
//!     Ok(())
//! }
//! ```
//!
//! # Ordering
//!
//! The first interceptor added is the outermost. Put [`Retry`] first so each
//! attempt gets its own timeout and admission slot, and so rewrites further
//! in are applied to a fresh copy of the request on every attempt.

mod chain;
mod client;
mod clock;
mod config;
mod error;
mod fault;
mod limiter;
mod logging;
mod prefix;
mod request;
mod response;
mod retry;
mod semaphore;
mod status;
mod timeout;
mod transport;
mod util;

pub use crate::chain::{
    Chain, ChainBuilder, Interceptor, InterceptorFn, Next, Transport, interceptor_fn,
};
pub use crate::client::{Client, ClientBuilder};
pub use crate::clock::{Clock, Sleep, TokioClock};
pub use crate::config::{ClientProfile, PipelineConfig};
pub use crate::error::{Error, ErrorCode, RequestError, TransportErrorKind};
pub use crate::fault::ThrowPattern;
pub use crate::limiter::ConcurrencyLimiter;
pub use crate::logging::Logging;
pub use crate::prefix::PrefixRewrite;
pub use crate::request::{Request, RequestOptions};
pub use crate::response::Response;
pub use crate::retry::{Backoff, ExponentialBackoff, Retry, RetryClassifier};
pub use crate::semaphore::{AcquireError, Permit, Semaphore};
pub use crate::status::CheckStatus;
pub use crate::timeout::Timeout;
pub use crate::transport::{HyperTransport, HyperTransportBuilder};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod prelude {
    pub use crate::{
        Chain, CheckStatus, Client, ClientProfile, ConcurrencyLimiter, Error, ErrorCode,
        ExponentialBackoff, Interceptor, Logging, Next, PipelineConfig, PrefixRewrite, Request,
        RequestOptions, Response, Retry, Timeout, Transport,
    };
}
