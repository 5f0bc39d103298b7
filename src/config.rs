use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::chain::Interceptor;
use crate::clock::Clock;
use crate::error::Error;
use crate::limiter::ConcurrencyLimiter;
use crate::logging::Logging;
use crate::retry::{ExponentialBackoff, Retry};
use crate::timeout::Timeout;
use crate::util::truncate_body;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientProfile {
    #[default]
    StandardSdk,
    LowLatency,
    HighThroughput,
}

impl ClientProfile {
    pub fn defaults(self) -> PipelineConfig {
        match self {
            Self::StandardSdk => PipelineConfig {
                retries: 3,
                base_backoff_ms: 1000,
                max_backoff_ms: None,
                jitter_ratio: 0.0,
                timeout_ms: Some(10_000),
                max_concurrent: None,
                logging: true,
                log_bodies: false,
            },
            Self::LowLatency => PipelineConfig {
                retries: 1,
                base_backoff_ms: 50,
                max_backoff_ms: Some(300),
                jitter_ratio: 0.1,
                timeout_ms: Some(2_000),
                max_concurrent: None,
                logging: true,
                log_bodies: false,
            },
            Self::HighThroughput => PipelineConfig {
                retries: 3,
                base_backoff_ms: 150,
                max_backoff_ms: Some(3_000),
                jitter_ratio: 0.2,
                timeout_ms: Some(20_000),
                max_concurrent: Some(64),
                logging: true,
                log_bodies: false,
            },
        }
    }
}

/// Settings for the standard interceptor stack installed by
/// [`ClientBuilder::pipeline`](crate::ClientBuilder::pipeline).
///
/// Deserializable so hosts can keep it in their own config files; durations
/// are in milliseconds and missing fields take the
/// [`StandardSdk`](ClientProfile::StandardSdk) values.
///
/// ```
/// let config = relay::PipelineConfig::from_json(
///     r#"{ "retries": 1, "timeout_ms": 500, "max_concurrent": 4 }"#,
/// )
/// .expect("valid pipeline config");
/// assert_eq!(config.retries, 1);
/// assert_eq!(config.base_backoff_ms, 1000);
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub retries: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: Option<u64>,
    pub jitter_ratio: f64,
    pub timeout_ms: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub logging: bool,
    pub log_bodies: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        ClientProfile::StandardSdk.defaults()
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(text.as_bytes()),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Option<Duration>) -> Self {
        self.base_backoff_ms = duration_to_ms(base);
        self.max_backoff_ms = max.map(duration_to_ms);
        self
    }

    pub fn with_jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = timeout.map(duration_to_ms);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: Option<usize>) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_logging(mut self, logging: bool, log_bodies: bool) -> Self {
        self.logging = logging;
        self.log_bodies = log_bodies;
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.timeout_ms == Some(0) {
            return Err(Error::InvalidConfig {
                field: "timeout_ms",
                message: "must be greater than zero",
            });
        }
        if self.max_concurrent == Some(0) {
            return Err(Error::InvalidConfig {
                field: "max_concurrent",
                message: "must be at least 1",
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(Error::InvalidConfig {
                field: "jitter_ratio",
                message: "must be between 0 and 1",
            });
        }
        Ok(())
    }

    /// Builds the stack in its fixed order: retry, logging, concurrency
    /// limit, timeout. Retry is outermost so every attempt is logged, admitted
    /// and timed on its own.
    pub fn interceptors(&self, clock: &Arc<dyn Clock>) -> crate::Result<Vec<Arc<dyn Interceptor>>> {
        self.validate()?;

        let mut backoff = ExponentialBackoff::new(Duration::from_millis(self.base_backoff_ms))
            .jitter_ratio(self.jitter_ratio);
        if let Some(max_backoff_ms) = self.max_backoff_ms {
            backoff = backoff.max_backoff(Duration::from_millis(max_backoff_ms));
        }

        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::with_capacity(4);
        if self.retries > 0 {
            interceptors.push(Arc::new(
                Retry::new(self.retries)
                    .backoff(backoff)
                    .clock(Arc::clone(clock)),
            ));
        }
        if self.logging {
            interceptors.push(Arc::new(Logging::new().log_bodies(self.log_bodies)));
        }
        if let Some(max_concurrent) = self.max_concurrent {
            interceptors.push(Arc::new(ConcurrencyLimiter::try_new(max_concurrent)?));
        }
        if let Some(timeout_ms) = self.timeout_ms {
            interceptors.push(Arc::new(
                Timeout::try_new(Duration::from_millis(timeout_ms))?.clock(Arc::clone(clock)),
            ));
        }
        Ok(interceptors)
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
