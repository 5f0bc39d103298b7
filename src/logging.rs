use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use tracing::{Level, debug, enabled, info, trace, warn};

use crate::chain::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;
use crate::util::{header_value_for_logs, truncate_body};

/// Logs every request and its outcome, then passes the outcome on untouched.
///
/// Request and status lines go to `info`, headers to `debug` with credentials
/// redacted, bodies to `trace` when enabled, failures to `warn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logging {
    log_bodies: bool,
}

impl Logging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_bodies(mut self, enabled: bool) -> Self {
        self.log_bodies = enabled;
        self
    }

    fn log_headers(headers: &HeaderMap) {
        if !enabled!(Level::DEBUG) {
            return;
        }
        for (name, value) in headers {
            debug!(" {}: {}", name, header_value_for_logs(name, value));
        }
    }

    fn log_body(&self, body: Option<&Bytes>) {
        if !self.log_bodies {
            return;
        }
        if let Some(body) = body.filter(|body| !body.is_empty()) {
            trace!("{}", truncate_body(body));
        }
    }
}

#[async_trait]
impl Interceptor for Logging {
    async fn intercept(&self, request: Request, next: Next) -> crate::Result<Response> {
        let method = request.method().clone();
        let uri = request.redacted_url();
        info!("> {method} {uri}");
        Self::log_headers(request.headers());
        self.log_body(request.body());

        match next.run(request).await {
            Ok(response) => {
                info!("< {} {method} {uri}", response.status().as_u16());
                Self::log_headers(response.headers());
                self.log_body(Some(response.body()));
                Ok(response)
            }
            Err(error) => {
                warn!(error_code = error.code().as_str(), "x {method} {uri}: {error}");
                Err(error)
            }
        }
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
