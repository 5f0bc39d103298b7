use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;

use crate::chain::{Interceptor, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::util::truncate_body;

type StatusPredicate = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;

/// Turns responses whose status the predicate rejects into
/// [`Error::HttpStatus`]. Accepts every status below 400 by default.
#[derive(Clone)]
pub struct CheckStatus {
    accept: StatusPredicate,
}

impl CheckStatus {
    pub fn new<F>(accept: F) -> Self
    where
        F: Fn(StatusCode) -> bool + Send + Sync + 'static,
    {
        Self {
            accept: Arc::new(accept),
        }
    }

    /// Accepts `200 OK` and nothing else.
    pub fn only_ok() -> Self {
        Self::new(|status| status == StatusCode::OK)
    }

    pub fn accepts(&self, status: StatusCode) -> bool {
        (self.accept)(status)
    }
}

impl Default for CheckStatus {
    fn default() -> Self {
        Self::new(|status| status.as_u16() < 400)
    }
}

impl std::fmt::Debug for CheckStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("CheckStatus").finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for CheckStatus {
    async fn intercept(&self, request: Request, next: Next) -> crate::Result<Response> {
        let method = request.method().clone();
        let uri = request.redacted_url();
        let response = next.run(request).await?;
        if self.accepts(response.status()) {
            return Ok(response);
        }
        Err(Error::HttpStatus {
            status: response.status().as_u16(),
            method,
            uri,
            body: truncate_body(response.body()),
        })
    }

    fn name(&self) -> &'static str {
        "check_status"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_accepts_everything_below_400() {
        let check = CheckStatus::default();
        for code in 100..400 {
            let status = StatusCode::from_u16(code).expect("valid status code");
            assert!(check.accepts(status), "{code} should be accepted");
        }
        for code in 400..600 {
            let status = StatusCode::from_u16(code).expect("valid status code");
            assert!(!check.accepts(status), "{code} should be rejected");
        }
    }

    #[test]
    fn only_ok_accepts_exactly_200() {
        let check = CheckStatus::only_ok();
        assert!(check.accepts(StatusCode::OK));
        assert!(!check.accepts(StatusCode::NO_CONTENT));
        assert!(!check.accepts(StatusCode::NOT_MODIFIED));
    }
}
