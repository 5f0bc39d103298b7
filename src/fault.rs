use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::chain::{Interceptor, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Deterministic fault injection for exercising retry and error paths.
///
/// Each call consumes the next character of the pattern, wrapping around at
/// the end: `s` lets the request through, anything else fails it with
/// [`Error::Injected`]. The pattern is case-insensitive and the position is
/// shared by every request passing through this instance.
#[derive(Debug)]
pub struct ThrowPattern {
    pattern: Vec<char>,
    cursor: AtomicUsize,
}

impl ThrowPattern {
    pub fn try_new(pattern: &str) -> crate::Result<Self> {
        let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
        if pattern.is_empty() {
            return Err(Error::InvalidConfig {
                field: "pattern",
                message: "must not be empty",
            });
        }
        Ok(Self {
            pattern,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Calls made so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Interceptor for ThrowPattern {
    async fn intercept(&self, request: Request, next: Next) -> crate::Result<Response> {
        let position = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pattern.len();
        if self.pattern[position] == 's' {
            return next.run(request).await;
        }
        Err(Error::Injected {
            position,
            method: request.method().clone(),
            uri: request.redacted_url(),
        })
    }

    fn name(&self) -> &'static str {
        "throw_pattern"
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::chain::Chain;

    #[test]
    fn empty_pattern_is_rejected() {
        let error = ThrowPattern::try_new("").expect_err("empty pattern should be rejected");
        assert!(matches!(error, Error::InvalidConfig { field: "pattern", .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pattern_wraps_and_ignores_case() {
        let chain = Chain::builder()
            .with(ThrowPattern::try_new("Sf").expect("valid pattern"))
            .build(|_request: Request| async {
                Ok::<_, Error>(Response::with_status(StatusCode::OK))
            });

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            match chain.execute(Request::get("http://localhost/")).await {
                Ok(_) => outcomes.push("pass".to_owned()),
                Err(Error::Injected { position, .. }) => outcomes.push(format!("fail@{position}")),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(outcomes, ["pass", "fail@1", "pass", "fail@1"]);
    }
}
