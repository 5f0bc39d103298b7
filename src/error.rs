use http::Method;
use thiserror::Error;

use crate::request::Request;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Stable, matchable kind of an [`Error`].
///
/// An error annotated with its originating request by the client reports the
/// code of the error it wraps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    InvalidHeaderName,
    InvalidHeaderValue,
    SerializeJson,
    RequestBuild,
    Transport,
    Timeout,
    ReadBody,
    ResponseBodyTooLarge,
    HttpStatus,
    Deserialize,
    Injected,
    ConcurrencyLimitClosed,
    InvalidConfig,
    TlsConfig,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::SerializeJson => "serialize_json",
            Self::RequestBuild => "request_build",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::ReadBody => "read_body",
            Self::ResponseBodyTooLarge => "response_body_too_large",
            Self::HttpStatus => "http_status",
            Self::Deserialize => "deserialize",
            Self::Injected => "injected",
            Self::ConcurrencyLimitClosed => "concurrency_limit_closed",
            Self::InvalidConfig => "invalid_config",
            Self::TlsConfig => "tls_config",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request json: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("http request timed out after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: BoxError,
    },
    #[error(
        "response body too large ({actual_bytes} bytes > {limit_bytes} bytes) for {method} {uri}"
    )]
    ResponseBodyTooLarge {
        limit_bytes: usize,
        actual_bytes: usize,
        method: Method,
        uri: String,
    },
    #[error("http status error {status} for {method} {uri}: {body}")]
    HttpStatus {
        status: u16,
        method: Method,
        uri: String,
        body: String,
    },
    #[error("failed to decode json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("injected failure at pattern position {position} for {method} {uri}")]
    Injected {
        position: usize,
        method: Method,
        uri: String,
    },
    #[error("request concurrency limiter is closed")]
    ConcurrencyLimitClosed,
    #[error("invalid {field}: {message}")]
    InvalidConfig {
        field: &'static str,
        message: &'static str,
    },
    #[error("invalid tls configuration: {message}")]
    TlsConfig { message: String },
    #[error(transparent)]
    Request(Box<RequestError>),
}

impl Error {
    /// Builds a transport failure for `request`, for use by [`Transport`](crate::Transport)
    /// implementations.
    pub fn transport(
        kind: TransportErrorKind,
        request: &Request,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transport {
            kind,
            method: request.method().clone(),
            uri: request.redacted_url(),
            source: source.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::Serialize { .. } => ErrorCode::SerializeJson,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::ResponseBodyTooLarge { .. } => ErrorCode::ResponseBodyTooLarge,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::Injected { .. } => ErrorCode::Injected,
            Self::ConcurrencyLimitClosed => ErrorCode::ConcurrencyLimitClosed,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::TlsConfig { .. } => ErrorCode::TlsConfig,
            Self::Request(annotated) => annotated.error.code(),
        }
    }

    /// The request that was being executed when this error surfaced, if the
    /// error passed through a [`Client`](crate::Client).
    pub fn request(&self) -> Option<&Request> {
        match self {
            Self::Request(annotated) => Some(&annotated.request),
            _ => None,
        }
    }

    /// The error with any request annotation peeled off.
    pub fn inner(&self) -> &Error {
        match self {
            Self::Request(annotated) => &annotated.error,
            other => other,
        }
    }

    pub fn into_inner(self) -> Error {
        match self {
            Self::Request(annotated) => annotated.error,
            other => other,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.inner() {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.code() == ErrorCode::Timeout
    }

    pub(crate) fn with_request(self, request: Request) -> Self {
        match self {
            Self::Request(_) => self,
            error => Self::Request(Box::new(RequestError { request, error })),
        }
    }
}

/// An [`Error`] annotated with the request that produced it.
///
/// Displays and chains exactly like the wrapped error.
#[derive(Debug)]
pub struct RequestError {
    request: Request,
    error: Error,
}

impl RequestError {
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn error(&self) -> &Error {
        &self.error
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, formatter)
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}
