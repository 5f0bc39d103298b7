use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method};
use serde::Serialize;

use crate::error::Error;
use crate::util::{parse_header_name, parse_header_value, redact_uri_for_logs};

/// An outgoing request as it travels through the interceptor chain.
///
/// Interceptors receive requests by value and may rewrite any part of them
/// before handing them to `next`.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Builds a request from a url and caller-supplied options, validating
    /// header names and values.
    pub fn from_options(url: impl Into<String>, options: RequestOptions) -> crate::Result<Self> {
        let mut headers = HeaderMap::with_capacity(options.headers.len());
        for (name, value) in &options.headers {
            headers.append(parse_header_name(name)?, parse_header_value(name, value)?);
        }
        Ok(Self {
            method: options.method,
            url: url.into(),
            headers,
            body: options.body,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> &mut Option<Bytes> {
        &mut self.body
    }

    pub fn with_header(mut self, name: &str, value: &str) -> crate::Result<Self> {
        self.headers
            .insert(parse_header_name(name)?, parse_header_value(name, value)?);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The url with credentials, query and fragment stripped.
    pub fn redacted_url(&self) -> String {
        redact_uri_for_logs(&self.url)
    }
}

/// Per-call options accepted by [`Client::request`](crate::Client::request).
#[derive(Clone, Debug)]
pub struct RequestOptions {
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<T>(mut self, value: &T) -> crate::Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(value).map_err(|source| Error::Serialize { source })?;
        self.headers
            .push((CONTENT_TYPE.as_str().to_owned(), "application/json".to_owned()));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn from_options_validates_header_names() {
        let error = Request::from_options(
            "https://api.example.com/",
            RequestOptions::new().header("bad header", "x"),
        )
        .expect_err("space in header name should be rejected");
        assert!(matches!(error, Error::InvalidHeaderName { .. }));
    }

    #[test]
    fn from_options_keeps_repeated_headers() {
        let request = Request::from_options(
            "https://api.example.com/",
            RequestOptions::new()
                .method(Method::PUT)
                .header("x-tag", "a")
                .header("x-tag", "b")
                .body("payload"),
        )
        .expect("options should build a request");

        assert_eq!(*request.method(), Method::PUT);
        let tags: Vec<_> = request
            .headers()
            .get_all("x-tag")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        assert_eq!(tags, ["a", "b"]);
        assert_eq!(request.body().map(|body| &body[..]), Some(&b"payload"[..]));
    }

    #[test]
    fn json_options_set_content_type() {
        let request = Request::from_options(
            "https://api.example.com/v1/items",
            RequestOptions::new()
                .method(Method::POST)
                .json(&serde_json::json!({ "name": "demo" }))
                .expect("serialize payload"),
        )
        .expect("options should build a request");

        assert_eq!(
            request.headers().get(CONTENT_TYPE).map(HeaderValue::as_bytes),
            Some(&b"application/json"[..])
        );
        assert_eq!(
            request.body().map(|body| &body[..]),
            Some(&br#"{"name":"demo"}"#[..])
        );
    }
}
