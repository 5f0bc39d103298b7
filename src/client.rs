use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tracing::{Instrument, debug, info_span};

use crate::chain::{Chain, Interceptor, Transport};
use crate::clock::{Clock, TokioClock};
use crate::config::{ClientProfile, PipelineConfig};
use crate::error::Error;
use crate::request::{Request, RequestOptions};
use crate::response::Response;
use crate::transport::HyperTransport;
use crate::util::{
    is_absolute_http_url, join_base_path, merge_headers, parse_header_name, parse_header_value,
};

const DEFAULT_CLIENT_NAME: &str = "relay";

pub struct ClientBuilder {
    client_name: String,
    base_url: Option<String>,
    default_headers: HeaderMap,
    pipeline: Option<PipelineConfig>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    clock: Arc<dyn Clock>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            base_url: None,
            default_headers: HeaderMap::new(),
            pipeline: None,
            interceptors: Vec::new(),
            clock: Arc::new(TokioClock),
            transport: None,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name recorded on the `relay.request` tracing span.
    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Relative request urls are appended to this base before entering the
    /// chain. Absolute `http(s)://` urls are left alone.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sent with every request unless the request sets the same header.
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> crate::Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    /// Installs the standard retry, logging, concurrency and timeout stack
    /// ahead of any interceptor added with [`interceptor`](Self::interceptor).
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn profile(self, profile: ClientProfile) -> Self {
        self.pipeline(profile.defaults())
    }

    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn shared_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Timer source for the interceptors built from [`pipeline`](Self::pipeline).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the default [`HyperTransport`].
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn try_build(self) -> crate::Result<Client> {
        if let Some(base_url) = &self.base_url
            && !is_absolute_http_url(base_url)
        {
            return Err(Error::InvalidUri {
                uri: base_url.clone(),
            });
        }

        let mut chain = Chain::builder();
        if let Some(pipeline) = &self.pipeline {
            chain = chain.extend(pipeline.interceptors(&self.clock)?);
        }
        chain = chain.extend(self.interceptors);

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()?),
        };

        Ok(Client {
            client_name: self.client_name,
            base_url: self.base_url,
            default_headers: self.default_headers,
            chain: chain.build_shared(transport),
        })
    }

    pub fn build(self) -> Client {
        self.try_build().unwrap_or_else(|error| {
            panic!("failed to build relay client: {error}; use try_build() to handle configuration errors")
        })
    }
}

/// Entry point for callers: resolves the url, merges default headers and runs
/// the request through its chain.
///
/// A failure coming out of the chain is returned with the request attached
/// (see [`Error::request`]); its [`code`](Error::code) and message are those of
/// the underlying error. Failures raised while building the request, before
/// anything is dispatched, are returned bare.
#[derive(Clone)]
pub struct Client {
    client_name: String,
    base_url: Option<String>,
    default_headers: HeaderMap,
    chain: Chain,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub async fn execute(&self, request: Request) -> crate::Result<Response> {
        let request = self.prepare(request);
        let submitted = request.clone();
        let span = info_span!(
            "relay.request",
            client = %self.client_name,
            method = %request.method(),
            uri = %request.redacted_url()
        );

        async move {
            let started = Instant::now();
            match self.chain.execute(request).await {
                Ok(response) => {
                    debug!(
                        status = response.status().as_u16(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "request completed"
                    );
                    Ok(response)
                }
                Err(error) => {
                    debug!(
                        error_code = error.code().as_str(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "request failed"
                    );
                    Err(error.with_request(submitted))
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn request(
        &self,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> crate::Result<Response> {
        let request = Request::from_options(url, options)?;
        self.execute(request).await
    }

    pub async fn get(&self, url: impl Into<String>) -> crate::Result<Response> {
        self.request(url, RequestOptions::new()).await
    }

    pub async fn delete(&self, url: impl Into<String>) -> crate::Result<Response> {
        self.request(url, RequestOptions::new().method(Method::DELETE))
            .await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> crate::Result<Response> {
        self.request(url, RequestOptions::new().method(Method::POST).body(body))
            .await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> crate::Result<Response> {
        self.request(url, RequestOptions::new().method(Method::PUT).body(body))
            .await
    }

    fn prepare(&self, mut request: Request) -> Request {
        if let Some(base_url) = &self.base_url
            && !is_absolute_http_url(request.url())
        {
            let resolved = join_base_path(base_url, request.url());
            request.set_url(resolved);
        }
        if !self.default_headers.is_empty() {
            let merged = merge_headers(&self.default_headers, request.headers());
            *request.headers_mut() = merged;
        }
        request
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("client_name", &self.client_name)
            .field("base_url", &self.base_url)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}
