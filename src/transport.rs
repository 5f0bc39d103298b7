use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::chain::Transport;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::util::classify_transport_error;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;
const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

type ReqBody = Full<Bytes>;

#[cfg(feature = "rustls")]
type RustlsHyperClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, ReqBody>;

#[derive(Clone)]
#[cfg_attr(feature = "rustls", allow(dead_code))]
enum TransportClient {
    Plain(Client<HttpConnector, ReqBody>),
    #[cfg(feature = "rustls")]
    Rustls(RustlsHyperClient),
}

impl TransportClient {
    async fn request(
        &self,
        request: http::Request<ReqBody>,
    ) -> Result<http::Response<Incoming>, hyper_util::client::legacy::Error> {
        match self {
            Self::Plain(client) => client.request(request).await,
            #[cfg(feature = "rustls")]
            Self::Rustls(client) => client.request(request).await,
        }
    }
}

/// The default transport: one pooled hyper client.
///
/// Plain `http://` only, unless the `rustls` feature is enabled, in which case
/// `https://` is served with the system root certificates.
#[derive(Clone)]
pub struct HyperTransport {
    client: TransportClient,
    max_response_body_bytes: usize,
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    pub fn new() -> crate::Result<Self> {
        Self::builder().build()
    }

    pub fn max_response_body_bytes(&self) -> usize {
        self.max_response_body_bytes
    }

    fn build_request(request: &Request) -> crate::Result<http::Request<ReqBody>> {
        let uri: Uri = request.url().parse().map_err(|_| Error::InvalidUri {
            uri: request.redacted_url(),
        })?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(Error::InvalidUri {
                uri: request.redacted_url(),
            });
        }

        let body = request.body().cloned().unwrap_or_default();
        let mut builder = http::Request::builder()
            .method(request.method().clone())
            .uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers().clone();
        }
        builder
            .body(Full::new(body))
            .map_err(|source| Error::RequestBuild { source })
    }

    async fn read_body_limited(&self, request: &Request, mut body: Incoming) -> crate::Result<Bytes> {
        let mut collected = Vec::new();
        let mut total_len = 0_usize;

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|source| Error::ReadBody {
                source: Box::new(source),
            })?;
            if let Some(data) = frame.data_ref() {
                total_len = total_len.saturating_add(data.len());
                if total_len > self.max_response_body_bytes {
                    return Err(Error::ResponseBodyTooLarge {
                        limit_bytes: self.max_response_body_bytes,
                        actual_bytes: total_len,
                        method: request.method().clone(),
                        uri: request.redacted_url(),
                    });
                }
                collected.extend_from_slice(data);
            }
        }

        Ok(Bytes::from(collected))
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.client {
            TransportClient::Plain(_) => "http",
            #[cfg(feature = "rustls")]
            TransportClient::Rustls(_) => "rustls",
        };
        formatter
            .debug_struct("HyperTransport")
            .field("backend", &backend)
            .field("max_response_body_bytes", &self.max_response_body_bytes)
            .finish()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: Request) -> crate::Result<Response> {
        let http_request = Self::build_request(&request)?;
        let response = self
            .client
            .request(http_request)
            .await
            .map_err(|source| {
                let kind = classify_transport_error(&source);
                Error::transport(kind, &request, source)
            })?;

        let (parts, body) = response.into_parts();
        let body = self.read_body_limited(&request, body).await?;
        debug!(
            status = parts.status.as_u16(),
            body_bytes = body.len(),
            "transport exchange complete"
        );
        Ok(Response::new(parts.status, parts.headers, body))
    }
}

#[derive(Clone, Debug)]
pub struct HyperTransportBuilder {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    max_response_body_bytes: usize,
    http2_only: bool,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            http2_only: false,
        }
    }
}

impl HyperTransportBuilder {
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host.max(1);
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    pub fn build(self) -> crate::Result<HyperTransport> {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(self.connect_timeout));

        let client = self.build_client(connector)?;
        Ok(HyperTransport {
            client,
            max_response_body_bytes: self.max_response_body_bytes,
        })
    }

    #[cfg(not(feature = "rustls"))]
    fn build_client(&self, connector: HttpConnector) -> crate::Result<TransportClient> {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .http2_only(self.http2_only)
            .build(connector);
        Ok(TransportClient::Plain(client))
    }

    #[cfg(feature = "rustls")]
    fn build_client(&self, connector: HttpConnector) -> crate::Result<TransportClient> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(build_rustls_tls_config()?)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(connector);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .http2_only(self.http2_only)
            .build(https);
        Ok(TransportClient::Rustls(client))
    }
}

#[cfg(feature = "rustls")]
fn build_rustls_tls_config() -> crate::Result<rustls::ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    if !loaded.errors.is_empty() {
        tracing::warn!(
            error_count = loaded.errors.len(),
            "system root certificate loading returned partial errors"
        );
    }
    let (added, _ignored) = root_store.add_parsable_certificates(loaded.certs);
    if added == 0 {
        return Err(Error::TlsConfig {
            message: "failed to load system root certificates".to_owned(),
        });
    }

    let provider = rustls::crypto::ring::default_provider();
    let config = rustls::ClientConfig::builder_with_provider(provider.into())
        .with_safe_default_protocol_versions()
        .map_err(|source| Error::TlsConfig {
            message: source.to_string(),
        })?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}
