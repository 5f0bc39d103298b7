use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::request::Request;
use crate::response::Response;

/// The terminal call of a chain: performs one HTTP exchange.
///
/// Any `Fn(Request) -> impl Future<Output = Result<Response>>` is a transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> crate::Result<Response>;
}

#[async_trait]
impl<F, Fut> Transport for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<Response>> + Send + 'static,
{
    async fn send(&self, request: Request) -> crate::Result<Response> {
        (self)(request).await
    }
}

/// One link of the chain.
///
/// An interceptor sees the request before everything to its right and the
/// outcome after it. It may call `next` zero times (fail fast), once, or many
/// times (retry); `Next` is cheap to clone for that purpose.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, request: Request, next: Next) -> crate::Result<Response>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Handle to the remainder of a chain, from the interceptor after the
/// current one down to the transport.
#[derive(Clone)]
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    position: usize,
    transport: Arc<dyn Transport>,
}

impl Next {
    pub async fn run(&self, request: Request) -> crate::Result<Response> {
        match self.interceptors.get(self.position) {
            Some(interceptor) => {
                let next = Self {
                    interceptors: Arc::clone(&self.interceptors),
                    position: self.position + 1,
                    transport: Arc::clone(&self.transport),
                };
                interceptor.intercept(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }

    /// Number of interceptors still ahead of the transport.
    pub fn remaining(&self) -> usize {
        self.interceptors.len().saturating_sub(self.position)
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Next")
            .field("position", &self.position)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// A fixed, ordered pipeline of interceptors terminating in a transport.
///
/// The first interceptor added is the outermost: for `[A, B, C]` and
/// transport `T` a request runs `A -> B -> C -> T` and the outcome unwinds
/// `C -> B -> A`. A chain is immutable once built and can be cloned and
/// shared across any number of concurrent requests.
#[derive(Clone)]
pub struct Chain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    transport: Arc<dyn Transport>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    pub async fn execute(&self, request: Request) -> crate::Result<Response> {
        self.entry().run(request).await
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.interceptors
            .iter()
            .map(|interceptor| interceptor.name())
            .collect()
    }

    fn entry(&self) -> Next {
        Next {
            interceptors: Arc::clone(&self.interceptors),
            position: 0,
            transport: Arc::clone(&self.transport),
        }
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Chain")
            .field("interceptors", &self.interceptor_names())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct ChainBuilder {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ChainBuilder {
    /// Appends an interceptor; it runs inside every interceptor added before it.
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub(crate) fn extend(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptors.extend(interceptors);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn build(self, transport: impl Transport + 'static) -> Chain {
        self.build_shared(Arc::new(transport))
    }

    pub fn build_shared(self, transport: Arc<dyn Transport>) -> Chain {
        Chain {
            interceptors: self.interceptors.into(),
            transport,
        }
    }
}

/// Adapts a closure into an [`Interceptor`].
///
/// ```
/// use relay::{Chain, Request, Response, interceptor_fn};
/// use http::StatusCode;
///
/// let stamp = interceptor_fn(|mut request: Request, next| async move {
///     request.headers_mut().insert("x-stamp", "1".parse().expect("static header"));
///     next.run(request).await
/// });
/// let chain = Chain::builder()
///     .with(stamp)
///     .build(|_request: Request| async {
///         Ok::<_, relay::Error>(Response::with_status(StatusCode::OK))
///     });
/// assert_eq!(chain.len(), 1);
/// ```
pub fn interceptor_fn<F, Fut>(handler: F) -> InterceptorFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<Response>> + Send + 'static,
{
    InterceptorFn { handler }
}

#[derive(Clone)]
pub struct InterceptorFn<F> {
    handler: F,
}

#[async_trait]
impl<F, Fut> Interceptor for InterceptorFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<Response>> + Send + 'static,
{
    async fn intercept(&self, request: Request, next: Next) -> crate::Result<Response> {
        (self.handler)(request, next).await
    }

    fn name(&self) -> &'static str {
        "interceptor_fn"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::*;

    async fn no_content(_request: Request) -> crate::Result<Response> {
        Ok(Response::with_status(StatusCode::NO_CONTENT))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_chain_calls_transport_directly() {
        let chain = Chain::builder().build(no_content);
        assert!(chain.is_empty());

        let response = chain
            .execute(Request::get("http://localhost/"))
            .await
            .expect("transport should answer");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn next_reports_remaining_links() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |seen: Arc<Mutex<Vec<usize>>>| {
            interceptor_fn(move |request: Request, next: Next| {
                seen.lock().expect("lock seen").push(next.remaining());
                async move { next.run(request).await }
            })
        };
        let chain = Chain::builder()
            .with(record(Arc::clone(&seen)))
            .with(record(Arc::clone(&seen)))
            .build(no_content);

        chain
            .execute(Request::get("http://localhost/"))
            .await
            .expect("chain should succeed");
        assert_eq!(*seen.lock().expect("lock seen"), [1, 0]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn interceptor_may_short_circuit() {
        let chain = Chain::builder()
            .with(interceptor_fn(|_request: Request, _next: Next| async {
                Ok::<_, crate::Error>(Response::with_status(StatusCode::ACCEPTED))
            }))
            .build(|_request: Request| async {
                Err::<Response, _>(crate::Error::InvalidUri {
                    uri: "unreachable".to_owned(),
                })
            });

        let response = chain
            .execute(Request::get("http://localhost/"))
            .await
            .expect("short circuit should not reach transport");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
