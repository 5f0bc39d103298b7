use async_trait::async_trait;

use crate::chain::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;

/// Prepends a fixed prefix to the url of every request.
///
/// The rewrite is plain concatenation on the request it receives. Placed
/// inside [`Retry`](crate::Retry), each attempt starts from the original url.
#[derive(Clone, Debug)]
pub struct PrefixRewrite {
    prefix: String,
}

impl PrefixRewrite {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl Interceptor for PrefixRewrite {
    async fn intercept(&self, mut request: Request, next: Next) -> crate::Result<Response> {
        let url = format!("{}{}", self.prefix, request.url());
        request.set_url(url);
        next.run(request).await
    }

    fn name(&self) -> &'static str {
        "prefix_rewrite"
    }
}
