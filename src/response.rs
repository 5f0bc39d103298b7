use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::util::truncate_body;

#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// A response with the given status, no headers and an empty body.
    pub fn with_status(status: StatusCode) -> Self {
        Self::new(status, HeaderMap::new(), Bytes::new())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T>(&self) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(&self.body),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn json_decodes_body() {
        let response = Response::new(StatusCode::OK, HeaderMap::new(), r#"{"id":7}"#);
        let item: Item = response.json().expect("body should decode");
        assert_eq!(item, Item { id: 7 });
    }

    #[test]
    fn json_error_carries_body_excerpt() {
        let response = Response::new(StatusCode::OK, HeaderMap::new(), "not json");
        let error = response
            .json::<Item>()
            .expect_err("invalid json should fail");
        match error {
            Error::Deserialize { body, .. } => assert_eq!(body, "not json"),
            other => panic!("unexpected error variant: {other}"),
        }
    }
}
