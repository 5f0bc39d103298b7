use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use http::StatusCode;
use relay::prelude::{
    CheckStatus, Client, Error, ErrorCode, PipelineConfig, Request, RequestOptions, Transport,
};
use relay::{HyperTransport, TransportErrorKind};
use serde_json::{Value, json};

#[derive(Clone)]
struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Duration,
}

impl MockResponse {
    fn new(
        status: u16,
        headers: Vec<(impl Into<String>, impl Into<String>)>,
        body: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
            body: body.into().into_bytes(),
            delay,
        }
    }
}

#[derive(Clone, Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

struct MockServer {
    base_url: String,
    served: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    join: Option<JoinHandle<()>>,
}

impl MockServer {
    fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let address = listener.local_addr().expect("read local address");
        listener
            .set_nonblocking(true)
            .expect("set listener nonblocking");

        let served = Arc::new(AtomicUsize::new(0));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let served_clone = Arc::clone(&served);
        let captured_clone = Arc::clone(&captured);

        let join = thread::spawn(move || {
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            let mut response_index = 0;

            while response_index < responses.len() && std::time::Instant::now() < deadline {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let _ = stream.set_nonblocking(false);
                        if let Ok(request) = read_request(&mut stream) {
                            captured_clone
                                .lock()
                                .expect("lock captured requests")
                                .push(request);
                        }

                        served_clone.fetch_add(1, Ordering::SeqCst);
                        let response = &responses[response_index];
                        response_index += 1;

                        if !response.delay.is_zero() {
                            thread::sleep(response.delay);
                        }

                        let _ = write_response(&mut stream, response);
                    }
                    Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{address}"),
            served,
            captured,
            join: Some(join),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.captured
            .lock()
            .expect("lock captured requests")
            .clone()
    }

    fn served_count(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<CapturedRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(1)))?;

    let mut raw = Vec::new();
    loop {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);
        if find_header_end(&raw).is_some() {
            break;
        }
    }

    let header_end = find_header_end(&raw).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "malformed request without header terminator",
        )
    })?;

    let header_text = String::from_utf8_lossy(&raw[..header_end]);
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "missing request line")
    })?;
    let mut request_line_parts = request_line.split_whitespace();
    let method = request_line_parts.next().unwrap_or_default().to_owned();
    let path = request_line_parts.next().unwrap_or_default().to_owned();

    let mut headers = BTreeMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = raw[header_end + 4..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn write_response(stream: &mut TcpStream, response: &MockResponse) -> std::io::Result<()> {
    let body = &response.body;
    let mut raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        status_text(response.status),
        body.len()
    );
    for (name, value) in &response.headers {
        raw.push_str(name);
        raw.push_str(": ");
        raw.push_str(value);
        raw.push_str("\r\n");
    }
    raw.push_str("\r\n");

    stream.write_all(raw.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn no_headers() -> Vec<(String, String)> {
    Vec::new()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hyper_transport_sends_request_and_reads_response() {
    let server = MockServer::start(vec![MockResponse::new(
        200,
        vec![("Content-Type", "application/json"), ("X-Trace", "t-1")],
        r#"{"ok":true}"#,
        Duration::ZERO,
    )]);
    let transport = HyperTransport::new().expect("transport should build");

    let request = Request::post(server.url("/v1/items?dry_run=1"))
        .with_header("x-request-id", "req-1")
        .expect("valid header")
        .with_body(r#"{"name":"demo"}"#);
    let response = transport.send(request).await.expect("exchange succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-trace")
            .and_then(|value| value.to_str().ok()),
        Some("t-1")
    );
    let body: Value = response.json().expect("json body");
    assert_eq!(body, json!({ "ok": true }));

    let captured = server.requests();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].method, "POST");
    assert_eq!(captured[0].path, "/v1/items?dry_run=1");
    assert_eq!(
        captured[0].headers.get("x-request-id").map(String::as_str),
        Some("req-1")
    );
    assert_eq!(captured[0].body, br#"{"name":"demo"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_pipeline_retries_unavailable_server_then_succeeds() {
    let server = MockServer::start(vec![
        MockResponse::new(503, no_headers(), "busy", Duration::ZERO),
        MockResponse::new(
            201,
            vec![("Content-Type", "application/json")],
            r#"{"id":"item-1"}"#,
            Duration::ZERO,
        ),
    ]);
    let client = Client::builder()
        .base_url(server.base_url.clone())
        .pipeline(
            PipelineConfig::default()
                .with_retries(2)
                .with_backoff(Duration::from_millis(1), Some(Duration::from_millis(5)))
                .with_timeout(Some(Duration::from_secs(1))),
        )
        .interceptor(CheckStatus::default())
        .try_build()
        .expect("client should build");

    let response = client
        .request(
            "/v1/items",
            RequestOptions::new()
                .method(http::Method::POST)
                .json(&json!({ "name": "demo" }))
                .expect("serialize payload"),
        )
        .await
        .expect("second attempt succeeds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().expect("json body");
    assert_eq!(body["id"], "item-1");
    assert_eq!(server.served_count(), 2);
    let captured = server.requests();
    assert!(
        captured
            .iter()
            .all(|request| request.body == br#"{"name":"demo"}"#),
        "every attempt sends the same body"
    );
    assert_eq!(
        captured[0].headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_interceptor_bounds_a_slow_server() {
    let server = MockServer::start(vec![MockResponse::new(
        200,
        no_headers(),
        "late",
        Duration::from_millis(300),
    )]);
    let client = Client::builder()
        .pipeline(
            PipelineConfig::default()
                .with_retries(0)
                .with_timeout(Some(Duration::from_millis(50))),
        )
        .try_build()
        .expect("client should build");

    let error = client
        .get(server.url("/slow"))
        .await
        .expect_err("server is too slow");
    assert_eq!(error.code(), ErrorCode::Timeout);
    assert!(error.is_timeout());
    assert_eq!(
        error.request().map(Request::url),
        Some(server.url("/slow").as_str())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_response_body_is_rejected() {
    let server = MockServer::start(vec![MockResponse::new(
        200,
        no_headers(),
        "x".repeat(64),
        Duration::ZERO,
    )]);
    let transport = HyperTransport::builder()
        .max_response_body_bytes(16)
        .build()
        .expect("transport should build");

    let error = transport
        .send(Request::get(server.url("/large")))
        .await
        .expect_err("body exceeds limit");
    match error {
        Error::ResponseBodyTooLarge {
            limit_bytes,
            actual_bytes,
            ..
        } => {
            assert_eq!(limit_bytes, 16);
            assert!(actual_bytes > 16);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connection_is_classified_as_connect_error() {
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
        listener.local_addr().expect("read probe address")
    };
    let transport = HyperTransport::builder()
        .connect_timeout(Duration::from_millis(500))
        .build()
        .expect("transport should build");

    let error = transport
        .send(Request::get(format!("http://{address}/v1/items")))
        .await
        .expect_err("nothing listens on the probe port");
    match error {
        Error::Transport { kind, .. } => assert_eq!(kind, TransportErrorKind::Connect),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn relative_url_without_base_is_invalid() {
    let transport = HyperTransport::new().expect("transport should build");
    let error = transport
        .send(Request::get("/v1/items"))
        .await
        .expect_err("relative url cannot be sent");
    assert_eq!(error.code(), ErrorCode::InvalidUri);
}
