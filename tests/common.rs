//! A scripted in-process WebDriver server.
//!
//! Tests hand it a routing function from `(method, path, body)` to a
//! [`MockResponse`]; every request is recorded with start and finish times
//! so ordering and serialization can be asserted afterwards.

#![allow(dead_code)]

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value as Json};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use hansom::{Capabilities, Server, Session};

pub type Router = Arc<dyn Fn(&str, &str, &Json) -> MockResponse + Send + Sync>;

/// What the mock should answer for one request.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Option<Json>,
    pub text: Option<String>,
    pub location: Option<String>,
    pub delay: Duration,
}

impl MockResponse {
    /// A JsonWire success envelope around `value`.
    pub fn ok(value: Json) -> MockResponse {
        MockResponse::raw(200, json!({ "status": 0, "sessionId": null, "value": value }))
    }

    /// A JSON response sent exactly as given.
    pub fn raw(status: u16, body: Json) -> MockResponse {
        MockResponse {
            status,
            body: Some(body),
            text: None,
            location: None,
            delay: Duration::ZERO,
        }
    }

    /// A JsonWire error envelope.
    pub fn error(status: u16, wire_status: u16, message: &str) -> MockResponse {
        MockResponse::raw(
            status,
            json!({ "status": wire_status, "value": { "message": message } }),
        )
    }

    /// The canonical "unknown command" answer.
    pub fn unknown_command() -> MockResponse {
        MockResponse::error(404, 9, "unknown command")
    }

    /// A plain-text response.
    pub fn text(status: u16, text: &str) -> MockResponse {
        MockResponse {
            status,
            body: None,
            text: Some(text.to_string()),
            location: None,
            delay: Duration::ZERO,
        }
    }

    /// An empty 204.
    pub fn no_content() -> MockResponse {
        MockResponse {
            status: 204,
            body: None,
            text: None,
            location: None,
            delay: Duration::ZERO,
        }
    }

    /// A redirect to `location`.
    pub fn redirect(location: &str) -> MockResponse {
        MockResponse {
            status: 302,
            body: None,
            text: None,
            location: Some(location.to_string()),
            delay: Duration::ZERO,
        }
    }

    /// Hold the response back for `ms` milliseconds.
    pub fn delay(mut self, ms: u64) -> MockResponse {
        self.delay = Duration::from_millis(ms);
        self
    }
}

/// One request as the mock server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Json,
    pub authorization: Option<String>,
    pub content_length: Option<String>,
    pub started: Instant,
    pub finished: Instant,
}

pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    active: Arc<AtomicI64>,
    max_active: Arc<AtomicI64>,
}

impl MockServer {
    pub async fn start<F>(router: F) -> MockServer
    where
        F: Fn(&str, &str, &Json) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(AtomicI64::new(0));
        let max_active = Arc::new(AtomicI64::new(0));
        let router: Router = Arc::new(router);

        {
            let requests = requests.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            tokio::spawn(async move {
                loop {
                    let (stream, _) = match listener.accept().await {
                        Ok(accepted) => accepted,
                        Err(_) => break,
                    };
                    let io = TokioIo::new(stream);
                    let requests = requests.clone();
                    let active = active.clone();
                    let max_active = max_active.clone();
                    let router = router.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |request: Request<Incoming>| {
                            handle(
                                request,
                                router.clone(),
                                requests.clone(),
                                active.clone(),
                                max_active.clone(),
                            )
                        });
                        let _ = http1::Builder::new().serve_connection(io, service).await;
                    });
                }
            });
        }

        MockServer {
            addr,
            requests,
            active,
            max_active,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests matching the given path suffix.
    pub fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.ends_with(suffix))
            .collect()
    }

    /// The largest number of requests that were ever in flight at once.
    pub fn max_concurrency(&self) -> i64 {
        self.max_active.load(Ordering::SeqCst)
    }
}

async fn handle(
    request: Request<Incoming>,
    router: Router,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    active: Arc<AtomicI64>,
    max_active: Arc<AtomicI64>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let current = active.fetch_add(1, Ordering::SeqCst) + 1;
    max_active.fetch_max(current, Ordering::SeqCst);
    let started = Instant::now();

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let authorization = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_length = request
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = request
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    let body: Json = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Json::Null)
    };

    let mock = router(&method, &path, &body);
    if !mock.delay.is_zero() {
        tokio::time::sleep(mock.delay).await;
    }

    let finished = Instant::now();
    requests.lock().unwrap().push(RecordedRequest {
        method,
        path,
        body,
        authorization,
        content_length,
        started,
        finished,
    });
    active.fetch_sub(1, Ordering::SeqCst);

    let mut builder = Response::builder().status(mock.status);
    if let Some(location) = &mock.location {
        builder = builder.header(http::header::LOCATION, location);
    }
    let payload = if let Some(body) = &mock.body {
        builder = builder.header(http::header::CONTENT_TYPE, "application/json;charset=UTF-8");
        Bytes::from(serde_json::to_vec(body).unwrap())
    } else if let Some(text) = &mock.text {
        builder = builder.header(http::header::CONTENT_TYPE, "text/plain");
        Bytes::from(text.clone().into_bytes())
    } else {
        Bytes::new()
    };

    Ok(builder.body(Full::new(payload)).unwrap())
}

/// Start a session against the mock without running the capability filler.
/// The session's capabilities are whatever the mock's `POST /session`
/// answer carried (see [`with_handshake`]).
pub async fn create_mock_session(mock: &MockServer) -> (Server, Session) {
    let server = Server::new(&mock.url()).expect("mock url");
    let mut desired = Capabilities::new();
    desired.insert("browserName", json!("mockbrowser"));
    desired.insert("fixSessionCapabilities", json!(false));
    let session = server.create_session(desired).await.expect("create session");
    (server, session)
}

/// A router for the session-creation handshake: answers `POST /session`
/// with the given capabilities and delegates everything else.
pub fn with_handshake<F>(
    session_capabilities: Json,
    rest: F,
) -> impl Fn(&str, &str, &Json) -> MockResponse + Send + Sync + 'static
where
    F: Fn(&str, &str, &Json) -> MockResponse + Send + Sync + 'static,
{
    move |method, path, body| {
        if method == "POST" && path == "/session" {
            return MockResponse::raw(
                200,
                json!({
                    "status": 0,
                    "sessionId": "mock-session",
                    "value": session_capabilities.clone(),
                }),
            );
        }
        rest(method, path, body)
    }
}
