//! The HTTP transport seam.
//!
//! The server talks to the driver through the [`HttpClient`] trait, so the
//! transport can be swapped out (for tests, proxies, or exotic runtimes)
//! without touching any protocol logic. The stock implementation drives
//! hyper's pooled client.

use futures_util::future::BoxFuture;
use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::error::CmdError;

/// A single HTTP request to a WebDriver server.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The request method.
    pub method: Method,
    /// The absolute request URL. Userinfo, if any, has already been folded
    /// into an `Authorization` header by the caller.
    pub url: Url,
    /// All request headers.
    pub headers: HeaderMap,
    /// The serialized request body, if there is one.
    pub body: Option<String>,
}

/// A response from a WebDriver server.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: u16,
    /// All response headers.
    pub headers: HeaderMap,
    /// The response body, decoded as UTF-8 (lossily).
    pub body: String,
}

/// The transport contract: send one request, produce one response.
///
/// Implementations must be usable from multiple sessions concurrently; each
/// session serializes its own requests, but two sessions sharing a server
/// may overlap.
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request and return the response.
    ///
    /// Transport-level failures map to [`CmdError::Failed`] /
    /// [`CmdError::Lost`]; any HTTP response, including error statuses, is
    /// returned as `Ok`.
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, CmdError>>;
}

#[cfg(feature = "rustls-tls")]
type Connector = hyper_rustls::HttpsConnector<HttpConnector>;
#[cfg(all(feature = "native-tls", not(feature = "rustls-tls")))]
type Connector = hyper_tls::HttpsConnector<HttpConnector>;
#[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
type Connector = HttpConnector;

#[cfg(feature = "rustls-tls")]
fn connector() -> Connector {
    hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build()
}

#[cfg(all(feature = "native-tls", not(feature = "rustls-tls")))]
fn connector() -> Connector {
    hyper_tls::HttpsConnector::new()
}

#[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
fn connector() -> Connector {
    HttpConnector::new()
}

/// The stock [`HttpClient`], backed by hyper's pooled legacy client.
///
/// TLS support follows the crate features: `native-tls` (default) or
/// `rustls-tls`; with neither, only plain `http://` endpoints work.
#[derive(Debug, Clone)]
pub struct HyperClient {
    client: Client<Connector, http_body_util::Full<Bytes>>,
}

impl HyperClient {
    /// Create a new client.
    pub fn new() -> Self {
        HyperClient {
            client: Client::builder(TokioExecutor::new()).build(connector()),
        }
    }
}

impl Default for HyperClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for HyperClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, CmdError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut builder = http::Request::builder()
                .method(request.method)
                .uri(request.url.as_str());
            for (name, value) in request.headers.iter() {
                builder = builder.header(name, value);
            }
            let body = http_body_util::Full::new(Bytes::from(
                request.body.unwrap_or_default().into_bytes(),
            ));
            let req = builder.body(body).map_err(|e| {
                CmdError::Lost(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;

            let response = client.request(req).await?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let collected = response.into_body().collect().await?;
            let body = String::from_utf8_lossy(&collected.to_bytes()).into_owned();
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}
