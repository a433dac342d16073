use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;

use crate::ReqpipeResult;
use crate::error::{Error, TransportError, TransportErrorKind};
use crate::request::TransportRequest;
use crate::response::TransportResponse;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

/// Sends one attempt and returns the full response.
///
/// Any response that arrives, whatever its status, is `Ok`; `Err` means no
/// response was received.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T> Transport for std::sync::Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request).await
    }
}

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// [`Transport`] over a pooled hyper client with rustls (ring) and webpki roots.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    request_timeout: Duration,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct HyperTransportBuilder {
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl HyperTransportBuilder {
    /// Upper bound for one attempt, covering connect, send and body read.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn build(self) -> ReqpipeResult<HyperTransport> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(self.connect_timeout));

        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|source| Error::TransportInit {
                message: source.to_string(),
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(DEFAULT_POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(DEFAULT_POOL_MAX_IDLE_PER_HOST)
            .build(https);

        Ok(HyperTransport {
            client,
            request_timeout: self.request_timeout,
        })
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    pub fn new() -> ReqpipeResult<Self> {
        Self::builder().build()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn send_once(
        &self,
        request: http::Request<Full<Bytes>>,
    ) -> Result<TransportResponse, TransportError> {
        let response = self.client.request(request).await.map_err(|source| {
            let kind = classify_transport_error(&source);
            TransportError::new(kind, source)
        })?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|source| TransportError::new(TransportErrorKind::Read, source))?
            .to_bytes();
        Ok(TransportResponse::new(parts.status, parts.headers, body))
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let http_request = to_http_request(request)?;
        match timeout(self.request_timeout, self.send_once(http_request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::new(
                TransportErrorKind::Timeout,
                format!(
                    "no response within {}ms",
                    self.request_timeout.as_millis()
                ),
            )),
        }
    }
}

fn to_http_request(request: &TransportRequest) -> Result<http::Request<Full<Bytes>>, TransportError> {
    let body = request.body().cloned().unwrap_or_default();
    let mut http_request = http::Request::builder()
        .method(Method::from(request.method()))
        .uri(request.url().as_str())
        .body(Full::new(body))
        .map_err(|source| TransportError::new(TransportErrorKind::Other, source))?;
    *http_request.headers_mut() = request.headers().clone();
    Ok(http_request)
}

fn classify_transport_error(error: &hyper_util::client::legacy::Error) -> TransportErrorKind {
    let text = error.to_string().to_ascii_lowercase();
    if error.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        if text.contains("timed out") {
            return TransportErrorKind::Timeout;
        }
        return TransportErrorKind::Connect;
    }

    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::header::{CONTENT_TYPE, HeaderValue};
    use http::Method;
    use url::Url;

    use super::{HyperTransport, to_http_request};
    use crate::method::HttpMethod;
    use crate::request::TransportRequest;

    #[test]
    fn http_request_carries_method_uri_headers_and_body() {
        let url = Url::parse("https://api.example.com/users?page=2").expect("static url parses");
        let mut request = TransportRequest::new(HttpMethod::Patch, url);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.set_body(Some(Bytes::from_static(b"{}")));

        let http_request = to_http_request(&request).expect("request converts");
        assert_eq!(http_request.method(), Method::PATCH);
        assert_eq!(
            http_request.uri().to_string(),
            "https://api.example.com/users?page=2"
        );
        assert_eq!(http_request.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn builder_clamps_zero_timeouts() {
        let transport = HyperTransport::builder()
            .request_timeout(std::time::Duration::ZERO)
            .build()
            .expect("transport builds");
        assert_eq!(
            transport.request_timeout(),
            std::time::Duration::from_millis(1)
        );
    }
}
