use std::sync::Arc;
use std::time::{Duration, Instant};

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{Instrument, debug, info_span, warn};

use crate::ReqpipeResult;
use crate::codec::{Codec, JsonCodec};
use crate::config::ClientProfile;
use crate::error::{Error, TransportError};
use crate::interceptor::{
    Interceptor, InterceptorChain, ResponseInterceptor, ResponseInterceptorChain,
};
use crate::logger::{LogLevel, Logger, TracingLogger};
use crate::metrics::{MetricsCollector, MetricsGuard};
use crate::request::{Request, RequestBuilder, TransportRequest};
use crate::response::{Response, TransportResponse};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::{HyperTransport, Transport};
use crate::util::{parse_header_name, parse_header_value, redact_uri_for_logs, truncate_body};

const DEFAULT_CLIENT_NAME: &str = "reqpipe";

pub struct ClientBuilder<C = JsonCodec> {
    client_name: String,
    transport: Option<Arc<dyn Transport>>,
    codec: C,
    default_headers: HeaderMap,
    retry_policy: Option<RetryPolicy>,
    interceptors: InterceptorChain,
    response_interceptors: ResponseInterceptorChain,
    logger: Option<Arc<dyn Logger>>,
    log_level: Option<LogLevel>,
    metrics: Option<MetricsCollector>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    profile: ClientProfile,
}

impl ClientBuilder<JsonCodec> {
    pub(crate) fn new() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            transport: None,
            codec: JsonCodec,
            default_headers: HeaderMap::new(),
            retry_policy: None,
            interceptors: InterceptorChain::new(),
            response_interceptors: ResponseInterceptorChain::new(),
            logger: None,
            log_level: None,
            metrics: None,
            request_timeout: None,
            connect_timeout: None,
            profile: ClientProfile::default(),
        }
    }
}

impl<C> ClientBuilder<C>
where
    C: Codec,
{
    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Replaces the default hyper transport. Timeouts set on this builder
    /// only apply to the default transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn codec<C2>(self, codec: C2) -> ClientBuilder<C2>
    where
        C2: Codec,
    {
        ClientBuilder {
            client_name: self.client_name,
            transport: self.transport,
            codec,
            default_headers: self.default_headers,
            retry_policy: self.retry_policy,
            interceptors: self.interceptors,
            response_interceptors: self.response_interceptors,
            logger: self.logger,
            log_level: self.log_level,
            metrics: self.metrics,
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            profile: self.profile,
        }
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn response_interceptor(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.response_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Takes precedence over [`log_level`](Self::log_level).
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Installs a [`TracingLogger`] at `log_level`.
    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = Some(log_level);
        self
    }

    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> ReqpipeResult<Self> {
        let header_name = parse_header_name(name)?;
        let header_value = parse_header_value(name, value)?;
        Ok(self.default_header(header_name, header_value))
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    /// Explicit settings on this builder override the profile's defaults.
    pub fn profile(mut self, profile: ClientProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn try_build(self) -> ReqpipeResult<Client<C>> {
        let defaults = self.profile.defaults();
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let transport = HyperTransport::builder()
                    .request_timeout(self.request_timeout.unwrap_or(defaults.request_timeout))
                    .connect_timeout(self.connect_timeout.unwrap_or(defaults.connect_timeout))
                    .build()?;
                Arc::new(transport) as Arc<dyn Transport>
            }
        };
        let logger = self.logger.or_else(|| {
            self.log_level
                .map(|level| Arc::new(TracingLogger::new(level)) as Arc<dyn Logger>)
        });

        Ok(Client {
            inner: Arc::new(ClientInner {
                client_name: self.client_name,
                transport,
                codec: self.codec,
                default_headers: self.default_headers,
                retry_policy: self.retry_policy.unwrap_or(defaults.retry_policy),
                interceptors: self.interceptors,
                response_interceptors: self.response_interceptors,
                logger,
                metrics: self.metrics,
            }),
        })
    }

    /// # Panics
    ///
    /// Panics if the default transport cannot be initialized.
    pub fn build(self) -> Client<C> {
        self.try_build()
            .unwrap_or_else(|error| panic!("failed to build reqpipe client: {error}"))
    }
}

/// Executes [`Request`]s through interceptors, retries and status validation.
///
/// Cloning is cheap; clones share the transport, interceptors and metrics.
pub struct Client<C = JsonCodec> {
    inner: Arc<ClientInner<C>>,
}

struct ClientInner<C> {
    client_name: String,
    transport: Arc<dyn Transport>,
    codec: C,
    default_headers: HeaderMap,
    retry_policy: RetryPolicy,
    interceptors: InterceptorChain,
    response_interceptors: ResponseInterceptorChain,
    logger: Option<Arc<dyn Logger>>,
    metrics: Option<MetricsCollector>,
}

impl<C> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> std::fmt::Debug for Client<C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("client_name", &self.inner.client_name)
            .field("retry_policy", &self.inner.retry_policy)
            .field("interceptors", &self.inner.interceptors)
            .field("response_interceptors", &self.inner.response_interceptors)
            .field("metrics", &self.inner.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl Client<JsonCodec> {
    pub fn builder() -> ClientBuilder<JsonCodec> {
        ClientBuilder::new()
    }
}

impl<C> Client<C>
where
    C: Codec,
{
    pub fn client_name(&self) -> &str {
        &self.inner.client_name
    }

    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    pub fn metrics(&self) -> Option<&MetricsCollector> {
        self.inner.metrics.as_ref()
    }

    /// Sends `request` and decodes a 2xx payload into `T`.
    ///
    /// Decode failures are returned as [`Error::Decode`] and are never retried.
    pub async fn execute<T, B>(&self, request: &Request<B>) -> ReqpipeResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let (transport_request, response) = self.send_with_retry(request).await?;
        response.decode(&self.inner.codec).inspect_err(|error| {
            if let Some(logger) = &self.inner.logger {
                logger.log_error(error, &transport_request);
            }
        })
    }

    /// Sends `request` and returns the undecoded 2xx response.
    pub async fn execute_raw<B>(&self, request: &Request<B>) -> ReqpipeResult<Response>
    where
        B: Serialize + Sync,
    {
        self.send_with_retry(request)
            .await
            .map(|(_, response)| response)
    }

    async fn send_with_retry<B>(
        &self,
        request: &Request<B>,
    ) -> ReqpipeResult<(TransportRequest, Response)>
    where
        B: Serialize + Sync,
    {
        let inner = &*self.inner;
        let mut transport_request = RequestBuilder::new(&inner.codec)
            .default_headers(&inner.default_headers)
            .build(request)?;
        inner.interceptors.apply(&mut transport_request);

        let method = transport_request.method();
        let redacted_uri = redact_uri_for_logs(transport_request.url().as_str());
        if let Some(logger) = &inner.logger {
            logger.log_request(&transport_request);
        }
        let metrics_guard = inner
            .metrics
            .as_ref()
            .map(|metrics| metrics.track(transport_request.id()));
        let started = Instant::now();
        let retry_policy = &inner.retry_policy;
        let max_attempts = retry_policy.configured_max_attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let span = info_span!(
                "reqpipe.request",
                client = %inner.client_name,
                request_id = %transport_request.id(),
                method = %method,
                uri = %redacted_uri,
                attempt = attempt,
                max_attempts = max_attempts
            );
            let attempt_started = Instant::now();
            let outcome = self
                .send_attempt(&transport_request, metrics_guard.as_ref())
                .instrument(span.clone())
                .await;

            let (error, decision, response_headers) = match outcome {
                Ok(response) if response.status().is_success() => {
                    span.in_scope(|| {
                        debug!(
                            status = response.status().as_u16(),
                            elapsed_ms = attempt_started.elapsed().as_millis() as u64,
                            "request completed"
                        )
                    });
                    if let Some(logger) = &inner.logger {
                        logger.log_response(&transport_request, &response);
                    }
                    let request_metrics = match metrics_guard {
                        Some(guard) => {
                            guard
                                .collector()
                                .record_succeeded(response.status(), started.elapsed());
                            guard.finish()
                        }
                        None => None,
                    };
                    let (status, headers, body) = response.into_parts();
                    let response = Response::new(status, headers, body, request_metrics);
                    return Ok((transport_request, response));
                }
                Ok(response) => {
                    let status = response.status();
                    let error = Error::HttpStatus {
                        status: status.as_u16(),
                        method,
                        uri: redacted_uri.clone(),
                        body: truncate_body(response.body()),
                    };
                    let decision = RetryDecision {
                        attempt,
                        max_attempts,
                        method,
                        uri: redacted_uri.clone(),
                        status: Some(status),
                        transport_error_kind: None,
                    };
                    let (_, headers, _) = response.into_parts();
                    (error, decision, Some(headers))
                }
                Err(source) => {
                    let kind = source.kind();
                    let error = Error::Transport {
                        kind,
                        method,
                        uri: redacted_uri.clone(),
                        source: source.into_source(),
                    };
                    let decision = RetryDecision {
                        attempt,
                        max_attempts,
                        method,
                        uri: redacted_uri.clone(),
                        status: None,
                        transport_error_kind: Some(kind),
                    };
                    (error, decision, None)
                }
            };

            if let Some(logger) = &inner.logger {
                logger.log_error(&error, &transport_request);
            }

            if retry_policy.should_retry(&decision) {
                let retry_delay = retry_policy.retry_delay(attempt, response_headers.as_ref());
                span.in_scope(|| {
                    warn!(
                        delay_ms = retry_delay.as_millis() as u64,
                        error = %error,
                        "retrying request"
                    )
                });
                if let Some(guard) = &metrics_guard {
                    guard.collector().record_retry();
                }
                last_error = Some(error);
                if !retry_delay.is_zero() {
                    sleep(retry_delay).await;
                }
                continue;
            }

            return Err(finish_failure(error, metrics_guard, started));
        }

        let error = last_error.unwrap_or_else(|| Error::MaxRetriesExceeded {
            attempts: max_attempts,
            method,
            uri: redacted_uri,
        });
        Err(finish_failure(error, metrics_guard, started))
    }

    async fn send_attempt(
        &self,
        transport_request: &TransportRequest,
        metrics_guard: Option<&MetricsGuard>,
    ) -> Result<TransportResponse, TransportError> {
        debug!("sending request");
        let mut response = self.inner.transport.send(transport_request).await?;
        if let Some(guard) = metrics_guard {
            guard.record_response_start();
        }
        self.inner.response_interceptors.apply(&mut response);
        Ok(response)
    }
}

fn finish_failure(error: Error, metrics_guard: Option<MetricsGuard>, started: Instant) -> Error {
    if let Some(guard) = metrics_guard {
        guard.collector().record_failed(&error, started.elapsed());
        let _ = guard.finish();
    }
    error
}
