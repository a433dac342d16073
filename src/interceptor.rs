//! Mutation-only steps applied to requests before they are sent and to
//! responses before their status is validated.
//!
//! Interceptors run in registration order and each one sees the changes made
//! by the ones before it. They cannot abort the pipeline or report errors; a
//! step that needs to fail a request belongs in the transport instead.

use std::sync::Arc;

use http::header::{AUTHORIZATION, HeaderName, HeaderValue};

use crate::ReqpipeResult;
use crate::request::TransportRequest;
use crate::response::TransportResponse;
use crate::util::{parse_header_name, parse_header_value};

pub trait Interceptor: Send + Sync {
    fn intercept(&self, request: &mut TransportRequest);
}

impl<F> Interceptor for F
where
    F: Fn(&mut TransportRequest) + Send + Sync,
{
    fn intercept(&self, request: &mut TransportRequest) {
        self(request)
    }
}

pub trait ResponseInterceptor: Send + Sync {
    fn intercept(&self, response: &mut TransportResponse);
}

impl<F> ResponseInterceptor for F
where
    F: Fn(&mut TransportResponse) + Send + Sync,
{
    fn intercept(&self, response: &mut TransportResponse) {
        self(response)
    }
}

#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn apply(&self, request: &mut TransportRequest) {
        for interceptor in &self.interceptors {
            interceptor.intercept(request);
        }
    }
}

#[derive(Clone, Default)]
pub struct ResponseInterceptorChain {
    interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl std::fmt::Debug for ResponseInterceptorChain {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ResponseInterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl ResponseInterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn with(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn apply(&self, response: &mut TransportResponse) {
        for interceptor in &self.interceptors {
            interceptor.intercept(response);
        }
    }
}

/// Sets one header on every request, replacing any existing value.
#[derive(Clone, Debug)]
pub struct HeaderInterceptor {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderInterceptor {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    pub fn try_new(name: &str, value: &str) -> ReqpipeResult<Self> {
        let header_name = parse_header_name(name)?;
        let header_value = parse_header_value(name, value)?;
        Ok(Self::new(header_name, header_value))
    }
}

impl Interceptor for HeaderInterceptor {
    fn intercept(&self, request: &mut TransportRequest) {
        request
            .headers_mut()
            .insert(self.name.clone(), self.value.clone());
    }
}

#[derive(Clone, Debug)]
pub struct BearerAuth {
    value: HeaderValue,
}

impl BearerAuth {
    pub fn try_new(token: &str) -> ReqpipeResult<Self> {
        let mut value = parse_header_value(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl Interceptor for BearerAuth {
    fn intercept(&self, request: &mut TransportRequest) {
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use http::header::{AUTHORIZATION, HeaderValue};
    use url::Url;

    use super::{
        BearerAuth, HeaderInterceptor, InterceptorChain, ResponseInterceptorChain,
    };
    use crate::method::HttpMethod;
    use crate::request::TransportRequest;
    use crate::response::TransportResponse;

    fn transport_request() -> TransportRequest {
        let url = Url::parse("https://api.example.com/users/1").expect("static url parses");
        TransportRequest::new(HttpMethod::Get, url)
    }

    #[test]
    fn interceptors_run_in_registration_order() {
        let chain = InterceptorChain::new()
            .with(|request: &mut TransportRequest| {
                request
                    .headers_mut()
                    .insert("x-step", HeaderValue::from_static("a"));
            })
            .with(|request: &mut TransportRequest| {
                let seen = request
                    .headers()
                    .get("x-step")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                let value = HeaderValue::from_str(&format!("{seen}b"))
                    .expect("ascii header value is valid");
                request.headers_mut().insert("x-step", value);
            });

        let mut request = transport_request();
        chain.apply(&mut request);
        assert_eq!(request.headers()["x-step"], "ab");
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn later_interceptor_overwrites_earlier_header() {
        let chain = InterceptorChain::new()
            .with(HeaderInterceptor::try_new("x-api-key", "first").expect("valid header"))
            .with(HeaderInterceptor::try_new("X-Api-Key", "second").expect("valid header"));
        let mut request = transport_request();
        chain.apply(&mut request);
        assert_eq!(request.headers()["x-api-key"], "second");
    }

    #[test]
    fn interceptors_may_rewrite_url_and_body() {
        let chain = InterceptorChain::new().with(|request: &mut TransportRequest| {
            request.url_mut().set_path("/v2/users/1");
            request.set_body(Some(bytes::Bytes::from_static(b"{}")));
        });
        let mut request = transport_request();
        let id = request.id();
        chain.apply(&mut request);
        assert_eq!(request.url().path(), "/v2/users/1");
        assert_eq!(request.body().map(|body| &body[..]), Some(&b"{}"[..]));
        assert_eq!(request.id(), id);
    }

    #[test]
    fn bearer_auth_sets_sensitive_authorization() {
        let chain = InterceptorChain::new().with(BearerAuth::try_new("token-1").expect("valid token"));
        let mut request = transport_request();
        chain.apply(&mut request);
        let value = &request.headers()[AUTHORIZATION];
        assert_eq!(value, "Bearer token-1");
        assert!(value.is_sensitive());
    }

    #[test]
    fn empty_chain_leaves_request_untouched() {
        let chain = InterceptorChain::new();
        let mut request = transport_request();
        chain.apply(&mut request);
        assert!(request.headers().is_empty());
        assert!(chain.is_empty());
    }

    #[test]
    fn response_interceptors_run_in_order() {
        let chain = ResponseInterceptorChain::new()
            .with(|response: &mut TransportResponse| {
                response.set_body(b"first".to_vec());
            })
            .with(|response: &mut TransportResponse| {
                let mut body = response.body().to_vec();
                body.extend_from_slice(b"+second");
                response.set_body(body);
                response.set_status(StatusCode::ACCEPTED);
            });
        let mut response =
            TransportResponse::new(StatusCode::OK, http::HeaderMap::new(), b"raw".to_vec());
        chain.apply(&mut response);
        assert_eq!(&response.body()[..], b"first+second");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
