use std::collections::BTreeMap;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::ReqpipeResult;
use crate::codec::Codec;
use crate::error::Error;
use crate::method::HttpMethod;
use crate::util::{merge_headers, parse_header_name, parse_header_value, parse_request_url};

/// Identity of one in-flight transport request, stable across interceptors and retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, formatter)
    }
}

/// A caller-side request description.
///
/// Header names are case-insensitive and the last write for a name wins. Query
/// values are scalars: strings are sent as-is, numbers and booleans use their
/// canonical text, and anything without a scalar text form (null, arrays,
/// objects) is skipped when the request is built.
#[derive(Clone, Debug)]
pub struct Request<B = ()> {
    method: HttpMethod,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<B>,
    query: BTreeMap<String, Value>,
}

impl Request<()> {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            query: BTreeMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }
}

impl<B> Request<B> {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn headers<K, V, I>(self, headers: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        headers
            .into_iter()
            .fold(self, |request, (name, value)| request.header(name, value))
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn query_pairs<K, V, I>(self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs
            .into_iter()
            .fold(self, |request, (name, value)| request.query(name, value))
    }

    pub fn body<T>(self, body: T) -> Request<T> {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: Some(body),
            query: self.query,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn header_entries(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body_ref(&self) -> Option<&B> {
        self.body.as_ref()
    }

    pub fn query_entries(&self) -> &BTreeMap<String, Value> {
        &self.query
    }
}

/// The wire-ready form of a [`Request`], as handed to interceptors and the transport.
///
/// Interceptors may rewrite the url, headers and body; the method and the
/// request id are fixed once built.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    id: RequestId,
    method: HttpMethod,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl TransportRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            id: RequestId::new(),
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: Option<Bytes>) {
        self.body = body;
    }
}

/// Turns a [`Request`] into a [`TransportRequest`].
pub struct RequestBuilder<'a, C> {
    codec: &'a C,
    default_headers: Option<&'a HeaderMap>,
}

impl<'a, C> RequestBuilder<'a, C>
where
    C: Codec,
{
    pub fn new(codec: &'a C) -> Self {
        Self {
            codec,
            default_headers: None,
        }
    }

    /// Headers applied underneath the request's own headers.
    pub fn default_headers(mut self, default_headers: &'a HeaderMap) -> Self {
        self.default_headers = Some(default_headers);
        self
    }

    pub fn build<B>(&self, request: &Request<B>) -> ReqpipeResult<TransportRequest>
    where
        B: Serialize,
    {
        let mut url = parse_request_url(request.url())?;
        append_query(&mut url, request.query_entries());

        let mut headers = HeaderMap::new();
        for (name, value) in request.header_entries() {
            let header_name = parse_header_name(name)?;
            let header_value = parse_header_value(name, value)?;
            headers.insert(header_name, header_value);
        }
        if let Some(default_headers) = self.default_headers {
            headers = merge_headers(default_headers, &headers);
        }

        let body = match request.body_ref() {
            Some(body) => {
                let encoded = self
                    .codec
                    .encode(body)
                    .map_err(|source| Error::Encode { source })?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static(self.codec.content_type()),
                    );
                }
                Some(encoded)
            }
            None => None,
        };

        Ok(TransportRequest {
            id: RequestId::new(),
            method: request.method(),
            url,
            headers,
            body,
        })
    }
}

fn query_value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn append_query(url: &mut Url, query: &BTreeMap<String, Value>) {
    let pairs: Vec<(&str, String)> = query
        .iter()
        .filter_map(|(name, value)| query_value_text(value).map(|text| (name.as_str(), text)))
        .collect();
    if pairs.is_empty() {
        return;
    }

    let mut serializer = url.query_pairs_mut();
    for (name, value) in &pairs {
        serializer.append_pair(name, value);
    }
}
