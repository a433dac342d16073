use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::ReqpipeResult;
use crate::codec::{Codec, JsonCodec};
use crate::error::Error;
use crate::metrics::RequestMetrics;
use crate::util::truncate_body;

/// What a [`Transport`](crate::Transport) hands back for one attempt.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    pub(crate) fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}

/// A successful (2xx) response with its undecoded payload.
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    metrics: Option<RequestMetrics>,
}

impl Response {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        metrics: Option<RequestMetrics>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            metrics,
        }
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

    /// Timing of the call that produced this response, when a collector was configured.
    pub fn metrics(&self) -> Option<&RequestMetrics> {
        self.metrics.as_ref()
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn decode<T, C>(&self, codec: &C) -> ReqpipeResult<T>
    where
        T: DeserializeOwned,
        C: Codec,
    {
        codec
            .decode(&self.body)
            .map_err(|source| Error::Decode {
                source,
                body: truncate_body(&self.body),
            })
    }

    pub fn json<T>(&self) -> ReqpipeResult<T>
    where
        T: DeserializeOwned,
    {
        self.decode(&JsonCodec)
    }
}
