use thiserror::Error;

use crate::method::HttpMethod;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Timeout,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Timeout => "timeout",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Failure reported by a [`Transport`](crate::Transport) below the HTTP layer.
#[derive(Debug, Error)]
#[error("{kind} error: {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    #[source]
    source: BoxError,
}

impl TransportError {
    pub fn new(
        kind: TransportErrorKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub(crate) fn into_source(self) -> BoxError {
        self.source
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUrl,
    InvalidHeaderName,
    InvalidHeaderValue,
    Encode,
    Transport,
    HttpStatus,
    Decode,
    MaxRetriesExceeded,
    TransportInit,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::Encode => "encode",
            Self::Transport => "transport",
            Self::HttpStatus => "http_status",
            Self::Decode => "decode",
            Self::MaxRetriesExceeded => "max_retries_exceeded",
            Self::TransportInit => "transport_init",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request url: {url}")]
    InvalidUrl { url: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to encode request body: {source}")]
    Encode {
        #[source]
        source: BoxError,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: HttpMethod,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("http status error {status} for {method} {uri}: {body}")]
    HttpStatus {
        status: u16,
        method: HttpMethod,
        uri: String,
        body: String,
    },
    #[error("failed to decode response body: {source}; body={body}")]
    Decode {
        #[source]
        source: BoxError,
        body: String,
    },
    #[error("gave up after {attempts} attempts for {method} {uri}")]
    MaxRetriesExceeded {
        attempts: usize,
        method: HttpMethod,
        uri: String,
    },
    #[error("failed to initialize http transport: {message}")]
    TransportInit { message: String },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::Encode { .. } => ErrorCode::Encode,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::Decode { .. } => ErrorCode::Decode,
            Self::MaxRetriesExceeded { .. } => ErrorCode::MaxRetriesExceeded,
            Self::TransportInit { .. } => ErrorCode::TransportInit,
        }
    }

    /// HTTP status of the failed response, if the failure was an HTTP status error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn transport_error_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Errors raised before the first attempt; these never reach the retry loop.
    pub const fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. }
                | Self::InvalidHeaderName { .. }
                | Self::InvalidHeaderValue { .. }
                | Self::Encode { .. }
        )
    }

    pub(crate) fn metrics_key(&self) -> String {
        match self {
            Self::Transport { kind, .. } => format!("transport:{kind}"),
            Self::HttpStatus { status, .. } => format!("http_status:{status}"),
            other => other.code().as_str().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorCode, TransportError, TransportErrorKind};
    use crate::method::HttpMethod;

    #[test]
    fn error_codes_are_stable_strings() {
        let error = Error::HttpStatus {
            status: 503,
            method: HttpMethod::Get,
            uri: "https://api.example.com/users".to_owned(),
            body: "busy".to_owned(),
        };
        assert_eq!(error.code(), ErrorCode::HttpStatus);
        assert_eq!(error.code().as_str(), "http_status");
        assert_eq!(error.status(), Some(503));
        assert_eq!(error.metrics_key(), "http_status:503");
        assert!(!error.is_construction_error());
    }

    #[test]
    fn transport_error_keeps_kind_and_message() {
        let error = TransportError::new(TransportErrorKind::Dns, "no such host");
        assert_eq!(error.kind(), TransportErrorKind::Dns);
        assert_eq!(error.to_string(), "dns error: no such host");
    }

    #[test]
    fn invalid_url_is_a_construction_error() {
        let error = Error::InvalidUrl {
            url: "not a url".to_owned(),
        };
        assert!(error.is_construction_error());
        assert_eq!(error.metrics_key(), "invalid_url");
    }
}
