use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Error;
use crate::request::TransportRequest;
use crate::response::TransportResponse;
use crate::util::{headers_for_logs, redact_uri_for_logs, truncate_body};

pub(crate) const LOG_TARGET: &str = "reqpipe::http";

/// Sink for request, response and error events. Implementations must not
/// block or panic.
pub trait Logger: Send + Sync {
    fn log_request(&self, request: &TransportRequest);

    fn log_response(&self, request: &TransportRequest, response: &TransportResponse);

    fn log_error(&self, error: &Error, request: &TransportRequest);
}

impl<T> Logger for Arc<T>
where
    T: Logger + ?Sized,
{
    fn log_request(&self, request: &TransportRequest) {
        (**self).log_request(request)
    }

    fn log_response(&self, request: &TransportRequest, response: &TransportResponse) {
        (**self).log_response(request, response)
    }

    fn log_error(&self, error: &Error, request: &TransportRequest) {
        (**self).log_error(error, request)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    None,
    #[default]
    Minimal,
    Verbose,
}

/// Emits `tracing` events under the `reqpipe::http` target.
///
/// `Minimal` logs method, redacted url and status. `Verbose` adds headers,
/// with credentials redacted, and bodies truncated to 2048 characters.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger {
    level: LogLevel,
}

impl TracingLogger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }
}

fn body_for_logs(body: Option<&[u8]>) -> String {
    body.map(truncate_body).unwrap_or_default()
}

impl Logger for TracingLogger {
    fn log_request(&self, request: &TransportRequest) {
        let uri = redact_uri_for_logs(request.url().as_str());
        match self.level {
            LogLevel::None => {}
            LogLevel::Minimal => info!(
                target: LOG_TARGET,
                request_id = %request.id(),
                method = %request.method(),
                uri = %uri,
                "request"
            ),
            LogLevel::Verbose => info!(
                target: LOG_TARGET,
                request_id = %request.id(),
                method = %request.method(),
                uri = %uri,
                headers = %headers_for_logs(request.headers()),
                body = %body_for_logs(request.body().map(|body| &body[..])),
                "request"
            ),
        }
    }

    fn log_response(&self, request: &TransportRequest, response: &TransportResponse) {
        match self.level {
            LogLevel::None => {}
            LogLevel::Minimal => info!(
                target: LOG_TARGET,
                request_id = %request.id(),
                status = response.status().as_u16(),
                "response"
            ),
            LogLevel::Verbose => info!(
                target: LOG_TARGET,
                request_id = %request.id(),
                status = response.status().as_u16(),
                headers = %headers_for_logs(response.headers()),
                body = %body_for_logs(Some(&response.body()[..])),
                "response"
            ),
        }
    }

    fn log_error(&self, error: &Error, request: &TransportRequest) {
        if self.level == LogLevel::None {
            return;
        }
        warn!(
            target: LOG_TARGET,
            request_id = %request.id(),
            method = %request.method(),
            uri = %redact_uri_for_logs(request.url().as_str()),
            code = error.code().as_str(),
            error = %error,
            "request failed"
        );
    }
}
