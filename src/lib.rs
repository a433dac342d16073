//! `reqpipe` is a typed HTTP request pipeline: build a request, run it through
//! interceptors, send it with retries and backoff, validate the status and
//! decode the payload.
//!
//! # Quick Start
//!
//! ```no_run
//! use reqpipe::prelude::{Client, LogLevel, MetricsCollector, Request, RetryPolicy};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .client_name("users-sdk")
//!         .retry_policy(RetryPolicy::exponential(3))
//!         .log_level(LogLevel::Minimal)
//!         .metrics(MetricsCollector::new())
//!         .try_default_header("Accept", "application/json")?
//!         .try_build()?;
//!
//!     let user: User = client
//!         .execute(&Request::get("https://api.example.com/users/1"))
//!         .await?;
//!
//!     println!("user {} <{}> id={}", user.name, user.email, user.id);
//!     Ok(())
//! }
//! ```
//!
//! # Retries
//!
//! - Without a policy every request is sent once.
//! - `RetryPolicy::exponential(n)` retries 5xx responses and transport failures.
//! - Construction and decode errors are never retried.

mod client;
mod codec;
mod config;
mod error;
mod interceptor;
mod logger;
mod method;
mod metrics;
mod request;
mod response;
mod retry;
mod transport;
mod util;

pub use crate::client::{Client, ClientBuilder};
pub use crate::codec::{Codec, JsonCodec};
pub use crate::config::{ClientProfile, ProfileDefaults};
pub use crate::error::{BoxError, Error, ErrorCode, TransportError, TransportErrorKind};
pub use crate::interceptor::{
    BearerAuth, HeaderInterceptor, Interceptor, InterceptorChain, ResponseInterceptor,
    ResponseInterceptorChain,
};
pub use crate::logger::{LogLevel, Logger, TracingLogger};
pub use crate::method::HttpMethod;
pub use crate::metrics::{MetricsCollector, MetricsSnapshot, RequestMetrics};
pub use crate::request::{Request, RequestBuilder, RequestId, TransportRequest};
pub use crate::response::{Response, TransportResponse};
pub use crate::retry::{
    AlwaysRetry, Backoff, ExponentialBackoff, FixedBackoff, RetryClassifier, RetryDecision,
    RetryPolicy, ServerErrorRetryClassifier,
};
pub use crate::transport::{HyperTransport, HyperTransportBuilder, Transport};

pub type ReqpipeResult<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientProfile, Error, ErrorCode, HttpMethod, Interceptor,
        InterceptorChain, LogLevel, Logger, MetricsCollector, MetricsSnapshot, ReqpipeResult,
        Request, RequestMetrics, Response, RetryDecision, RetryPolicy, Transport,
        TransportErrorKind, TransportRequest, TransportResponse,
    };
}
