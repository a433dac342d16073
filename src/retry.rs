use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::{HeaderMap, StatusCode};
use rand::Rng;

use crate::error::TransportErrorKind;
use crate::method::HttpMethod;
use crate::util::parse_retry_after;

const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Outcome of a failed attempt, as seen by a [`RetryClassifier`].
///
/// Exactly one of `status` and `transport_error_kind` is set.
#[derive(Clone, Debug)]
pub struct RetryDecision {
    pub attempt: usize,
    pub max_attempts: usize,
    pub method: HttpMethod,
    pub uri: String,
    pub status: Option<StatusCode>,
    pub transport_error_kind: Option<TransportErrorKind>,
}

pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, decision: &RetryDecision) -> bool;
}

impl<F> RetryClassifier for F
where
    F: Fn(&RetryDecision) -> bool + Send + Sync,
{
    fn should_retry(&self, decision: &RetryDecision) -> bool {
        self(decision)
    }
}

/// Retries 5xx responses and every transport failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerErrorRetryClassifier;

impl RetryClassifier for ServerErrorRetryClassifier {
    fn should_retry(&self, decision: &RetryDecision) -> bool {
        if let Some(status) = decision.status {
            return status.is_server_error();
        }
        decision.transport_error_kind.is_some()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysRetry;

impl RetryClassifier for AlwaysRetry {
    fn should_retry(&self, _decision: &RetryDecision) -> bool {
        true
    }
}

/// Maps a 1-based attempt number to the wait before the next attempt.
pub trait Backoff: Send + Sync {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        self(attempt)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn delay_for_attempt(&self, _attempt: usize) -> Duration {
        self.0
    }
}

/// `base * 2^(attempt - 1)`, optionally capped and jittered.
#[derive(Clone, Copy, Debug)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Option<Duration>,
    jitter_ratio: f64,
}

impl ExponentialBackoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max_delay: None,
            jitter_ratio: 0.0,
        }
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay.max(self.base));
        self
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }

        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = backoff_ms.saturating_sub(jitter_span).max(1);
        let high = backoff_ms.saturating_add(jitter_span).max(low);
        let mut sampled_ms = rand::rng().random_range(low..=high);
        if let Some(max_delay) = self.max_delay {
            let max_ms = max_delay.as_millis().min(u64::MAX as u128) as u64;
            sampled_ms = sampled_ms.min(max_ms.max(1));
        }
        Duration::from_millis(sampled_ms)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_BACKOFF)
    }
}

impl Backoff for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let capped_exponent = attempt.saturating_sub(1).min(31) as u32;
        let delay = self.base.saturating_mul(1_u32 << capped_exponent);
        let delay = match self.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        };
        self.apply_jitter(delay)
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Arc<dyn Backoff>,
    retry_classifier: Arc<dyn RetryClassifier>,
    respect_retry_after: bool,
    max_retry_after: Duration,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("respect_retry_after", &self.respect_retry_after)
            .field("max_retry_after", &self.max_retry_after)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        backoff: impl Backoff + 'static,
        retry_classifier: impl RetryClassifier + 'static,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
            retry_classifier: Arc::new(retry_classifier),
            respect_retry_after: false,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        }
    }

    /// A single attempt, no retries.
    pub fn disabled() -> Self {
        Self::new(1, ExponentialBackoff::default(), ServerErrorRetryClassifier)
    }

    /// Waits `500ms * 2^(attempt - 1)` and retries 5xx responses and transport failures.
    pub fn exponential(max_attempts: usize) -> Self {
        Self::new(
            max_attempts,
            ExponentialBackoff::default(),
            ServerErrorRetryClassifier,
        )
    }

    /// Retries every failure after the same delay, regardless of status.
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self::new(max_attempts, FixedBackoff(delay), AlwaysRetry)
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn retry_classifier(mut self, retry_classifier: Arc<dyn RetryClassifier>) -> Self {
        self.retry_classifier = retry_classifier;
        self
    }

    /// Prefer the server's `Retry-After` over the computed delay for retried HTTP failures.
    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Upper bound for a server-provided `Retry-After` delay. Defaults to 60s.
    pub fn max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    pub fn configured_max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay(&self, attempt: usize) -> Duration {
        self.backoff.delay_for_attempt(attempt.max(1))
    }

    /// Never consults the classifier once `attempt` has reached the attempt limit.
    pub fn should_retry(&self, decision: &RetryDecision) -> bool {
        if decision.attempt >= self.max_attempts {
            return false;
        }
        self.retry_classifier.should_retry(decision)
    }

    pub(crate) fn retry_delay(&self, attempt: usize, response_headers: Option<&HeaderMap>) -> Duration {
        if self.respect_retry_after
            && let Some(headers) = response_headers
            && let Some(delay) = parse_retry_after(headers, SystemTime::now())
        {
            return delay.min(self.max_retry_after);
        }
        self.delay(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use http::header::{HeaderValue, RETRY_AFTER};
    use http::{HeaderMap, StatusCode};

    use super::{ExponentialBackoff, RetryDecision, RetryPolicy};
    use crate::error::TransportErrorKind;
    use crate::method::HttpMethod;
    use crate::retry::Backoff;

    fn decision(
        attempt: usize,
        status: Option<u16>,
        transport_error_kind: Option<TransportErrorKind>,
    ) -> RetryDecision {
        RetryDecision {
            attempt,
            max_attempts: 3,
            method: HttpMethod::Get,
            uri: "https://api.example.com/v1/items".to_owned(),
            status: status.map(|code| StatusCode::from_u16(code).expect("valid status code")),
            transport_error_kind,
        }
    }

    #[test]
    fn exponential_delay_doubles_from_half_a_second() {
        let policy = RetryPolicy::exponential(3);
        assert_eq!(policy.configured_max_attempts(), 3);
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
        assert!(policy.delay(1) < policy.delay(2));
        assert!(policy.delay(2) < policy.delay(3));
    }

    #[test]
    fn exponential_retries_server_errors_only() {
        let policy = RetryPolicy::exponential(3);
        assert!(policy.should_retry(&decision(1, Some(503), None)));
        assert!(policy.should_retry(&decision(1, Some(500), None)));
        assert!(policy.should_retry(&decision(1, Some(599), None)));
        assert!(!policy.should_retry(&decision(1, Some(404), None)));
        assert!(!policy.should_retry(&decision(1, Some(429), None)));
        assert!(!policy.should_retry(&decision(1, Some(302), None)));
    }

    #[test]
    fn exponential_retries_transport_failures() {
        let policy = RetryPolicy::exponential(3);
        for kind in [
            TransportErrorKind::Dns,
            TransportErrorKind::Connect,
            TransportErrorKind::Timeout,
        ] {
            assert!(policy.should_retry(&decision(2, None, Some(kind))));
        }
        assert!(!policy.should_retry(&decision(1, None, None)));
    }

    #[test]
    fn classifier_is_not_consulted_on_last_attempt() {
        let policy = RetryPolicy::exponential(3).retry_classifier(Arc::new(
            |decision: &RetryDecision| {
                assert!(decision.attempt < 3, "classifier consulted at the limit");
                true
            },
        ));
        assert!(policy.should_retry(&decision(2, Some(500), None)));
        assert!(!policy.should_retry(&decision(3, Some(500), None)));
    }

    #[test]
    fn disabled_policy_never_retries() {
        let policy = RetryPolicy::disabled();
        assert_eq!(policy.configured_max_attempts(), 1);
        assert!(!policy.should_retry(&decision(1, Some(503), None)));
    }

    #[test]
    fn fixed_policy_retries_everything_with_constant_delay() {
        let policy = RetryPolicy::fixed(4, Duration::from_millis(25));
        assert!(policy.should_retry(&decision(1, Some(404), None)));
        assert!(policy.should_retry(&decision(1, Some(200), None)));
        assert_eq!(policy.delay(1), Duration::from_millis(25));
        assert_eq!(policy.delay(3), Duration::from_millis(25));
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        assert_eq!(RetryPolicy::exponential(0).configured_max_attempts(), 1);
        assert_eq!(
            RetryPolicy::exponential(5)
                .max_attempts(0)
                .configured_max_attempts(),
            1
        );
    }

    #[test]
    fn closure_backoff_is_used_for_delay() {
        let policy = RetryPolicy::exponential(3).backoff(|attempt: usize| {
            Duration::from_millis(attempt as u64 * 10)
        });
        assert_eq!(policy.delay(2), Duration::from_millis(20));
    }

    #[test]
    fn jittered_backoff_never_exceeds_configured_max_delay() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100))
            .max_delay(Duration::from_millis(120))
            .jitter_ratio(1.0);

        for _ in 0..256 {
            let delay = backoff.delay_for_attempt(3);
            assert!(delay <= Duration::from_millis(120));
            assert!(delay >= Duration::from_millis(1));
        }
    }

    #[test]
    fn retry_after_overrides_delay_only_when_enabled() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        let ignoring = RetryPolicy::exponential(3);
        assert_eq!(
            ignoring.retry_delay(1, Some(&headers)),
            Duration::from_millis(500)
        );

        let respecting = RetryPolicy::exponential(3).respect_retry_after(true);
        assert_eq!(
            respecting.retry_delay(1, Some(&headers)),
            Duration::from_secs(7)
        );
        assert_eq!(respecting.retry_delay(2, None), Duration::from_secs(1));
    }

    #[test]
    fn retry_after_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("999999999"));

        let default_cap = RetryPolicy::exponential(3).respect_retry_after(true);
        assert_eq!(
            default_cap.retry_delay(1, Some(&headers)),
            Duration::from_secs(60)
        );

        let tight_cap = RetryPolicy::exponential(3)
            .backoff(ExponentialBackoff::default().max_delay(Duration::from_secs(2)))
            .respect_retry_after(true)
            .max_retry_after(Duration::from_secs(2));
        assert_eq!(
            tight_cap.retry_delay(1, Some(&headers)),
            Duration::from_secs(2)
        );
    }
}
