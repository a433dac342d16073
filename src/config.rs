use std::time::Duration;

use crate::retry::{ExponentialBackoff, RetryPolicy};

/// Preset transport timeouts and retry behavior for common workloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientProfile {
    #[default]
    StandardSdk,
    LowLatency,
    HighThroughput,
}

#[derive(Clone, Debug)]
pub struct ProfileDefaults {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl ClientProfile {
    pub fn defaults(self) -> ProfileDefaults {
        match self {
            Self::StandardSdk => ProfileDefaults {
                request_timeout: Duration::from_secs(10),
                connect_timeout: Duration::from_secs(3),
                retry_policy: RetryPolicy::disabled(),
            },
            Self::LowLatency => ProfileDefaults {
                request_timeout: Duration::from_secs(2),
                connect_timeout: Duration::from_millis(500),
                retry_policy: RetryPolicy::exponential(2).backoff(
                    ExponentialBackoff::new(Duration::from_millis(50))
                        .max_delay(Duration::from_millis(300)),
                ),
            },
            Self::HighThroughput => ProfileDefaults {
                request_timeout: Duration::from_secs(20),
                connect_timeout: Duration::from_secs(5),
                retry_policy: RetryPolicy::exponential(4).backoff(
                    ExponentialBackoff::new(Duration::from_millis(150))
                        .max_delay(Duration::from_secs(3))
                        .jitter_ratio(0.2),
                ),
            },
        }
    }
}
