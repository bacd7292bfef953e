use crate::resilience::{Backoff, RateLimitPolicy};
use crate::Error;
use std::time::Duration;

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Wait `delay`, then run another attempt. Throttle cooldowns are enforced by the
    /// rate limiter gate rather than by `delay`.
    Retry { delay: Duration },
    /// Drop the session and start over without spending an attempt.
    RestartSession,
    Fail,
}

/// Retry / restart policy for one logical send.
///
/// - `attempt` is 0-based (first failure => attempt=0)
/// - session restarts are counted separately and never consume an attempt
pub(crate) struct PolicyEngine {
    pub max_retries: u32,
    pub max_session_restarts: u32,
    backoff: Backoff,
}

impl PolicyEngine {
    pub fn new(policy: &RateLimitPolicy, max_session_restarts: u32) -> Self {
        Self {
            max_retries: policy.max_retries,
            max_session_restarts,
            backoff: Backoff::from_policy(policy),
        }
    }

    pub fn decide(&self, err: &Error, attempt: u32, restarts: u32) -> Decision {
        match err {
            Error::SessionExpired { .. } if restarts < self.max_session_restarts => {
                Decision::RestartSession
            }
            Error::RateLimited { .. } if attempt < self.max_retries => Decision::Retry {
                delay: Duration::ZERO,
            },
            Error::TransientServer { .. } | Error::Network { .. } if attempt < self.max_retries => {
                Decision::Retry {
                    delay: self.backoff.delay(attempt),
                }
            }
            _ => Decision::Fail,
        }
    }
}
