use crate::resilience::RateLimiterSnapshot;

/// A read-only snapshot of client runtime state.
///
/// Facts only; callers decide what to do with them (e.g. show a "slow down" hint).
#[derive(Debug, Clone)]
pub struct ClientSignals {
    pub rate_limiter: RateLimiterSnapshot,
    pub session_id: Option<String>,
    pub inflight: bool,
}
