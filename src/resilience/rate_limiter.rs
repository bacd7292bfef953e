use crate::utils::cancel::sleep_cancellable;
use crate::{Error, ErrorContext, Result};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Length of the trailing window the per-minute cap is enforced over.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Longest single sleep inside [`RateLimiter::wait_until_allowed`], so progress is reported
/// at least this often.
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// Upper bound on any throttle cooldown, whether server-provided or configured.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Caller-supplied pacing and retry budget. Immutable once handed to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum requests accepted in any trailing 60-second window.
    pub max_requests_per_minute: u32,
    /// Minimum spacing between two consecutive requests.
    pub min_interval: Duration,
    /// Retries after the first attempt (so at most `max_retries + 1` attempts).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Cooldown applied after a throttle signal that carries no explicit hint.
    pub error_cooldown: Duration,
}

impl RateLimitPolicy {
    pub fn new() -> Self {
        Self {
            max_requests_per_minute: 20,
            min_interval: Duration::from_millis(1_000),
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            error_cooldown: Duration::from_millis(60_000),
        }
    }

    pub fn with_max_requests_per_minute(mut self, n: u32) -> Self {
        self.max_requests_per_minute = n;
        self
    }

    pub fn with_min_interval(mut self, d: Duration) -> Self {
        self.min_interval = d;
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    pub fn with_error_cooldown(mut self, d: Duration) -> Self {
        self.error_cooldown = d;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests_per_minute == 0 {
            return Err(Error::configuration_with_context(
                "per-minute request cap must be at least 1",
                ErrorContext::new()
                    .with_field_path("policy.max_requests_per_minute")
                    .with_source("rate_limit_policy"),
            ));
        }
        if self.error_cooldown > MAX_COOLDOWN {
            return Err(Error::configuration_with_context(
                "error cooldown exceeds the one-hour limit",
                ErrorContext::new()
                    .with_field_path("policy.error_cooldown")
                    .with_details(format!("cooldown={}ms", self.error_cooldown.as_millis()))
                    .with_source("rate_limit_policy"),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::configuration_with_context(
                "base backoff delay exceeds maximum backoff delay",
                ErrorContext::new()
                    .with_field_path("policy.base_delay")
                    .with_details(format!(
                        "base={}ms max={}ms",
                        self.base_delay.as_millis(),
                        self.max_delay.as_millis()
                    ))
                    .with_source("rate_limit_policy"),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a request is currently held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetReason {
    Throttled,
    MinInterval,
    WindowFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetDecision {
    pub allowed: bool,
    pub wait: Duration,
    pub reason: Option<BudgetReason>,
}

impl BudgetDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            wait: Duration::ZERO,
            reason: None,
        }
    }

    fn deny(wait: Duration, reason: BudgetReason) -> Self {
        Self {
            allowed: false,
            wait,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub max_requests_per_minute: u32,
    pub requests_in_window: usize,
    pub throttled: bool,
    /// Remaining throttle time in ms, if currently throttled.
    pub throttle_remaining_ms: Option<u64>,
    pub consecutive_errors: u32,
    /// Estimated wait until the next request is allowed (ms), if currently held back.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct State {
    window: VecDeque<Instant>,
    last_request: Option<Instant>,
    throttled: bool,
    throttle_ends_at: Option<Instant>,
    consecutive_errors: u32,
}

/// Sliding-window rate limiter with a minimum spacing and a server-driven cooldown.
///
/// - `check_budget` never mutates the window except for eviction and clearing an expired throttle
/// - `record_request` is the only way a request enters the window
pub struct RateLimiter {
    policy: RateLimitPolicy,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(State::default()),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_locked(policy: &RateLimitPolicy, st: &mut State, now: Instant) -> BudgetDecision {
        if st.throttled {
            match st.throttle_ends_at {
                Some(until) if now < until => {
                    return BudgetDecision::deny(until - now, BudgetReason::Throttled);
                }
                _ => {
                    st.throttled = false;
                    st.throttle_ends_at = None;
                }
            }
        }

        while let Some(oldest) = st.window.front() {
            if now.saturating_duration_since(*oldest) >= WINDOW {
                st.window.pop_front();
            } else {
                break;
            }
        }

        if let Some(last) = st.last_request {
            let since = now.saturating_duration_since(last);
            if since < policy.min_interval {
                return BudgetDecision::deny(policy.min_interval - since, BudgetReason::MinInterval);
            }
        }

        if st.window.len() >= policy.max_requests_per_minute as usize {
            let wait = st
                .window
                .front()
                .map(|oldest| (*oldest + WINDOW).saturating_duration_since(now))
                .unwrap_or(Duration::ZERO);
            return BudgetDecision::deny(wait, BudgetReason::WindowFull);
        }

        BudgetDecision::allow()
    }

    /// Decide whether a request may be issued at `now`.
    pub fn check_budget(&self, now: Instant) -> BudgetDecision {
        let mut st = self.lock();
        Self::check_locked(&self.policy, &mut st, now)
    }

    pub fn record_request(&self, now: Instant) {
        let mut st = self.lock();
        st.window.push_back(now);
        st.last_request = Some(now);
    }

    /// Apply a server throttle signal. Returns the cooldown that was applied, at most
    /// [`MAX_COOLDOWN`].
    pub fn on_throttle(&self, now: Instant, retry_after: Option<Duration>) -> Duration {
        let cooldown = retry_after
            .unwrap_or(self.policy.error_cooldown)
            .min(MAX_COOLDOWN);
        let mut st = self.lock();
        st.throttled = true;
        st.throttle_ends_at = Some(now.checked_add(cooldown).unwrap_or(now));
        st.consecutive_errors = st.consecutive_errors.saturating_add(1);
        cooldown
    }

    pub fn on_failure(&self) {
        let mut st = self.lock();
        st.consecutive_errors = st.consecutive_errors.saturating_add(1);
    }

    pub fn on_success(&self) {
        self.lock().consecutive_errors = 0;
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.lock().consecutive_errors
    }

    /// Block until the budget allows a request, reporting the remaining wait before each sleep.
    ///
    /// Sleeps in slices of at most one second so `progress` sees a shrinking wait.
    pub async fn wait_until_allowed<F>(&self, cancel: &CancellationToken, mut progress: F) -> Result<()>
    where
        F: FnMut(Duration, BudgetReason),
    {
        loop {
            let decision = self.check_budget(Instant::now());
            if decision.allowed {
                return Ok(());
            }
            let reason = decision.reason.unwrap_or(BudgetReason::MinInterval);
            debug!(
                wait_ms = decision.wait.as_millis() as u64,
                reason = ?reason,
                "rate limit wait"
            );
            progress(decision.wait, reason);
            sleep_cancellable(decision.wait.min(WAIT_SLICE), cancel).await?;
        }
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let now = Instant::now();
        let mut st = self.lock();
        let decision = Self::check_locked(&self.policy, &mut st, now);
        let throttle_remaining_ms = st
            .throttle_ends_at
            .filter(|_| st.throttled)
            .map(|until| until.saturating_duration_since(now).as_millis() as u64);
        RateLimiterSnapshot {
            max_requests_per_minute: self.policy.max_requests_per_minute,
            requests_in_window: st.window.len(),
            throttled: st.throttled,
            throttle_remaining_ms,
            consecutive_errors: st.consecutive_errors,
            estimated_wait_ms: (!decision.allowed).then(|| decision.wait.as_millis() as u64),
        }
    }
}
