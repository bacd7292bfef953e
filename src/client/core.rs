use crate::client::session::SessionManager;
use crate::client::signals::ClientSignals;
use crate::resilience::{RateLimitPolicy, RateLimiter};
use crate::transport::HttpTransport;
use crate::usage::{UsageDispatcher, UsageEvent};
use crate::{Error, ErrorContext, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cancellation handle of the send currently in flight.
#[derive(Debug)]
pub(crate) struct Flight {
    id: u64,
    token: CancellationToken,
}

/// Client for the proxied chat service.
///
/// Cloning is cheap and clones share all state: one rate-limit window, one session, one
/// in-flight slot. Build independent clients for independent budgets.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) max_session_restarts: u32,
    pub(crate) usage: Arc<UsageDispatcher>,
    pub(crate) inflight: Arc<Mutex<Option<Flight>>>,
    pub(crate) flight_seq: Arc<AtomicU64>,
}

impl ChatClient {
    /// Create a client with default policy for `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        crate::client::builder::ChatClientBuilder::new(base_url).build()
    }

    pub fn builder(base_url: &str) -> crate::client::builder::ChatClientBuilder {
        crate::client::builder::ChatClientBuilder::new(base_url)
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        self.limiter.policy()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn session_id(&self) -> Option<String> {
        self.sessions.current_id()
    }

    /// Drop the active session; the next send creates a fresh one.
    pub fn reset_session(&self) {
        self.sessions.discard();
    }

    /// Liveness probe: `Ok` on any 2xx from `GET {base}/health`.
    pub async fn health(&self) -> Result<()> {
        let resp = self.transport.health().await?;
        let status = resp.status();
        if status.is_success() {
            debug!(http_status = status.as_u16(), "health check ok");
            return Ok(());
        }
        Err(Error::fatal_with_context(
            Some(status.as_u16()),
            "health check failed",
            ErrorContext::new()
                .with_field_path("/health")
                .with_source("health"),
        ))
    }

    /// Snapshot current runtime signals (facts only) for application-layer decisions.
    pub fn signals(&self) -> ClientSignals {
        ClientSignals {
            rate_limiter: self.limiter.snapshot(),
            session_id: self.sessions.current_id(),
            inflight: self.flight_slot().is_some(),
        }
    }

    /// Cancel the send currently in flight, if any. Returns whether one was cancelled.
    pub fn cancel_inflight(&self) -> bool {
        match self.flight_slot().take() {
            Some(flight) => {
                info!(flight = flight.id, "cancelling in-flight request");
                flight.token.cancel();
                true
            }
            None => false,
        }
    }

    fn flight_slot(&self) -> MutexGuard<'_, Option<Flight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new send as the one in flight, cancelling any previous one.
    ///
    /// The returned token is a child of `cancel`, so the caller's token still aborts it.
    pub(crate) fn begin_flight(&self, cancel: &CancellationToken) -> (u64, CancellationToken) {
        let id = self.flight_seq.fetch_add(1, Ordering::Relaxed);
        let token = cancel.child_token();
        let previous = self.flight_slot().replace(Flight {
            id,
            token: token.clone(),
        });
        if let Some(prev) = previous {
            info!(
                flight = prev.id,
                "new request supersedes in-flight request"
            );
            prev.token.cancel();
        }
        (id, token)
    }

    pub(crate) fn end_flight(&self, id: u64) {
        let mut slot = self.flight_slot();
        if slot.as_ref().map(|f| f.id) == Some(id) {
            *slot = None;
        }
    }

    /// Hand a usage event to the background dispatcher. Never waits on the sink.
    pub(crate) fn report_usage(&self, event: UsageEvent) {
        self.usage.dispatch(event);
    }
}
