use crate::error::ErrorKind;
use crate::resilience::BudgetReason;
use std::time::Duration;

/// Per-call statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    /// Client-generated correlation id, sent as `x-request-id`.
    pub client_request_id: String,
    pub session_id: Option<String>,
    /// Network attempts made (first try included).
    pub attempts: u32,
    pub retry_count: u32,
    pub session_restarts: u32,
    pub http_status: Option<u16>,
    pub duration_ms: u128,
    /// Time from the start of the final attempt's request to its first text increment.
    pub first_delta_ms: Option<u128>,
}

/// Progress of one send operation, in the order it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Held back by the rate limiter; `remaining` is the wait left at this moment.
    RateLimitWait {
        remaining: Duration,
        reason: BudgetReason,
    },
    SessionCreated {
        session_id: String,
    },
    /// A failed attempt will be retried. Text delivered so far belongs to the failed attempt.
    ///
    /// `attempt` is the 0-based index of the failed attempt; `delay` was computed from it.
    Retrying {
        attempt: u32,
        delay: Duration,
        reason: ErrorKind,
    },
    /// The session was reported gone and is being recreated.
    SessionRestart {
        restarts: u32,
    },
    Delta(String),
    Completed {
        text: String,
        stats: CallStats,
    },
    Cancelled {
        partial: String,
    },
}

/// Terminal result of a send. Cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Completed { text: String, stats: CallStats },
    Cancelled { partial: String },
}

impl ChatOutcome {
    pub fn text(&self) -> &str {
        match self {
            ChatOutcome::Completed { text, .. } => text,
            ChatOutcome::Cancelled { partial } => partial,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatOutcome::Cancelled { .. })
    }

    pub fn stats(&self) -> Option<&CallStats> {
        match self {
            ChatOutcome::Completed { stats, .. } => Some(stats),
            ChatOutcome::Cancelled { .. } => None,
        }
    }

    /// Full text of a completed send; `None` if it was cancelled.
    pub fn into_text(self) -> Option<String> {
        match self {
            ChatOutcome::Completed { text, .. } => Some(text),
            ChatOutcome::Cancelled { .. } => None,
        }
    }
}
