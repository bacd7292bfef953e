//! Fire-and-forget usage notifications.
//!
//! The client reports what happened to each send operation to an injected [`UsageSink`].
//! Sinks are advisory: a failing sink is logged and never affects the request.

use crate::error::ErrorKind;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::debug;

fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsageEvent {
    RequestStarted {
        request_id: String,
        timestamp: f64,
    },
    RequestSucceeded {
        request_id: String,
        attempts: u32,
        duration_ms: u64,
        output_chars: usize,
        timestamp: f64,
    },
    RequestFailed {
        request_id: String,
        kind: String,
        attempts: Option<u32>,
        timestamp: f64,
    },
    Throttled {
        request_id: String,
        cooldown_ms: u64,
        timestamp: f64,
    },
    SessionCreated {
        session_id: String,
        timestamp: f64,
    },
}

impl UsageEvent {
    pub fn started(request_id: impl Into<String>) -> Self {
        UsageEvent::RequestStarted {
            request_id: request_id.into(),
            timestamp: timestamp(),
        }
    }

    pub fn succeeded(
        request_id: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
        output_chars: usize,
    ) -> Self {
        UsageEvent::RequestSucceeded {
            request_id: request_id.into(),
            attempts,
            duration_ms,
            output_chars,
            timestamp: timestamp(),
        }
    }

    pub fn failed(request_id: impl Into<String>, kind: ErrorKind, attempts: Option<u32>) -> Self {
        UsageEvent::RequestFailed {
            request_id: request_id.into(),
            kind: kind.as_str().to_string(),
            attempts,
            timestamp: timestamp(),
        }
    }

    pub fn throttled(request_id: impl Into<String>, cooldown_ms: u64) -> Self {
        UsageEvent::Throttled {
            request_id: request_id.into(),
            cooldown_ms,
            timestamp: timestamp(),
        }
    }

    pub fn session_created(session_id: impl Into<String>) -> Self {
        UsageEvent::SessionCreated {
            session_id: session_id.into(),
            timestamp: timestamp(),
        }
    }
}

#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn report(&self, event: UsageEvent) -> Result<()>;
}

/// No-op sink (default).
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn report(&self, _: UsageEvent) -> Result<()> {
        Ok(())
    }
}

pub fn noop_sink() -> Arc<dyn UsageSink> {
    Arc::new(NoopUsageSink)
}

/// Delivers events to a sink from a background task, in submission order.
///
/// `dispatch` never waits on the sink. The worker task is started on first use, so it runs
/// on the runtime of the first send.
pub(crate) struct UsageDispatcher {
    sink: Arc<dyn UsageSink>,
    tx: OnceLock<mpsc::UnboundedSender<UsageEvent>>,
}

impl UsageDispatcher {
    pub(crate) fn new(sink: Arc<dyn UsageSink>) -> Self {
        Self {
            sink,
            tx: OnceLock::new(),
        }
    }

    pub(crate) fn dispatch(&self, event: UsageEvent) {
        let tx = self.tx.get_or_init(|| {
            let (tx, mut rx) = mpsc::unbounded_channel::<UsageEvent>();
            let sink = self.sink.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if let Err(e) = sink.report(event).await {
                        debug!(error = %e, "usage sink rejected event");
                    }
                }
            });
            tx
        });
        if tx.send(event).is_err() {
            debug!("usage worker stopped, event dropped");
        }
    }
}

/// Bounded in-memory sink, mostly useful in tests.
pub struct InMemoryUsageSink {
    events: Mutex<Vec<UsageEvent>>,
    max_events: usize,
}

impl InMemoryUsageSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            max_events: max,
        }
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UsageSink for InMemoryUsageSink {
    async fn report(&self, event: UsageEvent) -> Result<()> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.push(event);
        if events.len() > self.max_events {
            events.remove(0);
        }
        Ok(())
    }
}
