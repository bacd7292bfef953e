//! Lifecycle of the active chat session.

use super::error_classification::{error_from_response, StatusScope};
use crate::transport::http::CreateChatResponse;
use crate::transport::HttpTransport;
use crate::{Error, ErrorContext, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Server-side conversation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    pub agent_id: Option<String>,
}

/// Owns at most one active session per client.
///
/// Creation failures are returned as-is; retrying them is the orchestrator's job.
pub struct SessionManager {
    transport: Arc<HttpTransport>,
    agent_id: Option<String>,
    active: Mutex<Option<ChatSession>>,
    // Serializes creation so concurrent `ensure_session` calls share one session.
    create_gate: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(transport: Arc<HttpTransport>, agent_id: Option<String>) -> Self {
        Self {
            transport,
            agent_id,
            active: Mutex::new(None),
            create_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ChatSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<ChatSession> {
        self.slot().clone()
    }

    pub fn current_id(&self) -> Option<String> {
        self.slot().as_ref().map(|s| s.id.clone())
    }

    /// Forget the active session. The next `ensure_session` creates a new one.
    pub fn discard(&self) -> Option<ChatSession> {
        let old = self.slot().take();
        if let Some(ref s) = old {
            debug!(session_id = s.id.as_str(), "session discarded");
        }
        old
    }

    /// Return the active session, creating one if none exists.
    pub async fn ensure_session(&self) -> Result<ChatSession> {
        if let Some(s) = self.current() {
            return Ok(s);
        }
        let _gate = self.create_gate.lock().await;
        if let Some(s) = self.current() {
            return Ok(s);
        }
        let session = self.create().await?;
        *self.slot() = Some(session.clone());
        Ok(session)
    }

    async fn create(&self) -> Result<ChatSession> {
        let resp = self.transport.create_session(self.agent_id.as_deref()).await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp, StatusScope::CreateSession, "session_manager").await);
        }
        let body = resp.bytes().await.map_err(Error::network)?;
        let parsed: CreateChatResponse = serde_json::from_slice(&body).map_err(|e| {
            Error::fatal_with_context(
                None,
                format!("malformed session response: {}", e),
                ErrorContext::new()
                    .with_field_path("data.id")
                    .with_source("session_manager"),
            )
        })?;
        if parsed.data.id.trim().is_empty() {
            return Err(Error::fatal_with_context(
                None,
                "session response carried an empty id",
                ErrorContext::new()
                    .with_field_path("data.id")
                    .with_source("session_manager"),
            ));
        }
        info!(session_id = parsed.data.id.as_str(), "session created");
        Ok(ChatSession {
            id: parsed.data.id,
            agent_id: self.agent_id.clone(),
        })
    }
}
