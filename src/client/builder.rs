use crate::client::core::ChatClient;
use crate::client::session::SessionManager;
use crate::resilience::{RateLimitPolicy, RateLimiter};
use crate::transport::{HttpTransport, TransportConfig};
use crate::usage::{UsageDispatcher, UsageSink};
use crate::Result;
use reqwest::header::HeaderMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default bound on consecutive session recreations within one send.
pub const DEFAULT_MAX_SESSION_RESTARTS: u32 = 2;

/// Builder for creating clients with custom configuration.
///
/// Everything here is an explicit value; nothing is read from the environment.
pub struct ChatClientBuilder {
    base_url: String,
    agent_id: Option<String>,
    policy: RateLimitPolicy,
    max_session_restarts: u32,
    transport: TransportConfig,
    usage: Arc<dyn UsageSink>,
}

impl ChatClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            agent_id: None,
            policy: RateLimitPolicy::default(),
            max_session_restarts: DEFAULT_MAX_SESSION_RESTARTS,
            transport: TransportConfig::default(),
            usage: crate::usage::noop_sink(),
        }
    }

    /// Agent to attach to newly created sessions.
    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// How many times one send may recreate an expired session before giving up.
    pub fn max_session_restarts(mut self, n: u32) -> Self {
        self.max_session_restarts = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport.connect_timeout = timeout;
        self
    }

    /// Headers sent with every request (e.g. the proxy's authorization header).
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.transport.default_headers = headers;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.transport.user_agent = ua.into();
        self
    }

    /// Inject a usage sink. Default is a no-op sink. Events are delivered from a background
    /// task, so a slow sink never holds up a send.
    pub fn usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = sink;
        self
    }

    pub fn build(self) -> Result<ChatClient> {
        self.policy.validate()?;
        let transport = Arc::new(HttpTransport::new(&self.base_url, &self.transport)?);
        let sessions = Arc::new(SessionManager::new(transport.clone(), self.agent_id));
        Ok(ChatClient {
            transport,
            sessions,
            limiter: Arc::new(RateLimiter::new(self.policy)),
            max_session_restarts: self.max_session_restarts,
            usage: Arc::new(UsageDispatcher::new(self.usage)),
            inflight: Arc::new(Mutex::new(None)),
            flight_seq: Arc::new(AtomicU64::new(0)),
        })
    }
}
