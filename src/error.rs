use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "policy.max_requests_per_minute")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., response body excerpt)
    pub details: Option<String>,
    /// Source of the error (e.g., "session_manager", "execute_once")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Coarse failure category, stable enough for callers to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    SessionExpired,
    TransientServer,
    Network,
    Stream,
    Cancelled,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::TransientServer => "transient_server_error",
            ErrorKind::Network => "network_error",
            ErrorKind::Stream => "stream_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the connector.
///
/// Only a subset of these ever reaches callers of the send operation: throttling and
/// session expiry are absorbed internally unless their retry budget runs out.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Rate limited after {attempts} attempt(s): {message}")]
    RateLimited {
        message: String,
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("Session expired and could not be recreated after {restarts} restart(s): {message}")]
    SessionExpired { message: String, restarts: u32 },

    #[error("Server error: HTTP {status} after {attempts} attempt(s): {message}")]
    TransientServer {
        status: u16,
        message: String,
        attempts: u32,
    },

    #[error("Network error after {attempts} attempt(s): {message}")]
    Network {
        message: String,
        attempts: u32,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Stream error: {message}")]
    Stream { message: String, attempts: u32 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request failed{}: {message}{}", format_status(.status), format_context(.context))]
    Fatal {
        status: Option<u16>,
        message: String,
        attempts: u32,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" with HTTP {}", s)).unwrap_or_default()
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new fatal error with structured context
    pub fn fatal_with_context(
        status: Option<u16>,
        msg: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Error::Fatal {
            status,
            message: msg.into(),
            attempts: 1,
            context,
        }
    }

    pub(crate) fn network(source: reqwest::Error) -> Self {
        Error::Network {
            message: source.to_string(),
            attempts: 1,
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::SessionExpired { .. } => ErrorKind::SessionExpired,
            Error::TransientServer { .. } => ErrorKind::TransientServer,
            Error::Network { .. } => ErrorKind::Network,
            Error::Stream { .. } => ErrorKind::Stream,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Fatal { .. } | Error::Configuration { .. } | Error::Serialization(_) => {
                ErrorKind::Fatal
            }
        }
    }

    /// Number of network attempts made by the logical operation that produced this error.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::RateLimited { attempts, .. }
            | Error::TransientServer { attempts, .. }
            | Error::Network { attempts, .. }
            | Error::Stream { attempts, .. }
            | Error::Fatal { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RateLimited { .. } => Some(429),
            Error::TransientServer { status, .. } => Some(*status),
            Error::Fatal { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether another attempt of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::TransientServer { .. } | Error::Network { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Fatal { context, .. } | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Stamp the attempt count of the enclosing operation onto the error.
    pub(crate) fn with_attempts(mut self, n: u32) -> Self {
        match &mut self {
            Error::RateLimited { attempts, .. }
            | Error::TransientServer { attempts, .. }
            | Error::Network { attempts, .. }
            | Error::Stream { attempts, .. }
            | Error::Fatal { attempts, .. } => *attempts = n,
            _ => {}
        }
        self
    }
}
