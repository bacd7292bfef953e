//! Status-code classification and error construction for non-2xx responses.

use crate::resilience::rate_limiter::MAX_COOLDOWN;
use crate::{Error, ErrorContext};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Longest response-body excerpt kept in an error message.
const MAX_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureClass {
    SessionGone,
    Throttled,
    Transient,
    Fatal,
}

/// Which endpoint produced the status. Only the continue endpoint can report a missing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusScope {
    CreateSession,
    Continue,
}

pub(crate) fn classify_status(status: u16, scope: StatusScope) -> FailureClass {
    match (status, scope) {
        (404 | 410, StatusScope::Continue) => FailureClass::SessionGone,
        (429, _) => FailureClass::Throttled,
        (500 | 502 | 503, _) => FailureClass::Transient,
        _ => FailureClass::Fatal,
    }
}

/// Parse `Retry-After: <seconds>`, clamped to [`MAX_COOLDOWN`]. The HTTP-date form is not
/// supported.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    match raw.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs).min(MAX_COOLDOWN)),
        // All digits but wider than u64.
        Err(_) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => Some(MAX_COOLDOWN),
        Err(_) => None,
    }
}

/// Best human-readable message from an error body.
fn summarize_body(status: u16, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let err = v.get("error").unwrap_or(&v);
            err.as_str()
                .map(str::to_string)
                .or_else(|| err.get("message").and_then(|m| m.as_str()).map(str::to_string))
        });
    let text = from_json.unwrap_or_else(|| body.trim().to_string());
    if text.is_empty() {
        return reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unexpected status")
            .to_string();
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        let cut: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{}…", cut)
    } else {
        text
    }
}

pub(crate) fn error_from_status(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    scope: StatusScope,
    source: &'static str,
) -> Error {
    let message = summarize_body(status, body);
    match classify_status(status, scope) {
        FailureClass::SessionGone => Error::SessionExpired {
            message,
            restarts: 0,
        },
        FailureClass::Throttled => Error::RateLimited {
            message,
            attempts: 1,
            retry_after: retry_after(headers),
        },
        FailureClass::Transient => Error::TransientServer {
            status,
            message,
            attempts: 1,
        },
        FailureClass::Fatal => {
            Error::fatal_with_context(Some(status), message, ErrorContext::new().with_source(source))
        }
    }
}

/// Consume a non-2xx response and turn it into a classified error.
pub(crate) async fn error_from_response(
    resp: reqwest::Response,
    scope: StatusScope,
    source: &'static str,
) -> Error {
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let body = resp.text().await.unwrap_or_default();
    error_from_status(status, &headers, &body, scope, source)
}
