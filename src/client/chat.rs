//! Send-message orchestration: pacing, session handling, retries and cancellation.

use super::core::ChatClient;
use super::policy::{Decision, PolicyEngine};
use super::types::{CallStats, ChatEvent, ChatOutcome};
use crate::usage::UsageEvent;
use crate::utils::cancel::{cancellable, sleep_cancellable};
use crate::{Error, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Stream of [`ChatEvent`]s for one send.
///
/// Ends after `Completed`, `Cancelled` or an error item. Dropping it cancels the send.
pub struct ChatStream {
    rx: mpsc::UnboundedReceiver<Result<ChatEvent>>,
    _guard: DropGuard,
}

impl Stream for ChatStream {
    type Item = Result<ChatEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl ChatClient {
    /// Send one message and wait for the full response.
    pub async fn send_message(&self, input: &str, cancel: &CancellationToken) -> Result<ChatOutcome> {
        self.send_message_with(input, cancel, |_| {}).await
    }

    /// Send one message, reporting progress and text increments to `on_event` as they happen.
    pub async fn send_message_with<F>(
        &self,
        input: &str,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<ChatOutcome>
    where
        F: FnMut(ChatEvent) + Send,
    {
        let (flight, token) = self.begin_flight(cancel);
        let result = self.run(input, &token, &mut on_event).await;
        self.end_flight(flight);
        result
    }

    /// Send one message and consume the response as a stream of events.
    pub fn stream_message(&self, input: impl Into<String>) -> ChatStream {
        self.stream_message_with_cancel(input, &CancellationToken::new())
    }

    /// Like [`ChatClient::stream_message`], additionally aborted when `cancel` fires.
    pub fn stream_message_with_cancel(
        &self,
        input: impl Into<String>,
        cancel: &CancellationToken,
    ) -> ChatStream {
        let input = input.into();
        let token = cancel.child_token();
        let guard = token.clone().drop_guard();
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();

        tokio::spawn(async move {
            let events = tx.clone();
            let last = client
                .send_message_with(&input, &token, move |event| {
                    let _ = events.send(Ok(event));
                })
                .await
                .map(|outcome| match outcome {
                    ChatOutcome::Completed { text, stats } => ChatEvent::Completed { text, stats },
                    ChatOutcome::Cancelled { partial } => ChatEvent::Cancelled { partial },
                });
            let _ = tx.send(last);
        });

        ChatStream { rx, _guard: guard }
    }

    async fn run(
        &self,
        input: &str,
        cancel: &CancellationToken,
        on_event: &mut (dyn FnMut(ChatEvent) + Send),
    ) -> Result<ChatOutcome> {
        let start = Instant::now();
        let mut stats = CallStats {
            client_request_id: Uuid::new_v4().to_string(),
            ..CallStats::default()
        };
        let mut text = String::new();
        self.report_usage(UsageEvent::started(&stats.client_request_id));

        let result = self
            .run_attempts(input, cancel, &mut text, &mut stats, on_event)
            .await;
        stats.duration_ms = start.elapsed().as_millis();

        match result {
            Ok(()) => {
                self.limiter.on_success();
                info!(
                    request_id = stats.client_request_id.as_str(),
                    attempts = stats.attempts,
                    session_restarts = stats.session_restarts,
                    duration_ms = stats.duration_ms as u64,
                    "chat request completed"
                );
                self.report_usage(UsageEvent::succeeded(
                    &stats.client_request_id,
                    stats.attempts,
                    stats.duration_ms as u64,
                    text.chars().count(),
                ));
                Ok(ChatOutcome::Completed { text, stats })
            }
            Err(Error::Cancelled) => {
                info!(
                    request_id = stats.client_request_id.as_str(),
                    attempts = stats.attempts,
                    "chat request cancelled"
                );
                self.report_usage(UsageEvent::failed(
                    &stats.client_request_id,
                    crate::ErrorKind::Cancelled,
                    Some(stats.attempts),
                ));
                Ok(ChatOutcome::Cancelled { partial: text })
            }
            Err(e) => {
                warn!(
                    request_id = stats.client_request_id.as_str(),
                    error_kind = e.kind().as_str(),
                    attempts = stats.attempts,
                    error = %e,
                    "chat request failed"
                );
                self.report_usage(UsageEvent::failed(
                    &stats.client_request_id,
                    e.kind(),
                    e.attempts(),
                ));
                Err(e)
            }
        }
    }

    /// The retry loop. Returns `Ok` once one attempt streamed to completion.
    async fn run_attempts(
        &self,
        input: &str,
        cancel: &CancellationToken,
        text: &mut String,
        stats: &mut CallStats,
        on_event: &mut (dyn FnMut(ChatEvent) + Send),
    ) -> Result<()> {
        let policy = PolicyEngine::new(self.limiter.policy(), self.max_session_restarts);
        let mut attempt: u32 = 0;
        let mut restarts: u32 = 0;

        loop {
            text.clear();
            stats.attempts = attempt + 1;

            self.limiter
                .wait_until_allowed(cancel, |remaining, reason| {
                    on_event(ChatEvent::RateLimitWait { remaining, reason })
                })
                .await?;

            let err = match self.attempt(input, cancel, text, stats, on_event).await {
                Ok(()) => return Ok(()),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => e,
            };

            match &err {
                Error::RateLimited { retry_after, .. } => {
                    let cooldown = self
                        .limiter
                        .on_throttle(tokio::time::Instant::now(), *retry_after);
                    self.report_usage(UsageEvent::throttled(
                        &stats.client_request_id,
                        cooldown.as_millis() as u64,
                    ));
                }
                Error::TransientServer { .. } | Error::Network { .. } => self.limiter.on_failure(),
                _ => {}
            }

            match policy.decide(&err, attempt, restarts) {
                Decision::RestartSession => {
                    restarts += 1;
                    stats.session_restarts = restarts;
                    self.sessions.discard();
                    warn!(
                        request_id = stats.client_request_id.as_str(),
                        restarts,
                        "session gone, recreating"
                    );
                    on_event(ChatEvent::SessionRestart { restarts });
                }
                Decision::Retry { delay } => {
                    warn!(
                        request_id = stats.client_request_id.as_str(),
                        attempt = attempt + 1,
                        error_kind = err.kind().as_str(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying chat request"
                    );
                    on_event(ChatEvent::Retrying {
                        attempt,
                        delay,
                        reason: err.kind(),
                    });
                    sleep_cancellable(delay, cancel).await?;
                    attempt += 1;
                    stats.retry_count = attempt;
                }
                Decision::Fail => {
                    return Err(match err {
                        Error::SessionExpired { message, .. } => {
                            Error::SessionExpired { message, restarts }
                        }
                        other => other.with_attempts(attempt + 1),
                    });
                }
            }
        }
    }

    /// Ensure a session, record the request, and run one network attempt.
    async fn attempt(
        &self,
        input: &str,
        cancel: &CancellationToken,
        text: &mut String,
        stats: &mut CallStats,
        on_event: &mut (dyn FnMut(ChatEvent) + Send),
    ) -> Result<()> {
        let had_session = self.sessions.current_id().is_some();
        let session = cancellable(cancel, self.sessions.ensure_session()).await?;
        if !had_session {
            on_event(ChatEvent::SessionCreated {
                session_id: session.id.clone(),
            });
            self.report_usage(UsageEvent::session_created(&session.id));
        }
        stats.session_id = Some(session.id.clone());

        self.limiter.record_request(tokio::time::Instant::now());
        let out = self
            .execute_once(
                &session,
                input,
                &stats.client_request_id,
                cancel,
                text,
                on_event,
            )
            .await?;
        stats.http_status = Some(out.http_status);
        stats.first_delta_ms = out.first_delta.map(|d| d.as_millis());
        Ok(())
    }
}
