//! Request execution logic (single attempt).

use super::core::ChatClient;
use super::error_classification::{error_from_response, StatusScope};
use super::session::ChatSession;
use super::types::ChatEvent;
use crate::pipeline::{decode_stream, DecodedEvent};
use crate::utils::cancel::cancellable;
use crate::{BoxStream, Error, Result};
use futures::{StreamExt, TryStreamExt};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a successful attempt observed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttemptOutput {
    pub http_status: u16,
    pub first_delta: Option<Duration>,
}

impl ChatClient {
    /// Send `input` on `session` and stream the response into `text`.
    ///
    /// This is a single attempt (no retry). Increments are appended to `text` and forwarded
    /// to `on_event` in arrival order; `text` keeps whatever arrived if the attempt fails.
    pub(crate) async fn execute_once(
        &self,
        session: &ChatSession,
        input: &str,
        client_request_id: &str,
        cancel: &CancellationToken,
        text: &mut String,
        on_event: &mut (dyn FnMut(ChatEvent) + Send),
    ) -> Result<AttemptOutput> {
        let start = Instant::now();
        let resp = cancellable(
            cancel,
            self.transport
                .continue_chat(&session.id, input, client_request_id),
        )
        .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let err = cancellable(cancel, async {
                Ok::<_, Error>(
                    error_from_response(resp, StatusScope::Continue, "execute_once").await,
                )
            })
            .await?;
            info!(
                http_status = status,
                error_kind = err.kind().as_str(),
                session_id = session.id.as_str(),
                request_id = client_request_id,
                duration_ms = start.elapsed().as_millis() as u64,
                "chat request failed"
            );
            return Err(err);
        }

        debug!(
            http_status = status,
            request_id = client_request_id,
            "chat request started streaming"
        );

        let body: BoxStream<'static, bytes::Bytes> =
            Box::pin(resp.bytes_stream().map_err(Error::network));
        let mut events = decode_stream(body);
        let mut first_delta = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = events.next() => next,
            };
            match next {
                None | Some(Ok(DecodedEvent::Done)) => break,
                Some(Ok(DecodedEvent::Delta(delta))) => {
                    if first_delta.is_none() {
                        first_delta = Some(start.elapsed());
                    }
                    text.push_str(&delta);
                    on_event(ChatEvent::Delta(delta));
                }
                Some(Ok(DecodedEvent::Error(message))) => {
                    return Err(Error::Stream {
                        message,
                        attempts: 1,
                    });
                }
                Some(Err(e)) => return Err(e),
            }
        }

        Ok(AttemptOutput {
            http_status: status,
            first_delta,
        })
    }
}
