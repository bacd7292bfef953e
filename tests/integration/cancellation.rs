//! Cancellation while a response is streaming, and supersession of in-flight sends.

use crate::hanging_server::HangingServer;
use crate::mock_server::fast_policy;
use chat_connector::{ChatClient, ChatEvent, ChatOutcome};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const GUARD: Duration = Duration::from_secs(10);

fn client_for(server: &HangingServer) -> ChatClient {
    ChatClient::builder(&server.base_url)
        .policy(fast_policy())
        .build()
        .expect("client should build")
}

#[tokio::test]
async fn test_cancel_after_first_delta_via_callback() {
    let server = HangingServer::start("s1", "Hel").await;
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let outcome = timeout(
        GUARD,
        client.send_message_with("hello", &cancel, move |event| {
            if matches!(event, ChatEvent::Delta(_)) {
                trigger.cancel();
            }
        }),
    )
    .await
    .expect("cancellation should end the send promptly")
    .expect("cancellation is not an error");

    assert_eq!(
        outcome,
        ChatOutcome::Cancelled {
            partial: "Hel".into()
        }
    );
    assert_eq!(server.continue_calls(), 1);
    assert!(!client.signals().inflight);
}

#[tokio::test]
async fn test_cancel_after_first_delta_via_stream() {
    let server = HangingServer::start("s1", "Hel").await;
    let client = client_for(&server);
    let cancel = CancellationToken::new();
    let mut stream = client.stream_message_with_cancel("hello", &cancel);

    let mut last = None;
    let drained = timeout(GUARD, async {
        while let Some(item) = stream.next().await {
            let event = item.expect("no error items expected");
            if matches!(event, ChatEvent::Delta(_)) {
                cancel.cancel();
            }
            last = Some(event);
        }
    })
    .await;
    assert!(drained.is_ok(), "stream did not end after cancellation");

    assert_eq!(
        last,
        Some(ChatEvent::Cancelled {
            partial: "Hel".into()
        })
    );
    assert_eq!(server.continue_calls(), 1);
}

#[tokio::test]
async fn test_cancel_inflight_from_another_task() {
    let server = HangingServer::start("s1", "Hel").await;
    let client = client_for(&server);
    let mut stream = client.stream_message("hello");

    // Wait for the increment so the send is known to be streaming.
    loop {
        match timeout(GUARD, stream.next()).await.expect("events keep coming") {
            Some(Ok(ChatEvent::Delta(_))) => break,
            Some(Ok(_)) => continue,
            other => panic!("unexpected item {other:?}"),
        }
    }
    assert!(client.signals().inflight);
    assert!(client.cancel_inflight());

    let last = timeout(GUARD, stream.next()).await.expect("terminal event");
    assert!(matches!(last, Some(Ok(ChatEvent::Cancelled { .. }))));
    assert!(!client.cancel_inflight());
}

#[tokio::test]
async fn test_new_send_supersedes_inflight_send() {
    let server = HangingServer::start("s1", "Hel").await;
    let client = client_for(&server);
    let mut first = client.stream_message("first");

    loop {
        match timeout(GUARD, first.next()).await.expect("events keep coming") {
            Some(Ok(ChatEvent::Delta(_))) => break,
            Some(Ok(_)) => continue,
            other => panic!("unexpected item {other:?}"),
        }
    }

    let mut second = client.stream_message("second");
    let superseded = timeout(GUARD, first.next()).await.expect("first send ends");
    assert!(matches!(
        superseded,
        Some(Ok(ChatEvent::Cancelled { ref partial })) if partial == "Hel"
    ));

    let next = timeout(GUARD, second.next()).await.expect("second send runs");
    assert!(next.is_some());
}

#[tokio::test]
async fn test_dropping_stream_cancels_send() {
    let server = HangingServer::start("s1", "Hel").await;
    let client = client_for(&server);
    let mut stream = client.stream_message("hello");

    loop {
        match timeout(GUARD, stream.next()).await.expect("events keep coming") {
            Some(Ok(ChatEvent::Delta(_))) => break,
            Some(Ok(_)) => continue,
            other => panic!("unexpected item {other:?}"),
        }
    }
    drop(stream);

    let cleared = timeout(GUARD, async {
        while client.signals().inflight {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(cleared.is_ok(), "in-flight send outlived its stream");
    assert_eq!(server.continue_calls(), 1);
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let fixture = crate::mock_server::MockServerFixture::new().await;
    fixture.mock_session("s1", 1).await;
    let unavailable = fixture.mock_continue_status("s1", 503, &[], 1).await;

    let policy = fast_policy()
        .with_base_delay(Duration::from_secs(30))
        .with_max_delay(Duration::from_secs(60));
    let client = fixture.client(policy);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let outcome = timeout(
        GUARD,
        client.send_message_with("hello", &cancel, move |event| {
            if matches!(event, ChatEvent::Retrying { .. }) {
                trigger.cancel();
            }
        }),
    )
    .await
    .expect("backoff wait should be interrupted")
    .expect("cancellation is not an error");

    assert!(outcome.is_cancelled());
    unavailable.assert_async().await;
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let client = ChatClient::builder("http://127.0.0.1:1")
        .policy(fast_policy())
        .build()
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = client.send_message("hello", &cancel).await.unwrap();
    assert_eq!(
        outcome,
        ChatOutcome::Cancelled {
            partial: String::new()
        }
    );
}
