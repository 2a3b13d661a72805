// Integration tests for the event stream client against a wiremock SSE body.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use railsync_api::models::{EventKind, PowerPayload};
use railsync_api::{EventStreamHandle, StreamItem, StreamState};

const SSE_BODY: &str = concat!(
    ": stream start\n\n",
    "data: {\"type\":\"connected\"}\n\n",
    "data: {\"type\":\"POWER_CHANGED\",\"connectionId\":\"cs1\",\"payload\":{\"status\":\"OFF\"}}\r\n\r\n",
    "data: {broken\n\n",
    "data: {\"type\":\"MESSAGE_RECEIVED\",\"connectionId\":\"cs1\",",
    "\"payload\":{\"direction\":\"rx\",\"decoded\":\"Track power off\",\"hex\":\"61 00 61\"}}\n\n",
);

async fn sse_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/events"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"),
        )
        .mount(&server)
        .await;
    server
}

async fn next(rx: &mut mpsc::Receiver<StreamItem>) -> StreamItem {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for stream item")
        .expect("stream sink closed")
}

#[tokio::test]
async fn test_stream_delivers_events_in_order_and_skips_malformed() {
    let server = sse_server().await;
    let url = Url::parse(&format!("{}/api/events", server.uri())).unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    let handle = EventStreamHandle::spawn(url, reqwest::Client::new(), Duration::from_secs(60), tx, &cancel);

    assert!(matches!(next(&mut rx).await, StreamItem::State(StreamState::Connecting)));
    assert!(matches!(next(&mut rx).await, StreamItem::State(StreamState::Open)));

    match next(&mut rx).await {
        StreamItem::Event(event) => assert_eq!(event.kind, EventKind::StreamOpened),
        other => panic!("expected greeting, got {other:?}"),
    }

    match next(&mut rx).await {
        StreamItem::Event(event) => {
            assert_eq!(event.kind, EventKind::PowerChanged);
            let payload: PowerPayload = event.decode().unwrap();
            assert_eq!(payload.status.as_deref(), Some("OFF"));
        }
        other => panic!("expected power event, got {other:?}"),
    }

    match next(&mut rx).await {
        StreamItem::Malformed { raw, .. } => assert_eq!(raw, "{broken"),
        other => panic!("expected malformed frame, got {other:?}"),
    }

    match next(&mut rx).await {
        StreamItem::Event(event) => assert_eq!(event.kind, EventKind::MessageReceived),
        other => panic!("expected traffic event, got {other:?}"),
    }

    // The body ends, so the stream drops back to disconnected and waits.
    assert!(matches!(next(&mut rx).await, StreamItem::State(StreamState::Disconnected)));
    assert_eq!(handle.state(), StreamState::Disconnected);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_stream_reconnects_after_the_fixed_delay() {
    let server = sse_server().await;
    let url = Url::parse(&format!("{}/api/events", server.uri())).unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    let handle = EventStreamHandle::spawn(url, reqwest::Client::new(), Duration::from_millis(100), tx, &cancel);

    let mut connecting = 0;
    while connecting < 3 {
        if let StreamItem::State(StreamState::Connecting) = next(&mut rx).await {
            connecting += 1;
        }
    }

    handle.shutdown().await;
    let requests = server.received_requests().await.unwrap();
    assert!(requests.len() >= 2);
}

#[tokio::test]
async fn test_rejected_stream_goes_disconnected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/api/events", server.uri())).unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = EventStreamHandle::spawn(url, reqwest::Client::new(), Duration::from_secs(60), tx, &cancel);

    assert!(matches!(next(&mut rx).await, StreamItem::State(StreamState::Connecting)));
    assert!(matches!(next(&mut rx).await, StreamItem::State(StreamState::Disconnected)));

    // Parent cancellation stops the task too.
    cancel.cancel();
    handle.shutdown().await;
}
