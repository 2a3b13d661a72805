//! Server-push event stream with fixed-delay auto-reconnect.
//!
//! Opens `GET /api/events` (`text/event-stream`) and forwards every decoded
//! [`ControllerEvent`] to an `mpsc` sink together with connection state
//! transitions. A broken or finished stream goes `Disconnected` and is
//! retried after a constant delay, forever, until shut down.
//!
//! ```rust,ignore
//! let (tx, mut rx) = tokio::sync::mpsc::channel(256);
//! let handle = EventStreamHandle::spawn(events_url, http, DEFAULT_RECONNECT_DELAY, tx, &cancel);
//!
//! while let Some(item) = rx.recv().await {
//!     if let StreamItem::Event(event) = item {
//!         println!("{}: {}", event.kind, event.connection_id);
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::ControllerEvent;
use crate::reconnect::{ReconnectTrigger, wait_for_reconnect};

// ── State & items ────────────────────────────────────────────────────

/// Lifecycle of the event stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StreamState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

/// Everything the stream reports to its consumer, in arrival order.
#[derive(Debug, Clone)]
pub enum StreamItem {
    State(StreamState),
    Event(ControllerEvent),
    /// A `data:` frame that did not parse as an event.
    Malformed { raw: String, error: String },
}

// ── SSE framing ──────────────────────────────────────────────────────

/// Incremental `text/event-stream` decoder.
///
/// Accumulates `data:` lines until a blank line dispatches them. Comment
/// lines and every other field are skipped. Lines may end in `\n` or `\r\n`,
/// and a chunk may split a line (or a UTF-8 sequence) anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk and return every complete event payload it finished.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    out.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_ref(), ""),
            };
            if field == "data" {
                self.data.push(value.to_owned());
            }
        }

        out
    }
}

/// Parse one dispatched payload into a stream item.
pub(crate) fn parse_frame(raw: String) -> StreamItem {
    match serde_json::from_str::<ControllerEvent>(&raw) {
        Ok(event) => StreamItem::Event(event),
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed event frame");
            StreamItem::Malformed {
                raw,
                error: e.to_string(),
            }
        }
    }
}

// ── EventStreamHandle ────────────────────────────────────────────────

/// Handle to a running event stream task.
///
/// There is exactly one background task per handle and that task holds at
/// most one live HTTP response, so replacing a handle (shut down the old
/// one, spawn a new one) never leaves two streams open.
pub struct EventStreamHandle {
    state_rx: watch::Receiver<StreamState>,
    manual: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventStreamHandle {
    /// Spawn the connect/read/retry loop.
    ///
    /// `http` must not carry an overall request timeout (see
    /// [`TransportConfig::build_streaming_client`](crate::TransportConfig::build_streaming_client)).
    /// The task stops when `parent` is cancelled, when
    /// [`shutdown`](Self::shutdown) is called, or when `sink` is closed.
    pub fn spawn(
        url: Url,
        http: reqwest::Client,
        reconnect_delay: Duration,
        sink: mpsc::Sender<StreamItem>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let (state_tx, state_rx) = watch::channel(StreamState::Disconnected);
        let manual = Arc::new(Notify::new());

        let task = tokio::spawn(stream_loop(
            url,
            http,
            reconnect_delay,
            sink,
            state_tx,
            Arc::clone(&manual),
            cancel.clone(),
        ));

        Self {
            state_rx,
            manual,
            cancel,
            task,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> StreamState {
        *self.state_rx.borrow()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Drop the live response (if any) and connect again without waiting
    /// out the reconnect delay.
    pub fn reconnect(&self) {
        self.manual.notify_one();
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "event stream task ended abnormally");
        }
    }
}

// ── Background loop ──────────────────────────────────────────────────

async fn stream_loop(
    url: Url,
    http: reqwest::Client,
    reconnect_delay: Duration,
    sink: mpsc::Sender<StreamItem>,
    state_tx: watch::Sender<StreamState>,
    manual: Arc<Notify>,
    cancel: CancellationToken,
) {
    let set_state = |state: StreamState| {
        state_tx.send_replace(state);
        let sink = sink.clone();
        async move { sink.send(StreamItem::State(state)).await.is_ok() }
    };

    loop {
        if !set_state(StreamState::Connecting).await {
            break;
        }

        let (result, requested) = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = manual.notified() => {
                tracing::info!("event stream reconnect requested");
                (Ok(()), true)
            }
            result = connect_and_read(&url, &http, &sink, &state_tx) => (result, false),
        };

        match result {
            Ok(()) => tracing::info!("event stream closed"),
            Err(e) => tracing::warn!(error = %e, "event stream error"),
        }

        if !set_state(StreamState::Disconnected).await || sink.is_closed() {
            break;
        }

        if requested {
            continue;
        }
        match wait_for_reconnect(reconnect_delay, &manual, &cancel).await {
            ReconnectTrigger::Shutdown => break,
            ReconnectTrigger::Manual | ReconnectTrigger::Scheduled => {}
        }
    }

    state_tx.send_replace(StreamState::Disconnected);
    tracing::debug!("event stream loop exiting");
}

/// Open one stream and forward frames until it ends or fails.
async fn connect_and_read(
    url: &Url,
    http: &reqwest::Client,
    sink: &mpsc::Sender<StreamItem>,
    state_tx: &watch::Sender<StreamState>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to event stream");

    let resp = http
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::EventStream(format!("HTTP {status}")));
    }

    state_tx.send_replace(StreamState::Open);
    if sink.send(StreamItem::State(StreamState::Open)).await.is_err() {
        return Ok(());
    }
    tracing::info!("event stream open");

    let mut body = resp.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = body.next().await {
        let chunk: bytes::Bytes = chunk?;
        for raw in decoder.feed(&chunk) {
            if sink.send(parse_frame(raw)).await.is_err() {
                return Ok(());
            }
        }
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;

    #[test]
    fn decoder_joins_data_lines_until_blank_line() {
        let mut decoder = SseDecoder::default();
        let out = decoder.feed(b"data: {\"type\":\ndata: \"connected\"}\n\n");
        assert_eq!(out, vec!["{\"type\":\n\"connected\"}".to_string()]);
    }

    #[test]
    fn decoder_handles_split_chunks_and_crlf() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b": keep-alive\r\nda").is_empty());
        assert!(decoder.feed(b"ta: one\r").is_empty());
        let out = decoder.feed(b"\n\r\nevent: ignored\ndata:two\n\n");
        assert_eq!(out, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"\n\nid: 7\n\n").is_empty());
    }

    #[test]
    fn frames_parse_into_events_or_malformed() {
        match parse_frame(r#"{"type":"POWER_CHANGED","connectionId":"A","payload":{"status":"ON"}}"#.into()) {
            StreamItem::Event(event) => {
                assert_eq!(event.kind, EventKind::PowerChanged);
                assert_eq!(event.connection_id, "A");
            }
            other => panic!("expected event, got {other:?}"),
        }

        match parse_frame("not json".into()) {
            StreamItem::Malformed { raw, .. } => assert_eq!(raw, "not json"),
            other => panic!("expected malformed, got {other:?}"),
        }
    }
}
