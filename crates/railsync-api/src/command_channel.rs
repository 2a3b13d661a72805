//! JSON command channel over WebSocket with fixed-delay auto-reconnect.
//!
//! The controller listens one port above its HTTP port at `/json`. Requests
//! are fire-and-forget `{id, type, method, data}` frames; replies and
//! unsolicited `method = "patch"` pushes come back with the same shape and
//! are forwarded raw and parsed to an `mpsc` sink. Every close schedules one
//! reconnect after a constant delay, which [`CommandChannelHandle::reconnect`]
//! can pre-empt.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::{AccessoryEntry, ChannelMessage, ThrottlePayload};
use crate::reconnect::{ReconnectTrigger, wait_for_reconnect};

/// Path of the command channel endpoint.
const CHANNEL_PATH: &str = "/json";

/// Derive the command channel URL from the controller's HTTP base URL:
/// same host, WebSocket scheme, port + 1, path `/json`.
pub fn derive_channel_url(base: &Url) -> Result<Url, Error> {
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    let host = base
        .host_str()
        .ok_or_else(|| Error::WebSocketConnect(format!("{base} has no host")))?;
    let port = base.port_or_known_default().unwrap_or(80);
    let port = port
        .checked_add(1)
        .ok_or_else(|| Error::WebSocketConnect(format!("no port above {port}")))?;

    Ok(Url::parse(&format!("{scheme}://{host}:{port}{CHANNEL_PATH}"))?)
}

// ── State & events ───────────────────────────────────────────────────

/// Lifecycle of the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

/// Everything the channel reports to its consumer, in arrival order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    State(ChannelState),
    /// A frame written to the socket.
    Sent(String),
    /// A frame read from the socket. `message` is `None` when the text was
    /// not a valid channel message.
    Received {
        raw: String,
        message: Option<ChannelMessage>,
    },
}

// ── Requests ─────────────────────────────────────────────────────────

/// An outbound channel frame. Every request carries a fresh UUID; replies
/// are not correlated by it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub method: String,
    pub data: Value,
}

impl ChannelRequest {
    pub fn new(kind: impl Into<String>, method: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            method: method.into(),
            data,
        }
    }

    /// Ask for a full status snapshot.
    pub fn status() -> Self {
        Self::new("status", "get", json!({}))
    }

    /// Read the current state of a throttle.
    pub fn throttle_get(address: u32, long_address: bool) -> Self {
        Self::new(
            "throttle",
            "get",
            json!({ "address": address, "longAddress": long_address }),
        )
    }

    /// Change speed, direction, or functions of a throttle. Only the fields
    /// set in `payload` are sent.
    pub fn throttle_post(payload: &ThrottlePayload) -> Self {
        let data = serde_json::to_value(payload).unwrap_or_else(|_| json!({}));
        Self::new("throttle", "post", data)
    }

    /// Set named accessory states (signals, routes).
    pub fn accessories_set(entries: &[AccessoryEntry]) -> Self {
        Self::new("accessories", "post", json!({ "accessories": entries }))
    }

    /// Throw or close a turnout by address.
    pub fn accessory_command(address: u32, closed: bool) -> Self {
        let state = if closed { "closed" } else { "thrown" };
        Self::new(
            "accessories",
            "post",
            json!({ "commands": [{ "address": address, "state": state }] }),
        )
    }

    /// Switch track power on a connection.
    pub fn power(connection_id: &str, on: bool) -> Self {
        let power = if on { "ON" } else { "OFF" };
        Self::new(
            "status",
            "post",
            json!({ "connectionId": connection_id, "power": power }),
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parse an inbound text frame. Returns `None` for anything that is not a
/// `{type, ...}` object.
pub fn parse_message(raw: &str) -> Option<ChannelMessage> {
    match serde_json::from_str(raw) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!(error = %e, "malformed command channel frame");
            None
        }
    }
}

// ── CommandChannelHandle ─────────────────────────────────────────────

/// Handle to a running command channel task.
pub struct CommandChannelHandle {
    url: Url,
    state_rx: watch::Receiver<ChannelState>,
    outbound: mpsc::UnboundedSender<String>,
    manual: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CommandChannelHandle {
    /// Spawn the connect/read/retry loop. The first attempt starts
    /// immediately.
    pub fn spawn(
        url: Url,
        reconnect_delay: Duration,
        sink: mpsc::Sender<ChannelEvent>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let manual = Arc::new(Notify::new());

        let task = tokio::spawn(channel_loop(
            url.clone(),
            reconnect_delay,
            sink,
            state_tx,
            outbound_rx,
            Arc::clone(&manual),
            cancel.clone(),
        ));

        Self {
            url,
            state_rx,
            outbound,
            manual,
            cancel,
            task,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Queue a request for sending and return its id.
    ///
    /// Fails with [`Error::ChannelNotOpen`] unless the channel is open.
    pub fn send(&self, request: &ChannelRequest) -> Result<String, Error> {
        if self.state() != ChannelState::Open {
            return Err(Error::ChannelNotOpen);
        }
        self.outbound
            .send(request.to_json())
            .map_err(|_| Error::ChannelNotOpen)?;
        Ok(request.id.clone())
    }

    /// Reconnect now. A pending scheduled attempt is discarded; an open
    /// socket is closed first.
    pub fn reconnect(&self) {
        tracing::info!("command channel manual reconnect");
        self.manual.notify_one();
    }

    /// Close the socket, stop the task, and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "command channel task ended abnormally");
        }
    }
}

// ── Background loop ──────────────────────────────────────────────────

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
    /// Closed by the peer or by the transport ending.
    Remote,
    /// Closed locally for a manual reconnect.
    Requested,
}

async fn channel_loop(
    url: Url,
    reconnect_delay: Duration,
    sink: mpsc::Sender<ChannelEvent>,
    state_tx: watch::Sender<ChannelState>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    manual: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        state_tx.send_replace(ChannelState::Connecting);
        if sink.send(ChannelEvent::State(ChannelState::Connecting)).await.is_err() {
            break;
        }

        let closed = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = run_connection(&url, &sink, &state_tx, &mut outbound, &manual) => result,
        };

        let requested = match closed {
            Ok(Closed::Requested) => true,
            Ok(Closed::Remote) => {
                tracing::info!("command channel closed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "command channel error");
                false
            }
        };

        // Frames queued for the old socket are not replayed.
        while outbound.try_recv().is_ok() {}

        state_tx.send_replace(ChannelState::Disconnected);
        if sink.send(ChannelEvent::State(ChannelState::Disconnected)).await.is_err() {
            break;
        }

        if requested {
            continue;
        }
        tracing::debug!(delay = ?reconnect_delay, "command channel reconnect scheduled");
        match wait_for_reconnect(reconnect_delay, &manual, &cancel).await {
            ReconnectTrigger::Shutdown => break,
            ReconnectTrigger::Manual | ReconnectTrigger::Scheduled => {}
        }
    }

    state_tx.send_replace(ChannelState::Disconnected);
    tracing::debug!("command channel loop exiting");
}

/// Connect once and pump frames in both directions until the socket closes.
async fn run_connection(
    url: &Url,
    sink: &mpsc::Sender<ChannelEvent>,
    state_tx: &watch::Sender<ChannelState>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    manual: &Notify,
) -> Result<Closed, Error> {
    tracing::info!(url = %url, "connecting command channel");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    state_tx.send_replace(ChannelState::Open);
    if sink.send(ChannelEvent::State(ChannelState::Open)).await.is_err() {
        return Ok(Closed::Remote);
    }
    tracing::info!("command channel open");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = manual.notified() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not sent");
                }
                return Ok(Closed::Requested);
            }
            Some(text) = outbound.recv() => {
                write
                    .send(Message::text(text.clone()))
                    .await
                    .map_err(|e| Error::WebSocketClosed { code: 1006, reason: e.to_string() })?;
                if sink.send(ChannelEvent::Sent(text)).await.is_err() {
                    return Ok(Closed::Remote);
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let raw = text.as_str().to_owned();
                    let message = parse_message(&raw);
                    if sink.send(ChannelEvent::Received { raw, message }).await.is_err() {
                        return Ok(Closed::Remote);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(cf) = frame {
                        tracing::info!(code = %cf.code, reason = %cf.reason, "command channel close frame");
                    }
                    return Ok(Closed::Remote);
                }
                Some(Err(e)) => {
                    return Err(Error::WebSocketClosed { code: 1006, reason: e.to_string() });
                }
                None => return Ok(Closed::Remote),
                Some(Ok(_)) => {
                    // Binary, Ping, Pong: tungstenite answers pings itself.
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn channel_url_is_one_port_above_http() {
        let url = derive_channel_url(&Url::parse("http://panel.local:8080/").unwrap()).unwrap();
        assert_eq!(url.as_str(), "ws://panel.local:8081/json");
    }

    #[test]
    fn channel_url_uses_scheme_default_port() {
        let url = derive_channel_url(&Url::parse("https://panel.local").unwrap()).unwrap();
        assert_eq!(url.as_str(), "wss://panel.local:444/json");

        let url = derive_channel_url(&Url::parse("http://127.0.0.1").unwrap()).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:81/json");
    }

    #[test]
    fn requests_carry_distinct_ids() {
        let a = ChannelRequest::status();
        let b = ChannelRequest::status();
        assert_ne!(a.id, b.id);
        assert_eq!(uuid::Uuid::parse_str(&a.id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn throttle_post_omits_unset_fields() {
        let req = ChannelRequest::throttle_post(&ThrottlePayload {
            address: 3,
            speed: Some(0.5),
            ..ThrottlePayload::default()
        });
        assert_eq!(req.data, json!({ "address": 3, "longAddress": false, "speed": 0.5 }));

        let wire: Value = serde_json::from_str(&req.to_json()).unwrap();
        assert_eq!(wire["type"], "throttle");
        assert_eq!(wire["method"], "post");
    }

    #[test]
    fn accessory_and_power_payloads() {
        let req = ChannelRequest::accessory_command(12, false);
        assert_eq!(req.data, json!({ "commands": [{ "address": 12, "state": "thrown" }] }));

        let req = ChannelRequest::power("cs1", true);
        assert_eq!(req.kind, "status");
        assert_eq!(req.data, json!({ "connectionId": "cs1", "power": "ON" }));
    }

    #[test]
    fn malformed_frames_parse_to_none() {
        assert!(parse_message("{not json").is_none());
        assert!(parse_message(r#"{"data":{}}"#).is_none());
        assert!(parse_message(r#"{"type":"status","data":{"status":"ok"}}"#).is_some());
    }
}
