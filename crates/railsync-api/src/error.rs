use thiserror::Error;

/// Top-level error type for the `railsync-api` crate.
///
/// Covers every failure mode across the three wire surfaces: the HTTP
/// command/poll endpoints, the server-push event stream, and the JSON
/// command channel. `railsync-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Controller responses ────────────────────────────────────────
    /// The controller answered with a non-success status. `message` is the
    /// `error` field of the `{error: string}` body when one was sent.
    #[error("Controller rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    // ── Event stream ────────────────────────────────────────────────
    /// The event stream answered with something other than a live stream.
    #[error("Event stream failed: {0}")]
    EventStream(String),

    // ── Command channel ─────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// An outbound message was submitted while the command channel was not open.
    #[error("Command channel is not open")]
    ChannelNotOpen,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying on the
    /// next poll tick or reconnect timer.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. }
            | Self::EventStream(_)
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the controller reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Rejected { status: 404, .. } => true,
            _ => false,
        }
    }

    /// The HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_rejections_are_transient_client_rejections_are_not() {
        let server = Error::Rejected {
            status: 503,
            message: "busy".into(),
        };
        let client = Error::Rejected {
            status: 400,
            message: "Field 'address' is required".into(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert_eq!(client.status(), Some(400));
    }

    #[test]
    fn channel_not_open_is_not_transient() {
        assert!(!Error::ChannelNotOpen.is_transient());
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
    }
}
