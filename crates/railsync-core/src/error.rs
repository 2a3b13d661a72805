// ── Core error types ──
//
// User-facing errors from railsync-core. Consumers never match on HTTP
// statuses or JSON parse failures directly; `From<railsync_api::Error>`
// folds transport-layer errors into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Controller request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Operation errors ─────────────────────────────────────────────
    /// The controller answered with `{error}` and a non-success status.
    #[error("{message}")]
    Rejected { message: String, status: u16 },

    /// User input failed validation; no request was sent.
    #[error("{message}")]
    Validation { message: String },

    #[error("No throttle is open")]
    NoFocusedThrottle,

    #[error("Command channel is not open")]
    ChannelNotOpen,

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String, status: Option<u16> },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// `true` for failures the next poll tick or reconnect may clear.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<railsync_api::Error> for CoreError {
    fn from(err: railsync_api::Error) -> Self {
        match err {
            railsync_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() || e.is_request() {
                    CoreError::ConnectionFailed {
                        url: e.url().map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            railsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            railsync_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            railsync_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            railsync_api::Error::Rejected { status, message } => {
                CoreError::Rejected { message, status }
            }
            railsync_api::Error::EventStream(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("Event stream failed: {reason}"),
            },
            railsync_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            railsync_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            railsync_api::Error::ChannelNotOpen => CoreError::ChannelNotOpen,
            railsync_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_keeps_the_controller_message() {
        let err: CoreError = railsync_api::Error::Rejected {
            status: 400,
            message: "Field 'address' is required".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Field 'address' is required");
        assert!(!err.is_transient());
    }

    #[test]
    fn channel_not_open_maps_across() {
        let err: CoreError = railsync_api::Error::ChannelNotOpen.into();
        assert!(matches!(err, CoreError::ChannelNotOpen));
    }
}
