//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use railsync_config::ConfigError;
use railsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller at {url}")]
    #[diagnostic(
        code(railsync::connection_failed),
        help(
            "Check that the controller is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Command channel is not open")]
    #[diagnostic(
        code(railsync::channel_not_open),
        help(
            "The command channel listens on the controller port + 1 by default.\n\
             Set command_channel in your profile if it lives elsewhere."
        )
    )]
    ChannelNotOpen,

    #[error("{what} timed out after {seconds}s")]
    #[diagnostic(
        code(railsync::timeout),
        help("Increase timeout with --timeout or check controller responsiveness.")
    )]
    Timeout { what: String, seconds: u64 },

    // ── Controller ───────────────────────────────────────────────────
    #[error("Controller rejected the request ({status}): {message}")]
    #[diagnostic(code(railsync::rejected))]
    Rejected { status: u16, message: String },

    #[error("API error: {message}")]
    #[diagnostic(code(railsync::api_error))]
    ApiError { message: String },

    #[error("No throttle is open")]
    #[diagnostic(
        code(railsync::no_throttle),
        help("Open one with: railsync throttle <ADDRESS>")
    )]
    NoThrottle,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(railsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(railsync::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(railsync::no_config),
        help(
            "Pass --controller http://HOST:PORT, set RAILSYNC_CONTROLLER,\n\
             or add a profile to {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(railsync::config))]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    #[diagnostic(code(railsync::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(railsync::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ChannelNotOpen => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { status: 404, .. } | Self::ProfileNotFound { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Rejected { status: 409, .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::NoThrottle => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                what: "Request".into(),
                seconds: timeout_secs,
            },
            CoreError::Rejected { message, status } => Self::Rejected { status, message },
            CoreError::Validation { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::NoFocusedThrottle => Self::NoThrottle,
            CoreError::ChannelNotOpen => Self::ChannelNotOpen,
            CoreError::Api { message, status: _ } => Self::ApiError { message },
            CoreError::Config { message } => Self::Config { message },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { name } => Self::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_pick_exit_codes_by_status() {
        let missing: CliError = CoreError::Rejected {
            message: "Throttle not found".into(),
            status: 404,
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let taken: CliError = CoreError::Rejected {
            message: "Role already assigned".into(),
            status: 409,
        }
        .into();
        assert_eq!(taken.exit_code(), exit_code::CONFLICT);

        let broken: CliError = CoreError::Rejected {
            message: "boom".into(),
            status: 500,
        }
        .into();
        assert_eq!(broken.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err: CliError = ConfigError::Validation {
            field: "controller".into(),
            reason: "invalid URL".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
        assert_eq!(err.to_string(), "Invalid value for controller: invalid URL");
    }
}
