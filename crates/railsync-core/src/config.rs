// ── Runtime session configuration ──
//
// Describes *how* to reach a controller and how the sync loops are timed.
// Never touches disk: the CLI (via railsync-config) or a test builds a
// `SyncConfig` and hands it to `SyncSession::new`.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Configuration for one sync session against a single controller.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Controller HTTP root (e.g., `http://localhost:8080`).
    pub base_url: Url,
    /// Command channel URL. Derived from `base_url` (port + 1, `/json`)
    /// when unset.
    pub command_channel_url: Option<Url>,
    pub tls: TlsVerification,
    /// Per-request timeout for poll and command endpoints.
    pub timeout: Duration,
    /// Registry and port list refresh interval.
    pub poll_interval: Duration,
    /// Delay before an event stream or command channel reconnect.
    pub reconnect_delay: Duration,
    /// Delay between a version-looking reply and the registry refresh.
    pub version_refresh_delay: Duration,
    /// Delay between a successful version request and the registry refresh.
    pub request_version_refresh_delay: Duration,
    /// Capacity of the transport (event stream) log.
    pub transport_log_capacity: usize,
    /// Capacity of the raw command channel log.
    pub channel_log_capacity: usize,
    pub event_stream_enabled: bool,
    pub command_channel_enabled: bool,
}

impl SyncConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
    pub const DEFAULT_VERSION_REFRESH_DELAY: Duration = Duration::from_millis(500);
    pub const DEFAULT_REQUEST_VERSION_REFRESH_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_TRANSPORT_LOG_CAPACITY: usize = 500;
    pub const DEFAULT_CHANNEL_LOG_CAPACITY: usize = 300;

    /// Defaults for everything except the controller address.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            command_channel_url: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
            version_refresh_delay: Self::DEFAULT_VERSION_REFRESH_DELAY,
            request_version_refresh_delay: Self::DEFAULT_REQUEST_VERSION_REFRESH_DELAY,
            transport_log_capacity: Self::DEFAULT_TRANSPORT_LOG_CAPACITY,
            channel_log_capacity: Self::DEFAULT_CHANNEL_LOG_CAPACITY,
            event_stream_enabled: true,
            command_channel_enabled: true,
        }
    }

    /// Parse `url` and apply defaults.
    pub fn from_url(url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(url).map_err(|e| CoreError::Config {
            message: format!("invalid controller URL '{url}': {e}"),
        })?;
        match base_url.scheme() {
            "http" | "https" => Ok(Self::new(base_url)),
            other => Err(CoreError::Config {
                message: format!("unsupported URL scheme '{other}' (expected http or https)"),
            }),
        }
    }

    /// The command channel URL, explicit or derived.
    pub fn resolved_channel_url(&self) -> Result<Url, CoreError> {
        match &self.command_channel_url {
            Some(url) => Ok(url.clone()),
            None => Ok(railsync_api::derive_channel_url(&self.base_url)?),
        }
    }

    /// The event stream URL (`/api/events` under the base URL).
    pub fn event_stream_url(&self) -> Result<Url, CoreError> {
        self.base_url.join("api/events").map_err(|e| CoreError::Config {
            message: format!("invalid event stream URL: {e}"),
        })
    }

    pub(crate) fn transport(&self) -> railsync_api::TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => railsync_api::TlsMode::System,
            TlsVerification::CustomCa(path) => railsync_api::TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => railsync_api::TlsMode::DangerAcceptInvalid,
        };
        railsync_api::TransportConfig {
            tls,
            timeout: self.timeout,
            ..railsync_api::TransportConfig::default()
        }
    }
}
