// Shared transport configuration for building reqwest::Client instances.
//
// The controller client and the event stream share one HTTP client so
// that TLS and timeout settings live in a single place.

use std::path::PathBuf;
use std::time::Duration;

/// TLS verification mode (api-level mirror of core's TLS setting).
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed controllers).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Per-request timeout for the poll and command endpoints.
    pub timeout: Duration,
    /// Connect timeout. Also applied to the event stream, which must not
    /// carry a whole-request timeout because the response never ends.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::default(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Build the `reqwest::Client` used for request/response endpoints.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        self.builder().timeout(self.timeout).build().map_err(|e| {
            crate::error::Error::Tls(format!("failed to build HTTP client: {e}"))
        })
    }

    /// Build a `reqwest::Client` for long-lived streaming responses.
    ///
    /// Identical to [`build_client`](Self::build_client) except that no
    /// overall request timeout is set.
    pub fn build_streaming_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        self.builder().build().map_err(|e| {
            crate::error::Error::Tls(format!("failed to build streaming HTTP client: {e}"))
        })
    }

    fn builder(&self) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(concat!("railsync/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => match std::fs::read(path)
                .ok()
                .and_then(|pem| reqwest::Certificate::from_pem(&pem).ok())
            {
                Some(cert) => builder = builder.add_root_certificate(cert),
                None => {
                    tracing::warn!(path = %path.display(), "could not load CA certificate, using system roots");
                }
            },
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
    }
}
