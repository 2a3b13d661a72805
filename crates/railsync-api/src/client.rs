// Controller HTTP client
//
// Wraps `reqwest::Client` with URL construction against the controller
// root and the `{ }` / `{error}` reply convention. Endpoint methods live
// in `connections.rs` and `devices.rs` as inherent impls so this module
// stays focused on transport mechanics.

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::ErrorBody;
use crate::transport::TransportConfig;

/// HTTP client for the controller's poll and command endpoints.
///
/// Every method maps a non-success status to [`Error::Rejected`], carrying
/// the controller's `error` message when the body has one.
#[derive(Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ControllerClient {
    /// Create a client from a `TransportConfig`. `base_url` is the
    /// controller root, e.g. `http://localhost:8080`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Join `path` (no leading slash) onto the controller root.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// Like [`url`](Self::url), then append one percent-encoded path segment
    /// per entry of `segments`. Throttle ids contain `:` and are user data,
    /// so they are never spliced into a path string directly.
    pub(crate) fn url_with_segments(&self, path: &str, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.url(path)?;
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            parts.pop_if_empty();
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        Self::decode(resp).await
    }

    /// Send a POST with query parameters and no body.
    pub(crate) async fn post_query<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        debug!(?query, "POST {}", url);
        let resp = self.http.post(url).query(query).send().await?;
        Self::decode(resp).await
    }

    /// Send a DELETE request.
    pub(crate) async fn delete<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("DELETE {}", url);
        let resp = self.http.delete(url).send().await?;
        Self::decode(resp).await
    }

    /// Map the status code, then decode the JSON body.
    ///
    /// Rejections surface the `{error}` message; a rejection whose body is
    /// not JSON reports `"Unknown error"`.
    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| "Unknown error".into());
            return Err(Error::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        // Empty bodies decode as `{}` so unit-like replies still parse.
        let text = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
