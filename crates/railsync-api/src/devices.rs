// Throttle and accessory command endpoints
//
// Throttles are opened by address and then addressed by the server-issued
// throttle id for speed, direction, and function changes.

use serde_json::Value;
use tracing::debug;

use crate::client::ControllerClient;
use crate::error::Error;
use crate::models::ThrottleOpened;

impl ControllerClient {
    /// Throw or close a turnout.
    ///
    /// `POST /api/accessories?address&closed`
    pub async fn set_accessory(&self, address: u32, closed: bool) -> Result<(), Error> {
        let url = self.url("api/accessories")?;
        debug!(address, closed, "setting accessory");
        let query = [("address", address.to_string()), ("closed", closed.to_string())];
        let _: Value = self.post_query(url, &query).await?;
        Ok(())
    }

    /// Open (or reuse) a throttle on the assigned throttle controller.
    ///
    /// `POST /api/throttles?address&longAddress` → `{id}`
    pub async fn open_throttle(&self, address: u32, long_address: bool) -> Result<ThrottleOpened, Error> {
        let url = self.url("api/throttles")?;
        debug!(address, long_address, "opening throttle");
        let query = [
            ("address", address.to_string()),
            ("longAddress", long_address.to_string()),
        ];
        self.post_query(url, &query).await
    }

    /// Release a throttle.
    ///
    /// `DELETE /api/throttles/{id}`
    pub async fn close_throttle(&self, throttle_id: &str) -> Result<(), Error> {
        let url = self.url_with_segments("api/throttles", &[throttle_id])?;
        let _: Value = self.delete(url).await?;
        Ok(())
    }

    /// Set normalised speed in `[0.0, 1.0]`.
    ///
    /// `POST /api/throttles/{id}/speed?value`
    pub async fn set_speed(&self, throttle_id: &str, value: f64) -> Result<(), Error> {
        let url = self.url_with_segments("api/throttles", &[throttle_id, "speed"])?;
        let _: Value = self.post_query(url, &[("value", value.to_string())]).await?;
        Ok(())
    }

    /// `POST /api/throttles/{id}/direction?forward`
    pub async fn set_direction(&self, throttle_id: &str, forward: bool) -> Result<(), Error> {
        let url = self.url_with_segments("api/throttles", &[throttle_id, "direction"])?;
        let _: Value = self.post_query(url, &[("forward", forward.to_string())]).await?;
        Ok(())
    }

    /// `POST /api/throttles/{id}/function?number&on`
    pub async fn set_function(&self, throttle_id: &str, number: u32, on: bool) -> Result<(), Error> {
        let url = self.url_with_segments("api/throttles", &[throttle_id, "function"])?;
        let query = [("number", number.to_string()), ("on", on.to_string())];
        let _: Value = self.post_query(url, &query).await?;
        Ok(())
    }
}
