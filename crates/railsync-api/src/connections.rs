// Connection registry endpoints
//
// Polling reads (`/connections`, `/api/systems`, `/api/ports`) and the
// connection-management commands.

use serde_json::Value;
use tracing::debug;

use crate::client::ControllerClient;
use crate::error::Error;
use crate::models::{
    ConnectionRecord, ConnectionsResponse, CreateConnection, PortsResponse, Role,
    SystemDescriptor, SystemsResponse,
};

impl ControllerClient {
    /// List every connection the controller knows about.
    ///
    /// `GET /connections`
    pub async fn list_connections(&self) -> Result<Vec<ConnectionRecord>, Error> {
        let url = self.url("connections")?;
        let resp: ConnectionsResponse = self.get(url).await?;
        debug!(count = resp.connections.len(), "listed connections");
        Ok(resp.connections)
    }

    /// List the controller families the backend supports.
    ///
    /// `GET /api/systems`
    pub async fn list_systems(&self) -> Result<Vec<SystemDescriptor>, Error> {
        let url = self.url("api/systems")?;
        let resp: SystemsResponse = self.get(url).await?;
        Ok(resp.systems)
    }

    /// List serial ports currently present on the controller host.
    ///
    /// `GET /api/ports`
    pub async fn list_ports(&self) -> Result<Vec<String>, Error> {
        let url = self.url("api/ports")?;
        let resp: PortsResponse = self.get(url).await?;
        Ok(resp.ports)
    }

    /// Create and open a new command-station connection.
    ///
    /// `POST /connections/create?id&systemType&...`
    pub async fn create_connection(&self, request: &CreateConnection) -> Result<(), Error> {
        let url = self.url("connections/create")?;
        debug!(id = %request.id, system = %request.system_type, "creating connection");
        let _: Value = self.post_query(url, &request.query_pairs()).await?;
        Ok(())
    }

    /// Grant or revoke a controller role for a connection.
    ///
    /// `POST /connections/setRole?connectionId&role&enabled`
    pub async fn set_role(&self, connection_id: &str, role: Role, enabled: bool) -> Result<(), Error> {
        let url = self.url("connections/setRole")?;
        let query = [
            ("connectionId", connection_id.to_owned()),
            ("role", role.to_string()),
            ("enabled", enabled.to_string()),
        ];
        let _: Value = self.post_query(url, &query).await?;
        Ok(())
    }

    /// Ask a command station to report its version. The answer arrives
    /// asynchronously on the event stream and in the next registry poll.
    ///
    /// `POST /connections/requestVersion?id`
    pub async fn request_version(&self, connection_id: &str) -> Result<(), Error> {
        let url = self.url("connections/requestVersion")?;
        let _: Value = self.post_query(url, &[("id", connection_id.to_owned())]).await?;
        Ok(())
    }
}
