// System endpoints

use crate::client::GatewayClient;
use crate::error::Error;
use crate::models::HostnameResponse;

impl GatewayClient {
    /// Display name of the host running the backend.
    ///
    /// `GET /hostname`
    pub async fn hostname(&self) -> Result<String, Error> {
        let resp: HostnameResponse = self.get("hostname").await?;
        Ok(resp.hostname)
    }
}
