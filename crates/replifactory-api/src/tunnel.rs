// Tunnel operator endpoints
//
// These live on the proxy itself, not behind the API prefix, so callers
// build a `GatewayClient` rooted at the proxy origin.

use secrecy::{ExposeSecret, SecretString};

use crate::client::GatewayClient;
use crate::error::Error;
use crate::models::{AuthTokenRequest, AuthTokenResponse, TunnelStatus, TunnelUrlResponse};

impl GatewayClient {
    /// Store a tunnel auth token and (re)start the tunnel.
    ///
    /// `POST /tunnels/set-authtoken`
    pub async fn set_tunnel_authtoken(
        &self,
        token: &SecretString,
    ) -> Result<AuthTokenResponse, Error> {
        let body = AuthTokenRequest {
            authtoken: token.expose_secret().to_owned(),
        };
        self.post("tunnels/set-authtoken", &body).await
    }

    /// `GET /tunnels/get-url`
    pub async fn tunnel_url(&self) -> Result<Option<String>, Error> {
        let resp: TunnelUrlResponse = self.get("tunnels/get-url").await?;
        Ok(resp.tunnel_url)
    }

    /// `POST /tunnels/start`
    pub async fn start_tunnel(&self) -> Result<TunnelStatus, Error> {
        self.post_empty("tunnels/start").await
    }

    /// `POST /tunnels/stop`
    pub async fn stop_tunnel(&self) -> Result<TunnelStatus, Error> {
        self.post_empty("tunnels/stop").await
    }
}
