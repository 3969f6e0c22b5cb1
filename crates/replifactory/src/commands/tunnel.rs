//! Tunnel command handlers.
//!
//! These talk to the proxy's operator endpoints directly; no store is
//! involved.

use secrecy::SecretString;
use serde::Serialize;
use url::Url;

use replifactory_api::{GatewayClient, TransportConfig};
use replifactory_core::GatewayConfig;

use crate::cli::{GlobalOpts, TunnelArgs, TunnelCommand};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TunnelView {
    running: Option<bool>,
    tunnel_url: Option<String>,
}

fn detail(view: &TunnelView) -> String {
    let mut lines = Vec::new();
    if let Some(running) = view.running {
        lines.push(format!("Running: {}", if running { "yes" } else { "no" }));
    }
    lines.push(format!(
        "URL:     {}",
        view.tunnel_url.as_deref().unwrap_or("-")
    ));
    lines.join("\n")
}

fn print_view(view: &TunnelView, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(global.output, view, detail, |v| {
        v.tunnel_url.clone().unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn read_token(flag: Option<String>) -> Result<SecretString, CliError> {
    let token = match flag {
        Some(token) => token,
        None => rpassword::prompt_password("Tunnel auth token: ")?,
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(SecretString::from(token.to_owned()))
}

pub async fn handle(
    args: TunnelArgs,
    proxy: Url,
    gateway: &GatewayConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let transport = TransportConfig {
        timeout: gateway.timeout,
        long_running_timeout: gateway.long_running_timeout,
    };
    let client = GatewayClient::new(proxy, &transport)?;
    tracing::debug!(proxy = %client.base_url(), "tunnel operator endpoint");

    match args.command {
        TunnelCommand::SetToken { token, store } => {
            let token = read_token(token)?;
            if store {
                replifactory_config::store_tunnel_token(secrecy::ExposeSecret::expose_secret(
                    &token,
                ))?;
                output::status("Token stored in system keyring", global.quiet);
            }
            let resp = client.set_tunnel_authtoken(&token).await?;
            output::status(&resp.message, global.quiet);
            print_view(
                &TunnelView {
                    running: None,
                    tunnel_url: resp.tunnel_url,
                },
                global,
            )
        }

        TunnelCommand::Url => {
            let tunnel_url = client.tunnel_url().await?;
            print_view(
                &TunnelView {
                    running: None,
                    tunnel_url,
                },
                global,
            )
        }

        TunnelCommand::Start => {
            let status = client.start_tunnel().await?;
            print_view(
                &TunnelView {
                    running: Some(status.running),
                    tunnel_url: status.tunnel_url,
                },
                global,
            )
        }

        TunnelCommand::Stop => {
            let status = client.stop_tunnel().await?;
            print_view(
                &TunnelView {
                    running: Some(status.running),
                    tunnel_url: status.tunnel_url,
                },
                global,
            )
        }
    }
}
