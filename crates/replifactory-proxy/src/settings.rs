//! Runtime settings: the `[proxy]` config table with command-line
//! overrides applied and every field validated.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use replifactory_config::{ProxySettings, TunnelSettings};

use crate::error::ProxyError;

/// Serve the Replifactory GUI, forward its API calls, and keep a public
/// tunnel open.
#[derive(Debug, Default, Parser)]
#[command(name = "replifactory-proxy", version, about)]
pub struct ProxyArgs {
    /// Listen port
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Backend origin the API prefix is forwarded to
    #[arg(long, short = 'b')]
    pub backend: Option<String>,

    /// Directory holding the built GUI
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// URL prefix stripped before forwarding
    #[arg(long)]
    pub prefix: Option<String>,

    /// Seconds between tunnel status checks
    #[arg(long)]
    pub tunnel_poll_secs: Option<u64>,

    /// Tunnel program to launch
    #[arg(long)]
    pub tunnel_program: Option<String>,

    /// Webhook receiving `{hostname, url}` when the tunnel URL changes
    #[arg(long)]
    pub publish_webhook: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub log_json: bool,

    /// Write daily-rolled log files into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Validated proxy settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub backend: Url,
    pub static_dir: PathBuf,
    /// Always starts with `/` and never ends with one.
    pub prefix: String,
    pub tunnel_poll: Duration,
    pub tunnel: TunnelSettings,
    pub publish_webhook: Option<Url>,
    pub log_json: bool,
    pub log_dir: Option<PathBuf>,
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ProxyError> {
    let url: Url = raw.parse().map_err(|e| ProxyError::Settings {
        field: field.into(),
        reason: format!("invalid URL {raw}: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::Settings {
            field: field.into(),
            reason: format!("expected an http(s) URL, got {raw}"),
        });
    }
    Ok(url)
}

fn normalize_prefix(raw: &str) -> Result<String, ProxyError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ProxyError::Settings {
            field: "prefix".into(),
            reason: "prefix cannot be empty or `/`".into(),
        });
    }
    Ok(if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    })
}

impl Settings {
    /// Merge `args` over the configured table.
    pub fn resolve(config: &ProxySettings, args: &ProxyArgs) -> Result<Self, ProxyError> {
        let backend = args.backend.as_deref().unwrap_or(&config.backend);
        let prefix = args.prefix.as_deref().unwrap_or(&config.prefix);
        let poll_secs = args.tunnel_poll_secs.unwrap_or(config.tunnel_poll_secs);
        if poll_secs == 0 {
            return Err(ProxyError::Settings {
                field: "tunnel_poll_secs".into(),
                reason: "must be at least 1".into(),
            });
        }

        let mut tunnel = config.tunnel.clone();
        if let Some(ref program) = args.tunnel_program {
            tunnel.program.clone_from(program);
        }

        let webhook = args
            .publish_webhook
            .as_deref()
            .or(config.publish_webhook.as_deref())
            .map(|raw| parse_url("publish_webhook", raw))
            .transpose()?;

        Ok(Self {
            port: args.port.unwrap_or(config.port),
            backend: parse_url("backend", backend)?,
            static_dir: args
                .static_dir
                .clone()
                .unwrap_or_else(|| config.static_dir.clone()),
            prefix: normalize_prefix(prefix)?,
            tunnel_poll: Duration::from_secs(poll_secs),
            tunnel,
            publish_webhook: webhook,
            log_json: args.log_json || config.log_json,
            log_dir: args.log_dir.clone().or_else(|| config.log_dir.clone()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_table() {
        let settings = Settings::resolve(&ProxySettings::default(), &ProxyArgs::default()).unwrap();
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.backend.as_str(), "http://127.0.0.1:5000/");
        assert_eq!(settings.prefix, "/api");
        assert_eq!(settings.tunnel_poll, Duration::from_secs(60));
        assert!(settings.publish_webhook.is_none());
    }

    #[test]
    fn flags_override_config() {
        let args = ProxyArgs {
            port: Some(8080),
            backend: Some("http://10.0.0.2:5000".into()),
            prefix: Some("backend/".into()),
            tunnel_program: Some("cloudflared".into()),
            ..ProxyArgs::default()
        };
        let settings = Settings::resolve(&ProxySettings::default(), &args).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.backend.host_str(), Some("10.0.0.2"));
        assert_eq!(settings.prefix, "/backend");
        assert_eq!(settings.tunnel.program, "cloudflared");
    }

    #[test]
    fn rejects_bad_values() {
        let bad_backend = ProxyArgs {
            backend: Some("ftp://pi".into()),
            ..ProxyArgs::default()
        };
        assert!(Settings::resolve(&ProxySettings::default(), &bad_backend).is_err());

        let root_prefix = ProxyArgs {
            prefix: Some("/".into()),
            ..ProxyArgs::default()
        };
        assert!(Settings::resolve(&ProxySettings::default(), &root_prefix).is_err());

        let zero_poll = ProxyArgs {
            tunnel_poll_secs: Some(0),
            ..ProxyArgs::default()
        };
        assert!(Settings::resolve(&ProxySettings::default(), &zero_poll).is_err());
    }
}
