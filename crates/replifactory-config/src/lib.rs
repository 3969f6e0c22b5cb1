//! Shared configuration for the Replifactory CLI and proxy.
//!
//! TOML profiles, proxy settings, tunnel-token resolution (keyring, env,
//! runtime value) and translation to `replifactory_core::GatewayConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use replifactory_core::{DEFAULT_NOTIFICATION_CAPACITY, GatewayConfig};

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "replifactory";
/// Keyring entry holding the tunnel provider token.
pub const TUNNEL_TOKEN_KEY: &str = "tunnel/authtoken";
/// Environment fallback for the tunnel token.
pub const TUNNEL_TOKEN_ENV: &str = "REPLIFACTORY_TUNNEL_AUTHTOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Settings for `replifactory-proxy`.
    #[serde(default)]
    pub proxy: ProxySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
            proxy: ProxySettings::default(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Timeout for hardware sequences (pump calibration) in seconds.
    #[serde(default = "default_long_running_timeout")]
    pub long_running_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            long_running_timeout: default_long_running_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_long_running_timeout() -> u64 {
    600
}

/// A named backend profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL as seen through the proxy (e.g. "http://replifactory.local:3000/api").
    pub gateway: String,

    /// Proxy root for the tunnel endpoints. Defaults to the gateway's origin.
    pub proxy: Option<String>,

    /// Override request timeout (seconds).
    pub timeout: Option<u64>,

    /// Override long-running timeout (seconds).
    pub long_running_timeout: Option<u64>,

    /// Bound on each notification log.
    pub notification_capacity: Option<usize>,
}

impl Profile {
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            proxy: None,
            timeout: None,
            long_running_timeout: None,
            notification_capacity: None,
        }
    }
}

/// Proxy server settings. Overridable via `REPLIFACTORY_PROXY__*`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProxySettings {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Backend the API prefix is forwarded to.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Built GUI served at `/`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Path prefix stripped before forwarding.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Seconds between tunnel health checks.
    #[serde(default = "default_tunnel_poll_secs")]
    pub tunnel_poll_secs: u64,

    #[serde(default)]
    pub tunnel: TunnelSettings,

    /// Where to POST `{hostname, url}` when the tunnel URL changes.
    pub publish_webhook: Option<String>,

    /// Emit JSON log lines.
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily-rolled log files.
    pub log_dir: Option<PathBuf>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            backend: default_backend(),
            static_dir: default_static_dir(),
            prefix: default_prefix(),
            tunnel_poll_secs: default_tunnel_poll_secs(),
            tunnel: TunnelSettings::default(),
            publish_webhook: None,
            log_json: false,
            log_dir: None,
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_backend() -> String {
    "http://127.0.0.1:5000".into()
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("dist")
}
fn default_prefix() -> String {
    "/api".into()
}
fn default_tunnel_poll_secs() -> u64 {
    60
}

/// External tunnel program. `{port}` and `{token}` in `args` are
/// substituted at launch.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TunnelSettings {
    #[serde(default = "default_tunnel_program")]
    pub program: String,

    #[serde(default = "default_tunnel_args")]
    pub args: Vec<String>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            program: default_tunnel_program(),
            args: default_tunnel_args(),
        }
    }
}

fn default_tunnel_program() -> String {
    "ngrok".into()
}
fn default_tunnel_args() -> Vec<String> {
    ["http", "{port}", "--authtoken", "{token}", "--log", "stdout"]
        .into_iter()
        .map(String::from)
        .collect()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "replifactory", "replifactory").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("replifactory");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("REPLIFACTORY_").split("__"));

    Ok(figment.extract()?)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML at the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Tunnel token ────────────────────────────────────────────────────

fn token_entry() -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(KEYRING_SERVICE, TUNNEL_TOKEN_KEY)?)
}

/// Store the tunnel token in the system keyring.
pub fn store_tunnel_token(token: &str) -> Result<(), ConfigError> {
    token_entry()?.set_password(token)?;
    Ok(())
}

/// Resolve the tunnel token: keyring first, then the environment.
pub fn resolve_tunnel_token() -> Option<SecretString> {
    // 1. System keyring
    let stored = keyring::Entry::new(KEYRING_SERVICE, TUNNEL_TOKEN_KEY).and_then(|e| e.get_password());
    if let Ok(secret) = stored {
        return Some(SecretString::from(secret));
    }

    // 2. Environment
    std::env::var(TUNNEL_TOKEN_ENV)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .map(SecretString::from)
}

// ── Profile translation ─────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url: Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(url)
    } else {
        Err(ConfigError::Validation {
            field: field.into(),
            reason: format!("expected http or https, got '{}'", url.scheme()),
        })
    }
}

/// Build a `GatewayConfig` from a profile, falling back to `defaults`.
pub fn profile_to_gateway_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<GatewayConfig, ConfigError> {
    let url = parse_url("gateway", &profile.gateway)?;

    let mut config = GatewayConfig::new(url);
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.long_running_timeout = Duration::from_secs(
        profile
            .long_running_timeout
            .unwrap_or(defaults.long_running_timeout),
    );
    config.notification_capacity = profile
        .notification_capacity
        .unwrap_or(DEFAULT_NOTIFICATION_CAPACITY);
    Ok(config)
}

/// Proxy root for tunnel operator endpoints.
pub fn profile_proxy_url(profile: &Profile) -> Result<Url, ConfigError> {
    if let Some(ref proxy) = profile.proxy {
        return parse_url("proxy", proxy);
    }
    let mut url = parse_url("gateway", &profile.gateway)?;
    url.set_path("/");
    url.set_query(None);
    Ok(url)
}

// ── Tests ───────────────────────────────────────────────────────────
