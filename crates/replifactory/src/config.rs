//! CLI configuration: thin wrapper around `replifactory_config`.
//!
//! Adds resolution that respects `GlobalOpts` overrides (--gateway,
//! --timeout, --profile).

use url::Url;

use replifactory_core::GatewayConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use replifactory_config::{
    Config, Profile, config_path, load_config_or_default, save_config,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// The profile in effect after applying `--gateway` and `--timeout`.
///
/// A `--gateway` flag works without any config file; an explicitly
/// requested `--profile` that does not exist is an error.
pub fn effective_profile(global: &GlobalOpts, config: &Config) -> Result<Profile, CliError> {
    let name = active_profile_name(global, config);
    let mut profile = match (config.profiles.get(&name), global.gateway.as_deref()) {
        (Some(profile), _) => profile.clone(),
        (None, Some(gateway)) => Profile::new(gateway),
        (None, None) if global.profile.is_some() => {
            let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(ref gateway) = global.gateway {
        profile.gateway.clone_from(gateway);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }
    Ok(profile)
}

/// Build the core `GatewayConfig` for this invocation.
pub fn resolve_gateway(global: &GlobalOpts, config: &Config) -> Result<GatewayConfig, CliError> {
    let profile = effective_profile(global, config)?;
    Ok(replifactory_config::profile_to_gateway_config(
        &profile,
        &config.defaults,
    )?)
}

/// Proxy root hosting the tunnel operator endpoints.
pub fn resolve_proxy_url(global: &GlobalOpts, config: &Config) -> Result<Url, CliError> {
    let profile = effective_profile(global, config)?;
    Ok(replifactory_config::profile_proxy_url(&profile)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::{ColorMode, OutputFormat};

    fn global() -> GlobalOpts {
        GlobalOpts {
            profile: None,
            gateway: None,
            output: OutputFormat::Table,
            color: ColorMode::Never,
            verbose: 0,
            quiet: false,
            yes: false,
            timeout: None,
        }
    }

    #[test]
    fn gateway_flag_works_without_profiles() {
        let mut opts = global();
        opts.gateway = Some("http://lab:3000/api".into());
        opts.timeout = Some(5);

        let gw = resolve_gateway(&opts, &Config::default()).unwrap();
        assert_eq!(gw.url.as_str(), "http://lab:3000/api");
        assert_eq!(gw.timeout.as_secs(), 5);
    }

    #[test]
    fn missing_everything_is_no_config() {
        let err = resolve_gateway(&global(), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn unknown_explicit_profile_lists_available() {
        let mut cfg = Config::default();
        cfg.profiles
            .insert("bench".into(), Profile::new("http://bench:3000/api"));
        let mut opts = global();
        opts.profile = Some("lab".into());

        match resolve_gateway(&opts, &cfg).unwrap_err() {
            CliError::ProfileNotFound { name, available } => {
                assert_eq!(name, "lab");
                assert_eq!(available, "bench");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn tunnel_endpoints_live_at_proxy_root() {
        let mut cfg = Config::default();
        cfg.profiles
            .insert("default".into(), Profile::new("http://pi.local:3000/api"));

        let url = resolve_proxy_url(&global(), &cfg).unwrap();
        assert_eq!(url.as_str(), "http://pi.local:3000/");
    }
}
