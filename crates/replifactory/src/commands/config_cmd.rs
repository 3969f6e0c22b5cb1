//! Config subcommand handlers.

use dialoguer::{Confirm, Input};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const DEFAULT_GATEWAY: &str = "http://replifactory.local:3000/api";

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn format_config(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# failed to render config: {e}"))
}

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("Replifactory CLI configuration");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = config::load_config_or_default();

    // 1. Profile name
    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default(global.profile.clone().unwrap_or_else(|| "default".into()))
        .interact_text()
        .map_err(prompt_err)?;

    // 2. Gateway URL, checked before anything is written
    let gateway: String = Input::new()
        .with_prompt("Gateway API URL")
        .default(
            global
                .gateway
                .clone()
                .unwrap_or_else(|| DEFAULT_GATEWAY.into()),
        )
        .interact_text()
        .map_err(prompt_err)?;
    let mut profile = Profile::new(gateway);
    replifactory_config::profile_to_gateway_config(&profile, &cfg.defaults)?;

    // 3. Timeout
    let timeout: u64 = Input::new()
        .with_prompt("Request timeout (seconds)")
        .default(cfg.defaults.timeout)
        .interact_text()
        .map_err(prompt_err)?;
    if timeout != cfg.defaults.timeout {
        profile.timeout = Some(timeout);
    }

    // 4. Optional tunnel token
    let store_token = Confirm::new()
        .with_prompt("Store a tunnel auth token in the system keyring?")
        .default(false)
        .interact()
        .map_err(prompt_err)?;
    if store_token {
        let token = rpassword::prompt_password("Tunnel auth token: ").map_err(prompt_err)?;
        if !token.trim().is_empty() {
            replifactory_config::store_tunnel_token(token.trim())?;
            eprintln!("   Token stored in system keyring");
        }
    }

    cfg.profiles.insert(profile_name.clone(), profile);
    if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(profile_name.clone());
    }
    config::save_config(&cfg)?;

    eprintln!("\nConfiguration written to {}", config_path.display());
    eprintln!("  Profile: {profile_name}");
    eprintln!("\n  Test it: replifactory host");
    Ok(())
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(global.output, &cfg, format_config, |c| {
                c.default_profile.clone().unwrap_or_default()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
    }
}
