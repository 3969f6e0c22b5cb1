mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use replifactory_core::Controller;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);
    output::init_color(cli.global.color);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // No backend needed
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "replifactory", &mut std::io::stdout());
            Ok(())
        }

        // Tunnel endpoints sit on the proxy root, not behind the API prefix
        Command::Tunnel(args) => {
            let cfg = config::load_config_or_default();
            let proxy = config::resolve_proxy_url(&cli.global, &cfg)?;
            let gateway = config::resolve_gateway(&cli.global, &cfg)?;
            commands::tunnel::handle(args, proxy, &gateway, &cli.global).await
        }

        cmd => {
            let cfg = config::load_config_or_default();
            let gateway = config::resolve_gateway(&cli.global, &cfg)?;
            let controller = Controller::new(gateway)?;

            tracing::debug!(command = ?cmd, gateway = %controller.config().url, "dispatching command");
            let result = commands::dispatch(cmd, &controller, &cli.global).await;
            controller.shutdown();
            result
        }
    }
}
