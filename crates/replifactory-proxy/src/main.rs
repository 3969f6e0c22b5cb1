//! `replifactory-proxy`: serves the GUI, forwards the API prefix to the
//! backend and keeps the public tunnel alive.
//!
//! Settings come from the `[proxy]` table of the shared config file and
//! `REPLIFACTORY_PROXY__*` variables; flags override both.

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use replifactory_proxy::{AppState, ProxyArgs, Settings};

const LOG_FILE: &str = "replifactory-proxy.log";

/// Logs go to stderr, as JSON when asked, and to a daily file when a
/// log directory is set. The guard must outlive the server.
fn setup_tracing(settings: &Settings, verbose: u8) -> Option<WorkerGuard> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "replifactory_proxy={level},tower_http={level},warn"
        ))
    });

    let (file_layer, guard) = match settings.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    let json_layer = settings
        .log_json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!settings.log_json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ProxyArgs::parse();
    let config = replifactory_config::load_config().into_diagnostic()?;
    let settings = Settings::resolve(&config.proxy, &args).into_diagnostic()?;
    let _guard = setup_tracing(&settings, args.verbose);

    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .into_diagnostic()?;
    let state = AppState::new(settings).into_diagnostic()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        on_signal.cancel();
    });

    replifactory_proxy::serve(state, listener, cancel)
        .await
        .into_diagnostic()
}
