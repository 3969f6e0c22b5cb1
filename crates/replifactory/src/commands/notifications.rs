//! Notification stream handler.

use chrono::Local;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use replifactory_core::{ChannelState, Controller, NotificationEvent};

use crate::cli::{GlobalOpts, NotificationsArgs, NotificationsCommand, OutputFormat};
use crate::error::CliError;
use crate::output;

fn structured(format: OutputFormat) -> bool {
    matches!(
        format,
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml
    )
}

fn print_toast(event: &NotificationEvent, global: &GlobalOpts) {
    let line = if structured(global.output) {
        serde_json::to_string(event).unwrap_or_default()
    } else {
        let at = event.received_at.with_timezone(&Local).format("%H:%M:%S");
        format!("{} {} {}", output::dim(&at.to_string()), output::kind_tag(event.kind), event.message)
    };
    output::print_output(&line, global.quiet);
}

fn print_progress(message: &str, global: &GlobalOpts) {
    let line = if structured(global.output) {
        json!({ "kind": "progress", "message": message }).to_string()
    } else {
        output::dim(&format!("  … {message}"))
    };
    output::print_output(&line, global.quiet);
}

pub async fn handle(
    controller: &Controller,
    args: NotificationsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let NotificationsCommand::Watch { count, no_progress } = args.command;
    let channel = controller.notifications();

    // Subscribe first so nothing sent right after the handshake is missed
    let mut toasts = channel.subscribe_toasts();
    let mut progress = channel.subscribe_progress();
    let mut state = channel.state_changes();

    channel.connect().await?;
    output::status(
        &format!("Listening on {} (Ctrl-C to stop)", channel.url()),
        global.quiet,
    );

    let mut seen = 0usize;
    loop {
        if count.is_some_and(|n| seen >= n) {
            break;
        }
        tokio::select! {
            toast = toasts.recv() => match toast {
                Ok(event) => {
                    print_toast(&event, global);
                    seen += 1;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification output fell behind"),
                Err(RecvError::Closed) => break,
            },
            line = progress.recv(), if !no_progress => match line {
                Ok(message) => {
                    print_progress(&message, global);
                    seen += 1;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "progress output fell behind"),
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ChannelState::Disconnected {
                    output::status("Notification channel closed by backend", global.quiet);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    channel.disconnect();
    Ok(())
}
