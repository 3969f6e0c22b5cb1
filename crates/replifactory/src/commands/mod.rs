//! Command dispatch: bridges CLI args -> store actions -> output formatting.

pub mod config_cmd;
pub mod device;
pub mod experiments;
pub mod host;
pub mod notifications;
pub mod plot;
pub mod tunnel;
pub mod util;

use replifactory_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Device(args) => device::handle(controller, args, global).await,
        Command::Experiments(args) => experiments::handle(controller, args, global).await,
        Command::Plot(args) => plot::handle(controller, args, global).await,
        Command::Notifications(args) => notifications::handle(controller, args, global).await,
        Command::Host => host::handle(controller, global).await,
        Command::Config(_) | Command::Completions(_) | Command::Tunnel(_) => Err(CliError::Internal(
            "command is handled before backend dispatch".into(),
        )),
    }
}
