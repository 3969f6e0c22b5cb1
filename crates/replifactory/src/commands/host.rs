//! Host command handler.

use serde_json::json;

use replifactory_core::Controller;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub async fn handle(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let hostname = controller.host().fetch_hostname().await?;
    let info = json!({
        "hostname": hostname,
        "gateway": controller.config().url.as_str(),
    });
    let out = output::render_single(
        global.output,
        &info,
        |_| format!("Hostname: {hostname}\nGateway:  {}", controller.config().url),
        |_| hostname.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
