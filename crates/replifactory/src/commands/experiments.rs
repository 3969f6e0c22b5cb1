//! Experiment command handlers.

use std::sync::Arc;

use serde_json::Value;
use tabled::Tabled;

use replifactory_core::{Controller, Experiment, ExperimentStatus, SimulationRun};

use crate::cli::{ExperimentsArgs, ExperimentsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ExperimentRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Current")]
    current: String,
}

fn detail(e: &Experiment) -> String {
    let mut lines = vec![
        format!("ID:      {}", e.id),
        format!("Name:    {}", e.name),
        format!("Status:  {}", e.status),
    ];
    if let Some(growth) = e.growth_parameters().and_then(Value::as_object) {
        lines.push(format!("Growth:  {} vial(s) configured", growth.len()));
    }
    lines.join("\n")
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn print_current(
    current: Option<&Arc<Experiment>>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match current {
        Some(exp) => {
            let out = output::render_single(global.output, exp.as_ref(), detail, |e| {
                e.id.to_string()
            })?;
            output::print_output(&out, global.quiet);
        }
        None => output::status("No current experiment", global.quiet),
    }
    Ok(())
}

fn print_value(value: &Value, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(global.output, value, pretty, Value::to_string)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: ExperimentsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let store = controller.experiments();

    match args.command {
        ExperimentsCommand::List => {
            let list = store.fetch_experiments().await?;
            let current_id = store
                .fetch_current_experiment()
                .await?
                .map(|e| e.id);
            let out = output::render_list(
                global.output,
                list.as_slice(),
                |e| ExperimentRow {
                    id: e.id,
                    name: e.name.clone(),
                    status: e.status.to_string(),
                    current: if Some(e.id) == current_id { "*".into() } else { String::new() },
                },
                |e| e.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ExperimentsCommand::Create { name } => {
            let current = store.create_experiment(&name).await?;
            print_current(current.as_ref(), global)
        }

        ExperimentsCommand::Select { id } => {
            let current = store.select_experiment(id).await?;
            print_current(current.as_ref(), global)
        }

        ExperimentsCommand::Current => {
            let current = store.fetch_current_experiment().await?;
            print_current(current.as_ref(), global)
        }

        ExperimentsCommand::Start => transition(controller, ExperimentStatus::Running, global).await,
        ExperimentsCommand::Stop => {
            if !util::confirm("Stop the current experiment?", global.yes)? {
                return Ok(());
            }
            transition(controller, ExperimentStatus::Stopped, global).await
        }
        ExperimentsCommand::Pause => transition(controller, ExperimentStatus::Paused, global).await,

        ExperimentsCommand::Params { id, from_file } => {
            if let Some(path) = from_file {
                let params = util::read_json_file(&path)?;
                let current = store.update_current_experiment_parameters(&params).await?;
                output::status("Parameters updated", global.quiet);
                let params = current.map_or(Value::Null, |e| e.parameters.clone());
                return print_value(&params, global);
            }
            let id = match id {
                Some(id) => id,
                None => current_id(controller).await?,
            };
            let params = store.fetch_experiment_parameters(id).await?;
            print_value(&params, global)
        }

        ExperimentsCommand::Growth { from_file } => {
            if let Some(path) = from_file {
                let growth = util::read_json_file(&path)?;
                store.update_current_growth_parameters(&growth).await?;
                output::status("Growth parameters updated", global.quiet);
            }
            let growth = store.fetch_current_growth_parameters().await?;
            print_value(&growth, global)
        }

        ExperimentsCommand::Simulate { vial, hours } => {
            let run = store.run_simulation(vial, hours).await?;
            let out = output::render_single(global.output, &run, simulation_detail, |r| {
                r.vial.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

async fn transition(
    controller: &Controller,
    status: ExperimentStatus,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let current = controller.experiments().update_experiment_status(status).await?;
    output::status(&format!("Experiment {status}"), global.quiet);
    print_current(current.as_ref(), global)
}

async fn current_id(controller: &Controller) -> Result<i64, CliError> {
    controller
        .experiments()
        .fetch_current_experiment()
        .await?
        .map(|e| e.id)
        .ok_or_else(|| CliError::Validation {
            field: "id".into(),
            reason: "no current experiment; pass --id".into(),
        })
}

fn simulation_detail(run: &SimulationRun) -> String {
    let mut out = format!("Vial {} simulated for {}h", run.vial, run.hours);
    if let Some(ref message) = run.message {
        out.push_str(&format!("\n{message}"));
    }
    if !run.summary.is_null() {
        out.push('\n');
        out.push_str(&pretty(&run.summary));
    }
    out
}
