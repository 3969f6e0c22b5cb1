//! Plot command handler.

use serde::Serialize;
use tabled::Tabled;

use replifactory_core::{Controller, PlotKind, PlotReport, PlotSeries, vials};

use crate::cli::{GlobalOpts, PlotArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Clone, Tabled, Serialize)]
struct PlotRow {
    #[tabled(rename = "Vial")]
    vial: u8,
    #[tabled(rename = "Plot")]
    kind: String,
    #[tabled(rename = "Traces")]
    traces: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn series_detail(series: &PlotSeries) -> String {
    let title = series
        .layout
        .as_ref()
        .and_then(|l| l.get("title"))
        .map(|t| t.get("text").unwrap_or(t))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("-");
    [
        format!("Vial:    {}", series.vial),
        format!("Plot:    {}", series.kind),
        format!("Title:   {title}"),
        format!("Traces:  {}", series.trace_count()),
    ]
    .join("\n")
}

pub async fn handle(
    controller: &Controller,
    args: PlotArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let store = controller.experiments();
    let kind = if args.simulation {
        PlotKind::Simulation
    } else {
        PlotKind::Culture
    };

    if !args.target.eq_ignore_ascii_case("all") {
        let vial: u8 = args.target.parse().map_err(|_| CliError::Validation {
            field: "target".into(),
            reason: format!("expected a vial number or 'all', got '{}'", args.target),
        })?;
        let vial = util::check_vial("vial", vial)?;
        let series = match kind {
            PlotKind::Culture => store.fetch_culture_plot(vial).await?,
            PlotKind::Simulation => store.fetch_simulation_plot(vial).await?,
        };
        let out = output::render_single(global.output, series.as_ref(), series_detail, |s| {
            s.vial.to_string()
        })?;
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    let selected: Vec<u8> = if args.vials.is_empty() {
        vials().collect()
    } else {
        args.vials
            .iter()
            .map(|&v| util::check_vial("vials", v))
            .collect::<Result<_, _>>()?
    };
    store.set_selected_vials(selected.iter().map(|&v| (v, true)).collect());

    let report = match kind {
        PlotKind::Culture => {
            // Culture plots belong to the current experiment
            if store.fetch_current_experiment().await?.is_none() {
                output::status("No current experiment; nothing to plot", global.quiet);
                return Ok(());
            }
            store.plot_all_data().await
        }
        PlotKind::Simulation => {
            let mut report = PlotReport::default();
            for vial in store.filtered_vials() {
                match store.fetch_simulation_plot(vial).await {
                    Ok(_) => report.fetched.push(vial),
                    Err(_) => report.failed.push(vial),
                }
            }
            report
        }
    };

    let mut rows: Vec<PlotRow> = report
        .fetched
        .iter()
        .map(|&vial| PlotRow {
            vial,
            kind: kind.to_string(),
            traces: store
                .plot(kind, vial)
                .map_or_else(|| "-".into(), |s| s.trace_count().to_string()),
            result: "ok".into(),
        })
        .chain(report.failed.iter().map(|&vial| PlotRow {
            vial,
            kind: kind.to_string(),
            traces: "-".into(),
            result: "failed".into(),
        }))
        .collect();
    rows.sort_by_key(|r| r.vial);

    let out = output::render_list(
        global.output,
        &rows,
        PlotRow::clone,
        |r| r.vial.to_string(),
    )?;
    output::print_output(&out, global.quiet);

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::Rejected {
            message: store
                .error_message()
                .unwrap_or_else(|| format!("Failed to fetch {kind} plots.")),
        })
    }
}
