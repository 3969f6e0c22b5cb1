//! Device command handlers.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;
use tabled::Tabled;

use replifactory_core::{
    CalibrationMap, Controller, DevicePart, DeviceSnapshot, PartState, vials,
};

use crate::cli::{DeviceArgs, DeviceCommand, GlobalOpts, OdCalCommand, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PartRow {
    #[tabled(rename = "Part")]
    part: String,
    #[tabled(rename = "#")]
    index: u8,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Calibration")]
    calibration: String,
}

#[derive(Tabled)]
struct CalibrationRow {
    #[tabled(rename = "Part")]
    part: String,
    #[tabled(rename = "#")]
    index: u8,
    #[tabled(rename = "Input")]
    input: String,
    #[tabled(rename = "Output")]
    output: String,
}

#[derive(Tabled)]
struct SpeedRow {
    #[tabled(rename = "Stirrer")]
    stirrer: u8,
    #[tabled(rename = "Speed")]
    speed: String,
}

fn part_rows(snap: &DeviceSnapshot, only: Option<DevicePart>) -> Vec<PartRow> {
    let mut rows = Vec::new();
    for (part, family) in &snap.families {
        if only.is_some_and(|p| p != *part) {
            continue;
        }
        let indices: std::collections::BTreeSet<u8> = family
            .states
            .keys()
            .chain(family.calibration.keys())
            .copied()
            .collect();
        for index in indices {
            rows.push(PartRow {
                part: part.to_string(),
                index,
                state: family
                    .state(index)
                    .map_or_else(|| "-".into(), PartState::to_string),
                calibration: family
                    .calibration(index)
                    .map_or_else(String::new, |c| format!("{} pts", c.len())),
            });
        }
    }
    rows
}

fn calibration_rows(snap: &DeviceSnapshot, only: Option<DevicePart>) -> Vec<CalibrationRow> {
    let mut rows = Vec::new();
    for (part, family) in &snap.families {
        if only.is_some_and(|p| p != *part) {
            continue;
        }
        for (index, map) in &family.calibration {
            for (key, value) in map.iter() {
                rows.push(CalibrationRow {
                    part: part.to_string(),
                    index: *index,
                    input: key.to_string(),
                    output: value.map_or_else(|| "-".into(), |v| format!("{v:.4}")),
                });
            }
        }
    }
    rows
}

fn snapshot_detail(snap: &DeviceSnapshot, only: Option<DevicePart>, calibration: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Connected: {}   Control: {}",
        yes_no(snap.device_connected),
        yes_no(snap.device_control_enabled)
    );
    let rows = part_rows(snap, only);
    if rows.is_empty() {
        let _ = write!(out, "{}", output::dim("(no part data)"));
    } else {
        out.push_str(&output::render_table(&rows));
    }
    if calibration {
        let rows = calibration_rows(snap, only);
        if !rows.is_empty() {
            out.push('\n');
            out.push_str(&output::render_table(&rows));
        }
    }
    out
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// Print the snapshot left behind by a write, unless quiet.
fn show(
    snap: &Arc<DeviceSnapshot>,
    only: Option<DevicePart>,
    calibration: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let out = match only {
        Some(part) if !matches!(global.output, OutputFormat::Table) => {
            let family = snap.family(part).cloned().unwrap_or_default();
            output::render_single(global.output, &family, |_| String::new(), |_| part.to_string())?
        }
        _ => output::render_single(
            global.output,
            snap.as_ref(),
            |s| snapshot_detail(s, only, calibration),
            |s| yes_no(s.device_connected).to_owned(),
        )?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn parse_input(raw: Option<&str>) -> Result<Option<Value>, CliError> {
    raw.map(|s| serde_json::from_str(s).map_err(CliError::from))
        .transpose()
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub async fn handle(
    controller: &Controller,
    args: DeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let devices = controller.devices();

    match args.command {
        DeviceCommand::Show { part, calibration } => {
            let snap = devices.fetch_device_data().await?;
            show(&snap, part.map(util::device_part), calibration, global)
        }

        DeviceCommand::Connect => {
            let snap = devices.connect_device().await?;
            output::status("Device connected", global.quiet);
            show(&snap, None, false, global)
        }

        DeviceCommand::SetState {
            part,
            index,
            state,
            input,
        } => {
            let part = util::device_part(part);
            let input = parse_input(input.as_deref())?;
            let snap = devices
                .set_part_state(part, index, PartState::parse(&state), input.as_ref())
                .await?;
            let now = snap
                .state(part, index)
                .map_or_else(|| "-".into(), PartState::to_string);
            output::status(&format!("{} {index}: {now}", part.label()), global.quiet);
            Ok(())
        }

        DeviceCommand::Calibrate {
            part,
            index,
            points,
            from_file,
        } => {
            let part = util::device_part(part);
            if !part.is_calibratable() {
                return Err(CliError::Validation {
                    field: "part".into(),
                    reason: format!("{part} has no calibration"),
                });
            }
            let map: CalibrationMap = match from_file {
                Some(path) => serde_json::from_value(util::read_json_file(&path)?)?,
                None => util::parse_points(&points)?,
            };
            let snap = devices.set_part_calibration(part, index, &map).await?;
            show(&snap, Some(part), true, global)
        }

        DeviceCommand::ValveCalibrate {
            index,
            points,
            from_file,
        } => {
            let map: CalibrationMap = match from_file {
                Some(path) => serde_json::from_value(util::read_json_file(&path)?)?,
                None => util::parse_points(&points)?,
            };
            let snap = devices.set_valve_calibration(index, &map).await?;
            output::status(&format!("Valve {index} calibration saved"), global.quiet);
            show(&snap, Some(DevicePart::Valves), true, global)
        }

        DeviceCommand::Measure { part, index } => {
            let part = util::device_part(part);
            let snap = devices.measure_device_part(part, index).await?;
            show(&snap, Some(part), false, global)
        }

        DeviceCommand::MeasureOds { vials: selected } => {
            let selected: Vec<u8> = if selected.is_empty() {
                vials().collect()
            } else {
                selected
                    .into_iter()
                    .map(|v| util::check_vial("vial", v))
                    .collect::<Result<_, _>>()?
            };
            let snap = devices.measure_ods(&selected).await?;
            show(&snap, Some(DevicePart::Ods), false, global)
        }

        DeviceCommand::Stirrers { state } => {
            let snap = devices
                .set_all_stirrers_state(&PartState::parse(&state))
                .await?;
            show(&snap, Some(DevicePart::Stirrers), false, global)
        }

        DeviceCommand::Led {
            vial,
            red,
            green,
            blue,
        } => {
            let vial = util::check_vial("vial", vial)?;
            let snap = devices.set_led_color(vial, red, green, blue).await?;
            show(&snap, Some(DevicePart::Leds), false, global)
        }

        DeviceCommand::OdCal(args) => od_calibration(controller, args.command, global).await,

        DeviceCommand::PumpCalibrate {
            pump,
            rotations,
            iterations,
        } => {
            if !util::confirm(
                &format!("Run {iterations} x {rotations} rotations on pump {pump}?"),
                global.yes,
            )? {
                return Ok(());
            }
            let spinner = util::spinner(&format!("Calibrating pump {pump}"), global.quiet);
            let result = devices
                .start_pump_calibration_sequence(pump, rotations, iterations)
                .await;
            util::finish_spinner(spinner.as_ref());
            let snap = result?;
            output::status(&format!("Pump {pump} calibration sequence finished"), global.quiet);
            show(&snap, Some(DevicePart::Pumps), true, global)
        }

        DeviceCommand::SaveCalibration => {
            devices.save_calibration().await?;
            output::status("Calibration saved", global.quiet);
            Ok(())
        }

        DeviceCommand::Configs => {
            let configs = devices.list_device_configs().await?;
            let out = output::render_list(
                global.output,
                &configs,
                |name| ConfigRow { name: name.clone() },
                Clone::clone,
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DeviceCommand::LoadConfig { filename } => {
            let snap = devices.load_device_config(&filename).await?;
            output::status(&format!("Loaded {filename}"), global.quiet);
            show(&snap, None, false, global)
        }

        DeviceCommand::StirrerSpeeds => {
            let speeds = devices.measure_stirrer_speeds().await?;
            render_speeds(&speeds, global)
        }

        DeviceCommand::OdTest => {
            let spinner = util::spinner("Running OD sensor test", global.quiet);
            let result = devices.fetch_od_calibration_data().await;
            util::finish_spinner(spinner.as_ref());
            let snap = result?;
            render_test_result(&snap, DevicePart::Ods, "max_signal", global)
        }

        DeviceCommand::StirrerTest => {
            let spinner = util::spinner("Running stirrer test", global.quiet);
            let result = devices.fetch_stirrer_calibration_data().await;
            util::finish_spinner(spinner.as_ref());
            let snap = result?;
            render_test_result(&snap, DevicePart::Stirrers, "speed_profiles", global)
        }
    }
}

#[derive(Tabled)]
struct TestRow {
    #[tabled(rename = "#")]
    index: String,
    #[tabled(rename = "Result")]
    result: String,
}

/// Show the per-part entries a hardware test left under `key`.
fn render_test_result(
    snap: &DeviceSnapshot,
    part: DevicePart,
    key: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let entries: Vec<(String, Value)> = match snap.family(part).and_then(|f| f.extra.get(key)) {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(other) => vec![(String::new(), other.clone())],
        None => Vec::new(),
    };
    let out = output::render_list(
        global.output,
        &entries,
        |(index, result)| TestRow {
            index: index.clone(),
            result: result.to_string(),
        },
        |(index, result)| format!("{index}\t{result}"),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "Config")]
    name: String,
}

fn render_speeds(speeds: &BTreeMap<u8, f64>, global: &GlobalOpts) -> Result<(), CliError> {
    let entries: Vec<(u8, f64)> = speeds.iter().map(|(k, v)| (*k, *v)).collect();
    let out = output::render_list(
        global.output,
        &entries,
        |(stirrer, speed)| SpeedRow {
            stirrer: *stirrer,
            speed: format!("{speed:.2}"),
        },
        |(stirrer, speed)| format!("{stirrer}\t{speed}"),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── OD calibration table ────────────────────────────────────────────

async fn od_calibration(
    controller: &Controller,
    command: OdCalCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let devices = controller.devices();
    // Row edits are made against the current table
    devices.fetch_device_data().await?;

    let snap = match command {
        OdCalCommand::Set { od, sensor, value } => {
            let od = util::calibration_key("od", &od)?;
            let sensor = util::check_vial("sensor", sensor)?;
            devices.update_od_calibration_value(&od, sensor, value).await?
        }
        OdCalCommand::Rename { old, new } => {
            let old = util::calibration_key("old", &old)?;
            let new = util::calibration_key("new", &new)?;
            devices.rename_od_calibration_key(&old, &new).await?
        }
        OdCalCommand::Remove { od } => {
            let od = util::calibration_key("od", &od)?;
            if !util::confirm(&format!("Remove OD {od} from every sensor?"), global.yes)? {
                return Ok(());
            }
            devices.remove_od_calibration_key(&od).await?
        }
        OdCalCommand::Measure { od } => {
            let od = util::calibration_key("od", &od)?;
            devices.measure_od_calibration(&od).await?
        }
    };
    show(&snap, Some(DevicePart::Ods), true, global)
}
