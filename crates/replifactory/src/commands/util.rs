//! Shared helpers for command handlers.

use std::path::Path;

use replifactory_core::{CalibrationKey, CalibrationMap, DevicePart, VIAL_COUNT};

use crate::cli::PartArg;
use crate::error::CliError;

pub fn device_part(arg: PartArg) -> DevicePart {
    match arg {
        PartArg::Valves => DevicePart::Valves,
        PartArg::Pumps => DevicePart::Pumps,
        PartArg::Stirrers => DevicePart::Stirrers,
        PartArg::Ods => DevicePart::Ods,
        PartArg::Thermometers => DevicePart::Thermometers,
        PartArg::Leds => DevicePart::Leds,
    }
}

/// Reject vial numbers outside 1..=7 before anything is sent.
pub fn check_vial(field: &str, vial: u8) -> Result<u8, CliError> {
    if (1..=VIAL_COUNT).contains(&vial) {
        Ok(vial)
    } else {
        Err(CliError::Validation {
            field: field.into(),
            reason: format!("must be between 1 and {VIAL_COUNT}, got {vial}"),
        })
    }
}

/// Parse a reference OD or other calibration input. Must be a finite number.
pub fn calibration_key(field: &str, raw: &str) -> Result<CalibrationKey, CliError> {
    let key = CalibrationKey::from(raw.trim());
    if key.value().is_some() {
        Ok(key)
    } else {
        Err(CliError::Validation {
            field: field.into(),
            reason: format!("expected a number, got '{raw}'"),
        })
    }
}

/// Build a calibration map from `INPUT=OUTPUT` pairs. An empty OUTPUT
/// keeps the row without a measurement.
pub fn parse_points(points: &[String]) -> Result<CalibrationMap, CliError> {
    points
        .iter()
        .map(|point| {
            let (input, output) = point.split_once('=').ok_or_else(|| CliError::Validation {
                field: "point".into(),
                reason: format!("expected INPUT=OUTPUT, got '{point}'"),
            })?;
            let key = calibration_key("point", input)?;
            let value = match output.trim() {
                "" => None,
                raw => Some(raw.parse::<f64>().map_err(|_| CliError::Validation {
                    field: "point".into(),
                    reason: format!("output '{raw}' is not a number"),
                })?),
            };
            Ok((key, value))
        })
        .collect()
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Steady-ticking spinner for long hardware calls; `None` when quiet.
pub fn spinner(message: &str, quiet: bool) -> Option<indicatif::ProgressBar> {
    (!quiet).then(|| {
        let bar = indicatif::ProgressBar::new_spinner();
        bar.set_message(message.to_owned());
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        bar
    })
}

pub fn finish_spinner(spinner: Option<&indicatif::ProgressBar>) {
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
}

/// Read and parse a JSON file for `--from-file` flags.
pub fn read_json_file(path: &Path) -> Result<serde_json::Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: "from-file".into(),
        reason: format!("invalid JSON in {}: {e}", path.display()),
    })
}
