// ── Wire-to-domain conversion ──
//
// The backend's device tree uses string part indices ("1".."7") and
// sometimes mixes non-numeric calibration payloads into the same slot.
// Conversion is tolerant: anything that does not fit the typed model is
// preserved in `PartFamily::extra` rather than failing the whole fetch.

use std::collections::BTreeMap;

use replifactory_api::models::ExperimentRecord;
use serde_json::{Map, Value};
use strum::IntoEnumIterator;

use crate::error::CoreError;
use crate::model::{
    CalibrationMap, DevicePart, DeviceSnapshot, Experiment, ExperimentStatus, PartFamily,
    PartState, PlotKind, PlotSeries,
};

/// Build a connected snapshot from the `device_states` tree.
pub(crate) fn device_snapshot(tree: Value) -> Result<DeviceSnapshot, CoreError> {
    let mut root = match tree {
        Value::Object(map) => map,
        other => {
            return Err(CoreError::Decode {
                message: format!("device_states is not an object: {other}"),
            });
        }
    };

    let mut families = BTreeMap::new();
    for part in DevicePart::iter() {
        let raw = part.wire_keys().iter().find_map(|key| root.remove(*key));
        if let Some(Value::Object(obj)) = raw {
            families.insert(part, part_family(part, obj));
        }
    }

    Ok(DeviceSnapshot {
        families,
        device_connected: true,
        device_control_enabled: true,
    })
}

fn part_family(part: DevicePart, mut obj: Map<String, Value>) -> PartFamily {
    let mut family = PartFamily::default();

    if let Some(states) = obj.remove("states") {
        match states {
            Value::Object(map) => {
                for (key, value) in map {
                    match key.parse::<u8>() {
                        Ok(index) => {
                            family.states.insert(index, PartState::from(value));
                        }
                        Err(_) => tracing::debug!(%part, key = %key, "skipping non-numeric state index"),
                    }
                }
            }
            other => {
                family.extra.insert("states".into(), other);
            }
        }
    }

    if let Some(calibration) = obj.remove("calibration") {
        match calibration_maps(&calibration) {
            Some(maps) => family.calibration = maps,
            None => {
                tracing::debug!(%part, "keeping untyped calibration payload");
                family.extra.insert("calibration".into(), calibration);
            }
        }
    }

    family.extra.extend(obj);
    family
}

fn calibration_maps(value: &Value) -> Option<BTreeMap<u8, CalibrationMap>> {
    let obj = value.as_object()?;
    obj.iter()
        .map(|(key, map)| {
            let index = key.parse::<u8>().ok()?;
            let map = serde_json::from_value::<CalibrationMap>(map.clone()).ok()?;
            Some((index, map))
        })
        .collect()
}

pub(crate) fn experiment(record: ExperimentRecord) -> Experiment {
    let status = record
        .status
        .parse::<ExperimentStatus>()
        .unwrap_or(ExperimentStatus::Unknown);
    Experiment {
        id: record.id,
        name: record.name,
        status,
        parameters: record.parameters,
    }
}

/// Plotly JSON `{data, layout}` into a [`PlotSeries`].
pub(crate) fn plot(vial: u8, kind: PlotKind, figure: Value) -> PlotSeries {
    match figure {
        Value::Object(mut obj) => PlotSeries {
            vial,
            kind,
            data: obj.remove("data").unwrap_or(Value::Null),
            layout: obj.remove("layout"),
        },
        other => PlotSeries {
            vial,
            kind,
            data: other,
            layout: None,
        },
    }
}

/// Stirrer speeds keyed by vial.
pub(crate) fn stirrer_speeds(value: &Value) -> BTreeMap<u8, f64> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| Some((k.parse::<u8>().ok()?, v.as_f64()?)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::model::CalibrationKey;

    #[test]
    fn device_tree_converts_with_extras() {
        let tree = json!({
            "valves": { "states": { "1": "open", "2": "closed" } },
            "ods": {
                "states": { "1": 0.42, "2": null },
                "calibration": { "1": { "0.1": 12.0, "0.5": null } },
                "odsignals": { "1": 1234 }
            },
            "temperatures": { "states": { "1": 37.1 } },
            "pumps": { "states": {}, "calibration": { "1": { "rotations": [1, 2] } } }
        });

        let snap = device_snapshot(tree).unwrap();
        assert!(snap.device_connected);
        assert_eq!(
            snap.state(DevicePart::Valves, 1),
            Some(&PartState::label("open"))
        );
        assert_eq!(snap.state(DevicePart::Ods, 1), Some(&PartState::Reading(0.42)));
        assert_eq!(snap.state(DevicePart::Ods, 2), Some(&PartState::Unknown));
        assert_eq!(
            snap.calibration(DevicePart::Ods, 1)
                .unwrap()
                .get(&CalibrationKey::from("0.5")),
            Some(None)
        );
        assert_eq!(
            snap.family(DevicePart::Ods).unwrap().extra["odsignals"]["1"],
            1234
        );
        assert_eq!(
            snap.state(DevicePart::Thermometers, 1),
            Some(&PartState::Reading(37.1))
        );
        // Untyped calibration stays available verbatim
        assert!(snap.family(DevicePart::Pumps).unwrap().extra.contains_key("calibration"));
    }

    #[test]
    fn non_object_tree_is_decode_error() {
        assert!(matches!(
            device_snapshot(json!([1, 2])),
            Err(CoreError::Decode { .. })
        ));
    }

    #[test]
    fn unknown_status_is_preserved_as_unknown() {
        let exp = experiment(ExperimentRecord {
            id: 3,
            name: "evolve".into(),
            status: "archived".into(),
            parameters: json!({}),
        });
        assert_eq!(exp.status, ExperimentStatus::Unknown);
    }

    #[test]
    fn plot_splits_figure() {
        let series = plot(
            2,
            PlotKind::Culture,
            json!({ "data": [{ "x": [0, 1] }], "layout": { "title": "Vial 2" } }),
        );
        assert_eq!(series.trace_count(), 1);
        assert_eq!(series.layout.unwrap()["title"], "Vial 2");
    }
}
