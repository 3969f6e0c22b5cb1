// ── Device domain types ──
//
// The backend reports every hardware family as `{states, calibration,
// ...extras}` keyed by part index. The client mirrors that tree and
// never interprets the extras (OD signals, fitted coefficients).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use super::calibration::{CalibrationKey, CalibrationMap};

/// Vials (and per-vial parts) are numbered 1 through 7.
pub const VIAL_COUNT: u8 = 7;

/// Iterator over all vial indices.
pub fn vials() -> impl Iterator<Item = u8> {
    1..=VIAL_COUNT
}

// ── DevicePart ───────────────────────────────────────────────────────

/// A hardware subsystem family. The string form is the path segment the
/// backend expects in `/set-{part}-state`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DevicePart {
    Valves,
    Pumps,
    Stirrers,
    Ods,
    #[serde(alias = "temperatures")]
    #[strum(to_string = "thermometers", serialize = "temperatures")]
    Thermometers,
    Leds,
}

impl DevicePart {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Backend key spellings for this family, preferred first.
    pub(crate) fn wire_keys(self) -> &'static [&'static str] {
        match self {
            Self::Valves => &["valves"],
            Self::Pumps => &["pumps"],
            Self::Stirrers => &["stirrers"],
            Self::Ods => &["ods"],
            Self::Thermometers => &["thermometers", "temperatures"],
            Self::Leds => &["leds"],
        }
    }

    /// Families whose instances carry a calibration map.
    pub fn is_calibratable(self) -> bool {
        matches!(self, Self::Valves | Self::Pumps | Self::Stirrers | Self::Ods)
    }

    /// Human label for messages ("OD sensor", "pump").
    pub fn label(self) -> &'static str {
        match self {
            Self::Valves => "valve",
            Self::Pumps => "pump",
            Self::Stirrers => "stirrer",
            Self::Ods => "OD sensor",
            Self::Thermometers => "thermometer",
            Self::Leds => "LED",
        }
    }
}

// ── PartState ────────────────────────────────────────────────────────

/// State of one part instance: a discrete label for actuators
/// (`open`, `stopped`, `high`), a reading for sensors, or nothing yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum PartState {
    #[default]
    Unknown,
    Label(String),
    Reading(f64),
    Other(Value),
}

impl PartState {
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }

    /// Parse user input: a number becomes a reading, anything else a label.
    pub fn parse(input: &str) -> Self {
        input
            .trim()
            .parse::<f64>()
            .map_or_else(|_| Self::Label(input.trim().to_owned()), Self::Reading)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Value> for PartState {
    fn from(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for PartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("-"),
            Self::Label(s) => f.write_str(s),
            Self::Reading(v) => write!(f, "{v:.3}"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

// ── PartFamily ───────────────────────────────────────────────────────

/// All instances of one hardware family.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartFamily {
    pub states: BTreeMap<u8, PartState>,
    pub calibration: BTreeMap<u8, CalibrationMap>,
    /// Backend fields the client carries but does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PartFamily {
    pub fn state(&self, index: u8) -> Option<&PartState> {
        self.states.get(&index)
    }

    pub fn calibration(&self, index: u8) -> Option<&CalibrationMap> {
        self.calibration.get(&index)
    }
}

// ── DeviceSnapshot ───────────────────────────────────────────────────

/// Client-side projection of the whole device.
///
/// Replaced wholesale on each successful fetch. The only in-place edits
/// are optimistic ones made while a write is in flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub families: BTreeMap<DevicePart, PartFamily>,
    pub device_connected: bool,
    pub device_control_enabled: bool,
}

impl DeviceSnapshot {
    pub fn family(&self, part: DevicePart) -> Option<&PartFamily> {
        self.families.get(&part)
    }

    pub fn state(&self, part: DevicePart, index: u8) -> Option<&PartState> {
        self.family(part).and_then(|f| f.state(index))
    }

    pub fn calibration(&self, part: DevicePart, index: u8) -> Option<&CalibrationMap> {
        self.family(part).and_then(|f| f.calibration(index))
    }

    pub fn set_state(&mut self, part: DevicePart, index: u8, state: PartState) {
        self.families
            .entry(part)
            .or_default()
            .states
            .insert(index, state);
    }

    pub fn set_calibration(&mut self, part: DevicePart, index: u8, calibration: CalibrationMap) {
        self.families
            .entry(part)
            .or_default()
            .calibration
            .insert(index, calibration);
    }

    /// Record fitted coefficients under the family's `calibration_coefs`.
    pub fn set_calibration_coefs(&mut self, part: DevicePart, index: u8, coefs: Value) {
        let family = self.families.entry(part).or_default();
        let slot = family
            .extra
            .entry("calibration_coefs")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = slot {
            map.insert(index.to_string(), coefs);
        }
    }

    /// Store an uninterpreted backend field on a family (`max_signal`,
    /// `speed_profiles`).
    pub fn set_family_extra(&mut self, part: DevicePart, key: &str, value: Value) {
        self.families
            .entry(part)
            .or_default()
            .extra
            .insert(key.to_owned(), value);
    }

    /// Both connection flags false; part data kept for display.
    pub fn mark_disconnected(&mut self) {
        self.device_connected = false;
        self.device_control_enabled = false;
    }

    // ── OD calibration rows (shared key space) ───────────────────────

    /// Set or clear one OD calibration cell.
    pub fn set_od_calibration_value(&mut self, key: &CalibrationKey, sensor: u8, value: Option<f64>) {
        let family = self.families.entry(DevicePart::Ods).or_default();
        let map = family.calibration.entry(sensor).or_default();
        match value {
            Some(v) => map.set(key.clone(), Some(v)),
            None => {
                map.remove(key);
            }
        }
    }

    /// Rename a row on every OD sensor that has it. Returns how many
    /// sensors were touched.
    pub fn rename_od_calibration_key(&mut self, old: &CalibrationKey, new: &CalibrationKey) -> usize {
        self.families
            .get_mut(&DevicePart::Ods)
            .map_or(0, |family| {
                family
                    .calibration
                    .values_mut()
                    .map(|map| map.rename(old, new.clone()))
                    .filter(|renamed| *renamed)
                    .count()
            })
    }

    /// Remove a row from every OD sensor. Returns how many sensors had it.
    pub fn remove_od_calibration_key(&mut self, key: &CalibrationKey) -> usize {
        self.families
            .get_mut(&DevicePart::Ods)
            .map_or(0, |family| {
                family
                    .calibration
                    .values_mut()
                    .filter_map(|map| map.remove(key))
                    .count()
            })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn od_snapshot() -> DeviceSnapshot {
        let mut snap = DeviceSnapshot::default();
        for sensor in vials() {
            let map: CalibrationMap = [
                (CalibrationKey::from("0.1"), Some(f64::from(sensor))),
                (CalibrationKey::from("0.5"), Some(f64::from(sensor) * 10.0)),
            ]
            .into_iter()
            .collect();
            snap.set_calibration(DevicePart::Ods, sensor, map);
        }
        snap
    }

    #[test]
    fn part_names_match_backend_paths() {
        assert_eq!(DevicePart::Ods.to_string(), "ods");
        assert_eq!(DevicePart::Thermometers.as_str(), "thermometers");
        assert_eq!("temperatures".parse::<DevicePart>().unwrap(), DevicePart::Thermometers);
        assert_eq!("stirrers".parse::<DevicePart>().unwrap(), DevicePart::Stirrers);
    }

    #[test]
    fn part_state_parsing() {
        assert_eq!(PartState::parse("open"), PartState::label("open"));
        assert_eq!(PartState::parse("0.42"), PartState::Reading(0.42));
        let from_null: PartState = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(from_null, PartState::Unknown);
        let nested: PartState = serde_json::from_value(serde_json::json!([21.5, 22.0])).unwrap();
        assert!(matches!(nested, PartState::Other(_)));
    }

    #[test]
    fn rename_applies_to_every_sensor_with_the_key() {
        let mut snap = od_snapshot();
        let before = snap.clone();
        let old = CalibrationKey::from("0.5");
        let new = CalibrationKey::from("0.55");

        let touched = snap.rename_od_calibration_key(&old, &new);
        assert_eq!(touched, usize::from(VIAL_COUNT));

        for sensor in vials() {
            let map = snap.calibration(DevicePart::Ods, sensor).unwrap();
            let original = before
                .calibration(DevicePart::Ods, sensor)
                .unwrap()
                .get(&old)
                .unwrap();
            assert_eq!(map.get(&new), Some(original));
            assert!(map.get(&old).is_none());
        }
    }

    #[test]
    fn remove_clears_row_everywhere() {
        let mut snap = od_snapshot();
        let key = CalibrationKey::from("0.1");
        assert_eq!(snap.remove_od_calibration_key(&key), usize::from(VIAL_COUNT));
        for sensor in vials() {
            let map = snap.calibration(DevicePart::Ods, sensor).unwrap();
            assert!(map.get(&key).is_none());
            assert_eq!(map.len(), 1);
        }
    }

    #[test]
    fn clearing_a_cell_removes_only_that_sensor() {
        let mut snap = od_snapshot();
        let key = CalibrationKey::from("0.1");
        snap.set_od_calibration_value(&key, 3, None);
        assert!(snap.calibration(DevicePart::Ods, 3).unwrap().get(&key).is_none());
        assert!(snap.calibration(DevicePart::Ods, 4).unwrap().get(&key).is_some());
    }
}
