// ── Calibration maps ──
//
// A calibration map relates a physical input (reference OD, pump
// rotations, stirrer duty) to a measured output. Keys travel as JSON
// object keys, so they are strings on the wire, but their order is
// numeric: "0.05" < "0.5" < "2".

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A calibration row key.
///
/// Ordered by numeric value; keys that do not parse as numbers sort
/// after all numeric keys, lexically among themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationKey(String);

impl CalibrationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric interpretation of the key, if it has one.
    pub fn value(&self) -> Option<f64> {
        self.0.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Two keys name the same calibration point when they are equal
    /// numerically ("1" and "1.0") or textually.
    pub fn same_point(&self, other: &Self) -> bool {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => a.total_cmp(&b) == Ordering::Equal,
            _ => self.0 == other.0,
        }
    }

    /// JSON form used in request bodies: a number when numeric.
    pub fn to_json(&self) -> Value {
        self.value()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(self.0.clone()), Value::Number)
    }
}

impl From<f64> for CalibrationKey {
    fn from(v: f64) -> Self {
        Self(v.to_string())
    }
}

impl From<&str> for CalibrationKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for CalibrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for CalibrationKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => a.total_cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CalibrationKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered calibration map for one part instance. `None` values are
/// rows that exist but have not been measured yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CalibrationMap(BTreeMap<CalibrationKey, Option<f64>>);

// Rows are folded through `set` so "1" and "1.0" from the backend land
// on one point.
impl<'de> Deserialize<'de> for CalibrationMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = BTreeMap::<CalibrationKey, Option<f64>>::deserialize(deserializer)?;
        Ok(rows.into_iter().collect())
    }
}

impl CalibrationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CalibrationKey, Option<f64>)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &CalibrationKey> {
        self.0.keys()
    }

    /// The stored key naming the same point as `key`, if any.
    pub fn find(&self, key: &CalibrationKey) -> Option<&CalibrationKey> {
        self.0.keys().find(|k| k.same_point(key))
    }

    pub fn get(&self, key: &CalibrationKey) -> Option<Option<f64>> {
        self.find(key).and_then(|k| self.0.get(k).copied())
    }

    /// Insert or overwrite the row for `key`. An existing key naming the
    /// same point is replaced, so no point is ever stored twice.
    pub fn set(&mut self, key: CalibrationKey, value: Option<f64>) {
        if let Some(existing) = self.find(&key).cloned() {
            self.0.remove(&existing);
        }
        self.0.insert(key, value);
    }

    /// Remove the row for `key`. Returns the removed value.
    pub fn remove(&mut self, key: &CalibrationKey) -> Option<Option<f64>> {
        let existing = self.find(key).cloned()?;
        self.0.remove(&existing)
    }

    /// Move the value at `old` to `new`. Returns `false` when `old` is
    /// absent. A row already present at `new` is overwritten.
    pub fn rename(&mut self, old: &CalibrationKey, new: CalibrationKey) -> bool {
        match self.remove(old) {
            Some(value) => {
                self.set(new, value);
                true
            }
            None => false,
        }
    }

    /// Wire form: a JSON object keyed by the key strings.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl FromIterator<(CalibrationKey, Option<f64>)> for CalibrationMap {
    fn from_iter<I: IntoIterator<Item = (CalibrationKey, Option<f64>)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

// ── Tests ────────────────────────────────────────────────────────────
