// ── Experiment domain types ──

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

/// Lifecycle status of an experiment, as reported by the backend.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExperimentStatus {
    Stopped,
    Paused,
    Running,
    /// A status string this client does not know.
    #[serde(other)]
    Unknown,
}

impl ExperimentStatus {
    /// Literal sent to `/experiments/current/status`.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// An experiment and its opaque control parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub name: String,
    pub status: ExperimentStatus,
    /// Backend-owned parameter tree, including `growth_parameters`.
    pub parameters: Value,
}

impl Experiment {
    pub fn growth_parameters(&self) -> Option<&Value> {
        self.parameters.get("growth_parameters")
    }
}

// ── Plots ────────────────────────────────────────────────────────────

/// Which per-vial plot a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotKind {
    Culture,
    Simulation,
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Culture => f.write_str("culture"),
            Self::Simulation => f.write_str("simulation"),
        }
    }
}

/// A fetched plot payload (plotly figure JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSeries {
    pub vial: u8,
    pub kind: PlotKind,
    pub data: Value,
    #[serde(default)]
    pub layout: Option<Value>,
}

impl PlotSeries {
    /// Number of traces in the figure.
    pub fn trace_count(&self) -> usize {
        self.data.as_array().map_or(0, Vec::len)
    }
}

/// Result of a growth simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRun {
    pub vial: u8,
    pub hours: u32,
    pub message: Option<String>,
    /// Backend summary statistics, passed through untouched.
    pub summary: Value,
}

/// Outcome of a sequential multi-vial plot fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlotReport {
    pub fetched: Vec<u8>,
    pub failed: Vec<u8>,
}
