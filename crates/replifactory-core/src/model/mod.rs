// ── Domain model ──
//
// Client-side projections of backend-owned state.

pub mod calibration;
pub mod device;
pub mod experiment;
pub mod notification;

pub use calibration::{CalibrationKey, CalibrationMap};
pub use device::{DevicePart, DeviceSnapshot, PartFamily, PartState, VIAL_COUNT, vials};
pub use experiment::{Experiment, ExperimentStatus, PlotKind, PlotReport, PlotSeries, SimulationRun};
pub use notification::{NotificationEvent, NotificationKind};
