//! Client state layer between `replifactory-api` and front-ends.
//!
//! Every value held here is a projection of backend-owned truth:
//!
//! - **[`Controller`]**: facade that shares one gateway client among the
//!   stores and owns the cancellation root for background work.
//!
//! - **[`DeviceStore`]**: the hardware tree (valves, pumps, stirrers, OD
//!   sensors, thermometers, LEDs). Writes are followed by a full refetch;
//!   `set_part_state` and OD calibration edits are applied optimistically
//!   and rolled back on failure.
//!
//! - **[`ExperimentStore`]**: experiment list, current experiment, and
//!   lazily fetched per-vial plots.
//!
//! - **[`HostStore`]**: backend host name.
//!
//! - **[`NotificationChannel`]**: receive-only `/ws` push socket feeding
//!   bounded progress and notification logs.
//!
//! Concurrently issued actions on one projection resolve to the most
//! recently *issued* request; older responses that arrive late are dropped.

pub mod config;
pub mod controller;
mod convert;
pub mod error;
pub mod model;
pub mod notify;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_NOTIFICATION_CAPACITY, GatewayConfig};
pub use controller::Controller;
pub use error::CoreError;
pub use notify::{ChannelState, NotificationChannel, RingLog};
pub use store::{DeviceStore, ExperimentStore, HostStore, SIMULATION_HOURS};
pub use stream::StateStream;

pub use model::{
    CalibrationKey, CalibrationMap, DevicePart, DeviceSnapshot, Experiment, ExperimentStatus,
    NotificationEvent, NotificationKind, PartFamily, PartState, PlotKind, PlotReport, PlotSeries,
    SimulationRun, VIAL_COUNT, vials,
};
