// ── Client state stores ──
//
// One owned struct per backend concern. Each exposes a narrow set of
// async actions and watch-backed projections; nothing outside a store
// writes its state.

pub mod device;
pub mod experiment;
pub mod host;
mod sequence;

pub use device::DeviceStore;
pub use experiment::{ExperimentStore, SIMULATION_HOURS};
pub use host::HostStore;
