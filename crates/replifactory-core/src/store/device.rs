// ── Device state store ──
//
// Mirrors the backend's hardware tree. Writes go out one request at a
// time and always finish with a full refetch, because a single actuator
// change can side-effect other parts (opening a valve stops a pump).

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use replifactory_api::GatewayClient;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::sequence::Projection;
use crate::convert;
use crate::error::CoreError;
use crate::model::{CalibrationKey, CalibrationMap, DevicePart, DeviceSnapshot, PartState, vials};
use crate::stream::StateStream;

/// Client-side projection of the device plus the actions that mutate it.
pub struct DeviceStore {
    api: GatewayClient,
    snapshot: Projection<Arc<DeviceSnapshot>>,
    error_message: watch::Sender<Option<String>>,
    calibration_mode: watch::Sender<bool>,
    fetching_calibration: watch::Sender<bool>,
}

/// Holds `fetching_calibration` high until dropped, so a failed or
/// cancelled test run still clears it.
struct FetchingCalibration<'a>(&'a watch::Sender<bool>);

impl<'a> FetchingCalibration<'a> {
    fn start(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for FetchingCalibration<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl DeviceStore {
    pub(crate) fn new(api: GatewayClient) -> Self {
        let (error_message, _) = watch::channel(None);
        let (calibration_mode, _) = watch::channel(false);
        let (fetching_calibration, _) = watch::channel(false);
        Self {
            api,
            snapshot: Projection::new("device", Arc::new(DeviceSnapshot::default())),
            error_message,
            calibration_mode,
            fetching_calibration,
        }
    }

    // ── Projection accessors ─────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.snapshot.get()
    }

    pub fn subscribe(&self) -> StateStream<Arc<DeviceSnapshot>> {
        StateStream::new(self.snapshot.subscribe())
    }

    /// Last failure recorded by any device action.
    pub fn error_message(&self) -> Option<String> {
        self.error_message.borrow().clone()
    }

    pub fn clear_error(&self) {
        self.error_message.send_replace(None);
    }

    fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "device action failed");
        self.error_message.send_replace(Some(message));
    }

    // ── Calibration mode (client only) ───────────────────────────────

    pub fn calibration_mode_enabled(&self) -> bool {
        *self.calibration_mode.borrow()
    }

    pub fn set_calibration_mode(&self, enabled: bool) {
        self.calibration_mode.send_replace(enabled);
    }

    /// Flip calibration mode and return the new value.
    pub fn toggle_calibration_mode(&self) -> bool {
        let mut now = false;
        self.calibration_mode.send_modify(|mode| {
            *mode = !*mode;
            now = *mode;
        });
        now
    }

    /// `true` while an OD or stirrer test run is in flight.
    pub fn is_fetching_calibration(&self) -> bool {
        *self.fetching_calibration.borrow()
    }

    pub fn subscribe_fetching_calibration(&self) -> watch::Receiver<bool> {
        self.fetching_calibration.subscribe()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Fetch the full device tree and replace the snapshot wholesale.
    ///
    /// On any failure both connection flags drop to `false`; the part
    /// data from the previous fetch is kept.
    pub async fn fetch_device_data(&self) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let ticket = self.snapshot.ticket();
        let result = match self.api.get_device_data().await {
            Ok(tree) => convert::device_snapshot(tree),
            Err(e) => Err(CoreError::from(e)),
        };

        match result {
            Ok(fresh) => {
                self.snapshot.apply(ticket, Arc::new(fresh));
                Ok(self.snapshot.get())
            }
            Err(err) => {
                self.snapshot
                    .apply_with(ticket, |snap| Arc::make_mut(snap).mark_disconnected());
                self.record_error(
                    err.server_message()
                        .map_or_else(|| "Failed to fetch device data.".to_owned(), str::to_owned),
                );
                Err(err)
            }
        }
    }

    /// Saved device configuration files on the backend.
    pub async fn list_device_configs(&self) -> Result<Vec<String>, CoreError> {
        self.api.list_device_configs().await.map_err(|e| {
            self.record_error("Failed to list device configs.");
            e.into()
        })
    }

    /// Measure every stirrer's speed. Keyed by vial.
    pub async fn measure_stirrer_speeds(&self) -> Result<BTreeMap<u8, f64>, CoreError> {
        match self.api.measure_stirrer_speeds().await {
            Ok(speeds) => Ok(convert::stirrer_speeds(&speeds)),
            Err(e) => {
                let err = CoreError::from(e);
                self.record_error(
                    err.server_message()
                        .unwrap_or("Failed to measure stirrer speeds")
                        .to_owned(),
                );
                Err(err)
            }
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Connect the backend to the hardware, then refetch.
    pub async fn connect_device(&self) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let ticket = self.snapshot.ticket();
        if let Err(e) = self.api.connect_device().await {
            self.snapshot
                .apply_with(ticket, |snap| Arc::make_mut(snap).mark_disconnected());
            self.record_error("Failed to connect device.");
            return Err(e.into());
        }
        info!("device connected");
        self.fetch_device_data().await
    }

    /// Set one part's state.
    ///
    /// The new state is shown immediately and replaced by the refetched
    /// tree once the backend confirms; a failure restores the last
    /// confirmed snapshot.
    pub async fn set_part_state(
        &self,
        part: DevicePart,
        index: u8,
        state: PartState,
        input: Option<&Value>,
    ) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let wire = state.to_json();
        self.snapshot
            .modify(|snap| Arc::make_mut(snap).set_state(part, index, state));

        if let Err(e) = self
            .api
            .set_part_state(part.as_str(), index, &wire, input)
            .await
        {
            let err = CoreError::from(e);
            self.snapshot.rollback();
            self.record_error(format!("Failed to set {part} state: {err}"));
            return Err(err);
        }
        self.fetch_device_data().await
    }

    /// Set every stirrer to `state`. All-or-nothing, one refetch.
    pub async fn set_all_stirrers_state(&self, state: &PartState) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let wire = state.to_json();
        let part = DevicePart::Stirrers.as_str();
        let requests = vials().map(|index| self.api.set_part_state(part, index, &wire, None));

        if let Err(e) = try_join_all(requests).await {
            let err = CoreError::from(e);
            self.record_error(format!("Failed to set stirrers state: {err}"));
            return Err(err);
        }
        self.fetch_device_data().await
    }

    /// Replace one part's calibration map. The backend's normalized map
    /// and fitted coefficients are adopted before the refetch.
    pub async fn set_part_calibration(
        &self,
        part: DevicePart,
        index: u8,
        calibration: &CalibrationMap,
    ) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let ticket = self.snapshot.ticket();
        let resp = match self
            .api
            .set_part_calibration(part.as_str(), index, &calibration.to_json())
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.record_error(format!("Failed to set {part} calibration."));
                return Err(e.into());
            }
        };

        let adopted = serde_json::from_value::<CalibrationMap>(resp.new_calibration).ok();
        self.snapshot.apply_with(ticket, |snap| {
            let snap = Arc::make_mut(snap);
            if let Some(map) = adopted {
                snap.set_calibration(part, index, map);
            }
            if let Some(coefs) = resp.coefs {
                snap.set_calibration_coefs(part, index, coefs);
            }
        });
        self.fetch_device_data().await
    }

    /// Trigger a measurement on one part. Errors propagate.
    pub async fn measure_device_part(&self, part: DevicePart, index: u8) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let ticket = self.snapshot.ticket();
        let tree = self.api.measure_part(part.as_str(), index).await.map_err(|e| {
            self.record_error(format!("Failed to measure {part}."));
            CoreError::from(e)
        })?;

        if let Ok(fresh) = convert::device_snapshot(tree) {
            self.snapshot.apply(ticket, Arc::new(fresh));
        }
        self.fetch_device_data().await
    }

    /// Measure several OD sensors concurrently.
    ///
    /// All-or-nothing: any failing sensor rejects the whole call and no
    /// intermediate response is merged, so `ods` stays as of the last
    /// full fetch.
    pub async fn measure_ods(&self, indices: &[u8]) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let part = DevicePart::Ods.as_str();
        let requests = indices.iter().map(|&index| self.api.measure_part(part, index));

        if let Err(e) = try_join_all(requests).await {
            self.record_error("Failed to measure one or more ODs.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }

    pub async fn set_led_color(&self, vial: u8, red: u8, green: u8, blue: u8) -> Result<Arc<DeviceSnapshot>, CoreError> {
        if let Err(e) = self.api.set_led_color(vial, red, green, blue).await {
            self.record_error("Failed to set LED color.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }

    // ── OD calibration rows ──────────────────────────────────────────
    //
    // Rows share one key space across all OD sensors. Concurrent edits
    // race and the newest-issued refetch wins; there is no edit lock.

    /// Add, update, or (with `None`) delete one OD calibration cell.
    pub async fn update_od_calibration_value(
        &self,
        od: &CalibrationKey,
        sensor: u8,
        value: Option<f64>,
    ) -> Result<Arc<DeviceSnapshot>, CoreError> {
        self.snapshot.modify(|snap| {
            Arc::make_mut(snap).set_od_calibration_value(od, sensor, value);
        });
        if let Err(e) = self
            .api
            .update_od_calibration_value(&od.to_json(), sensor, value)
            .await
        {
            self.snapshot.rollback();
            self.record_error("Failed to update OD calibration value.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }

    /// Rename a calibration row on every OD sensor.
    pub async fn rename_od_calibration_key(
        &self,
        old: &CalibrationKey,
        new: &CalibrationKey,
    ) -> Result<Arc<DeviceSnapshot>, CoreError> {
        self.snapshot.modify(|snap| {
            let touched = Arc::make_mut(snap).rename_od_calibration_key(old, new);
            debug!(%old, %new, touched, "renamed OD calibration row locally");
        });
        if let Err(e) = self
            .api
            .update_od_calibration_key(&old.to_json(), &new.to_json())
            .await
        {
            self.snapshot.rollback();
            self.record_error("Failed to update OD calibration key.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }

    /// Remove a calibration row from every OD sensor.
    pub async fn remove_od_calibration_key(&self, od: &CalibrationKey) -> Result<Arc<DeviceSnapshot>, CoreError> {
        self.snapshot.modify(|snap| {
            Arc::make_mut(snap).remove_od_calibration_key(od);
        });
        if let Err(e) = self.api.remove_od_calibration_row(&od.to_json()).await {
            self.snapshot.rollback();
            self.record_error("Failed to remove OD calibration row.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }

    /// Measure all sensors against a reference standard at `od`.
    pub async fn measure_od_calibration(&self, od: &CalibrationKey) -> Result<Arc<DeviceSnapshot>, CoreError> {
        if let Err(e) = self.api.measure_od_calibration(&od.to_json()).await {
            self.record_error("Failed to measure OD calibration.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }

    /// Save a valve calibration map, then refetch.
    pub async fn set_valve_calibration(
        &self,
        index: u8,
        calibration: &CalibrationMap,
    ) -> Result<Arc<DeviceSnapshot>, CoreError> {
        if let Err(e) = self
            .api
            .set_valve_calibration(index, &calibration.to_json())
            .await
        {
            self.record_error("Failed to save valve calibration.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }

    // ── Hardware test runs ───────────────────────────────────────────
    //
    // Results land in the family's backend fields. No refetch follows:
    // the run does not change states or calibration maps.

    /// Drive every OD sensor to its maximum signal and adopt the maxima
    /// as `ods.max_signal`.
    pub async fn fetch_od_calibration_data(&self) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let _busy = FetchingCalibration::start(&self.fetching_calibration);
        let ticket = self.snapshot.ticket();
        match self.api.run_ods_test().await {
            Ok(maxima) => {
                self.snapshot.apply_with(ticket, |snap| {
                    Arc::make_mut(snap).set_family_extra(DevicePart::Ods, "max_signal", maxima);
                });
                Ok(self.snapshot.get())
            }
            Err(e) => {
                self.record_error("Failed to fetch OD calibration data.");
                Err(e.into())
            }
        }
    }

    /// Sweep every stirrer and adopt the measured `speed_profiles`.
    pub async fn fetch_stirrer_calibration_data(&self) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let _busy = FetchingCalibration::start(&self.fetching_calibration);
        let ticket = self.snapshot.ticket();
        match self.api.run_stirrer_test().await {
            Ok(profiles) => {
                self.snapshot.apply_with(ticket, |snap| {
                    Arc::make_mut(snap).set_family_extra(
                        DevicePart::Stirrers,
                        "speed_profiles",
                        profiles,
                    );
                });
                Ok(self.snapshot.get())
            }
            Err(e) => {
                self.record_error("Failed to fetch stirrer calibration data.");
                Err(e.into())
            }
        }
    }

    // ── Calibration sequences and persistence ────────────────────────

    /// Run the pump calibration sequence, then force the pump to
    /// `stopped`. The backend's message (e.g. "All valves are closed")
    /// is surfaced verbatim.
    pub async fn start_pump_calibration_sequence(
        &self,
        pump: u8,
        rotations: f64,
        iterations: u32,
    ) -> Result<Arc<DeviceSnapshot>, CoreError> {
        info!(pump, rotations, iterations, "pump calibration sequence started");
        if let Err(e) = self
            .api
            .start_pump_calibration_sequence(pump, rotations, iterations)
            .await
        {
            let err = CoreError::from(e);
            self.record_error(format!("Error updating pumps calibration: {err}"));
            return Err(err);
        }
        self.set_part_state(DevicePart::Pumps, pump, PartState::label("stopped"), None)
            .await?;
        self.fetch_device_data().await
    }

    pub async fn save_calibration(&self) -> Result<Arc<DeviceSnapshot>, CoreError> {
        if let Err(e) = self.api.save_calibration().await {
            self.record_error("Failed to save calibration.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }

    pub async fn load_device_config(&self, filename: &str) -> Result<Arc<DeviceSnapshot>, CoreError> {
        if let Err(e) = self.api.load_device_config(filename).await {
            self.record_error("Failed to load device config.");
            return Err(e.into());
        }
        self.fetch_device_data().await
    }
}
