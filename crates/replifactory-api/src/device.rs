// Device endpoints
//
// Hardware subsystems are addressed by their family name (`valves`,
// `pumps`, `stirrers`, `ods`, `thermometers`, `leds`) as a path segment.

use serde_json::Value;
use tracing::debug;

use crate::client::GatewayClient;
use crate::error::Error;
use crate::models::{
    DeviceConfigsResponse, DeviceStatesResponse, LedColorRequest, LoadConfigRequest,
    OdCalibrationKeyRequest, OdCalibrationValueRequest, OdValueRequest, OdsTestResponse,
    PartIndexRequest, PumpCalibrationRequest, SetCalibrationRequest, SetCalibrationResponse,
    SetStateRequest, SetStateResponse, StirrerSpeedsResponse, StirrerTestResponse,
};

impl GatewayClient {
    /// Fetch the full device state tree.
    ///
    /// `GET /get-all-device-data`
    pub async fn get_device_data(&self) -> Result<Value, Error> {
        let resp: DeviceStatesResponse = self.get("get-all-device-data").await?;
        Ok(resp.device_states)
    }

    /// Establish the backend's hardware connection.
    ///
    /// `POST /connect-device`
    pub async fn connect_device(&self) -> Result<Value, Error> {
        debug!("connecting device");
        let resp: DeviceStatesResponse = self.post_empty("connect-device").await?;
        Ok(resp.device_states)
    }

    /// Set one part's state. `input` carries extra arguments such as a
    /// pump volume or rotation count.
    ///
    /// `POST /set-{part}-state`
    pub async fn set_part_state(
        &self,
        part: &str,
        index: u8,
        new_state: &Value,
        input: Option<&Value>,
    ) -> Result<Value, Error> {
        debug!(part, index, %new_state, "setting part state");
        let body = SetStateRequest {
            part_index: index,
            new_state,
            input,
        };
        let resp: SetStateResponse = self.post(&format!("set-{part}-state"), &body).await?;
        Ok(resp.new_state)
    }

    /// Replace one part's calibration map.
    ///
    /// `POST /set-{part}-calibration`
    pub async fn set_part_calibration(
        &self,
        part: &str,
        index: u8,
        new_calibration: &Value,
    ) -> Result<SetCalibrationResponse, Error> {
        debug!(part, index, "setting part calibration");
        let body = SetCalibrationRequest {
            part_index: index,
            new_calibration,
        };
        self.post(&format!("set-{part}-calibration"), &body).await
    }

    /// Save a valve calibration map.
    ///
    /// `POST /set-valve-calibration`
    pub async fn set_valve_calibration(&self, index: u8, new_calibration: &Value) -> Result<(), Error> {
        debug!(index, "setting valve calibration");
        let body = SetCalibrationRequest {
            part_index: index,
            new_calibration,
        };
        let _: Value = self.post("set-valve-calibration", &body).await?;
        Ok(())
    }

    /// Trigger a measurement on one part and return the updated tree.
    ///
    /// `POST /measure-{part}`
    pub async fn measure_part(&self, part: &str, index: u8) -> Result<Value, Error> {
        debug!(part, index, "measuring part");
        let resp: DeviceStatesResponse = self
            .post(
                &format!("measure-{part}"),
                &PartIndexRequest { part_index: index },
            )
            .await?;
        Ok(resp.device_states)
    }

    /// `POST /set-led-color`
    pub async fn set_led_color(&self, vial: u8, red: u8, green: u8, blue: u8) -> Result<(), Error> {
        debug!(vial, red, green, blue, "setting LED colour");
        let _: Value = self
            .post(
                "set-led-color",
                &LedColorRequest {
                    vial,
                    red,
                    green,
                    blue,
                },
            )
            .await?;
        Ok(())
    }

    // ── OD calibration rows ──────────────────────────────────────────

    /// Set (or with `None`, delete) one OD calibration cell.
    ///
    /// `POST /update-od-calibration-value`
    pub async fn update_od_calibration_value(
        &self,
        od: &Value,
        vial: u8,
        new_value: Option<f64>,
    ) -> Result<Value, Error> {
        let resp: DeviceStatesResponse = self
            .post(
                "update-od-calibration-value",
                &OdCalibrationValueRequest { od, vial, new_value },
            )
            .await?;
        Ok(resp.device_states)
    }

    /// Rename a calibration row on every OD sensor.
    ///
    /// `POST /update-od-calibration-key`
    pub async fn update_od_calibration_key(&self, old_od: &Value, new_od: &Value) -> Result<(), Error> {
        let _: Value = self
            .post(
                "update-od-calibration-key",
                &OdCalibrationKeyRequest { old_od, new_od },
            )
            .await?;
        Ok(())
    }

    /// Remove a calibration row from every OD sensor.
    ///
    /// `POST /remove-od-calibration-row`
    pub async fn remove_od_calibration_row(&self, od_value: &Value) -> Result<(), Error> {
        let _: Value = self
            .post("remove-od-calibration-row", &OdValueRequest { od_value })
            .await?;
        Ok(())
    }

    /// Measure every OD sensor against a reference standard.
    ///
    /// `POST /measure-od-calibration`
    pub async fn measure_od_calibration(&self, od_value: &Value) -> Result<(), Error> {
        let _: Value = self
            .post("measure-od-calibration", &OdValueRequest { od_value })
            .await?;
        Ok(())
    }

    // ── Calibration sequences and persistence ────────────────────────

    /// Run the pump calibration sequence. Blocks until the hardware
    /// sequence finishes, bounded by the long-running timeout.
    ///
    /// `POST /start-pump-calibration-sequence`
    pub async fn start_pump_calibration_sequence(
        &self,
        pump_id: u8,
        rotations: f64,
        iterations: u32,
    ) -> Result<(), Error> {
        debug!(pump_id, rotations, iterations, "starting pump calibration sequence");
        let _: Value = self
            .post_long(
                "start-pump-calibration-sequence",
                &PumpCalibrationRequest {
                    pump_id,
                    rotations,
                    iterations,
                },
            )
            .await?;
        Ok(())
    }

    /// Drive every OD sensor to its maximum signal. Returns the
    /// per-sensor maxima.
    ///
    /// `POST /run-ods-test`
    pub async fn run_ods_test(&self) -> Result<Value, Error> {
        debug!("running OD sensor test");
        let resp: OdsTestResponse = self.post_long_empty("run-ods-test").await?;
        Ok(resp.max_signals)
    }

    /// Sweep every stirrer and record its speed profile.
    ///
    /// `POST /run-stirrer-test`
    pub async fn run_stirrer_test(&self) -> Result<Value, Error> {
        debug!("running stirrer test");
        let resp: StirrerTestResponse = self.post_long_empty("run-stirrer-test").await?;
        Ok(resp.speed_profiles)
    }

    /// Persist the current calibration on the device.
    ///
    /// `POST /save-calibration`
    pub async fn save_calibration(&self) -> Result<(), Error> {
        let _: Value = self.post_empty("save-calibration").await?;
        Ok(())
    }

    /// `GET /list-device-configs`
    pub async fn list_device_configs(&self) -> Result<Vec<String>, Error> {
        let resp: DeviceConfigsResponse = self.get("list-device-configs").await?;
        Ok(resp.configs)
    }

    /// `POST /load-device-config`
    pub async fn load_device_config(&self, filename: &str) -> Result<(), Error> {
        debug!(filename, "loading device config");
        let _: Value = self
            .post("load-device-config", &LoadConfigRequest { filename })
            .await?;
        Ok(())
    }

    /// Measure all stirrer speeds (RPM keyed by vial).
    ///
    /// `PUT /measure-stirrer-speeds`
    pub async fn measure_stirrer_speeds(&self) -> Result<Value, Error> {
        let resp: StirrerSpeedsResponse = self
            .put("measure-stirrer-speeds", None::<&Value>)
            .await?;
        Ok(resp.speeds)
    }
}
