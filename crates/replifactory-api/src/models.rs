// Wire types for the backend API
//
// Request bodies use the backend's camelCase keys. Backend-owned payloads
// that the client never interprets (device state trees, experiment
// parameters, plotly figures) are kept as `serde_json::Value` here and
// converted into domain types by `replifactory-core`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Device requests ─────────────────────────────────────────────────

/// Body of `POST /set-{part}-state`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStateRequest<'a> {
    pub part_index: u8,
    pub new_state: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<&'a Value>,
}

/// Body of `POST /set-{part}-calibration`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCalibrationRequest<'a> {
    pub part_index: u8,
    pub new_calibration: &'a Value,
}

/// Body of `POST /measure-{part}`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartIndexRequest {
    pub part_index: u8,
}

/// Body of `POST /set-led-color`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LedColorRequest {
    pub vial: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Body of `POST /update-od-calibration-value`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OdCalibrationValueRequest<'a> {
    pub od: &'a Value,
    pub vial: u8,
    pub new_value: Option<f64>,
}

/// Body of `POST /update-od-calibration-key`.
#[derive(Debug, Clone, Serialize)]
pub struct OdCalibrationKeyRequest<'a> {
    #[serde(rename = "oldOD")]
    pub old_od: &'a Value,
    #[serde(rename = "newOD")]
    pub new_od: &'a Value,
}

/// Body of `POST /remove-od-calibration-row` and `/measure-od-calibration`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OdValueRequest<'a> {
    pub od_value: &'a Value,
}

/// Body of `POST /start-pump-calibration-sequence`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpCalibrationRequest {
    pub pump_id: u8,
    pub rotations: f64,
    pub iterations: u32,
}

/// Body of `POST /load-device-config`.
#[derive(Debug, Clone, Serialize)]
pub struct LoadConfigRequest<'a> {
    pub filename: &'a str,
}

// ── Device responses ────────────────────────────────────────────────

/// `{success, device_states}` returned by fetch, connect and measure calls.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatesResponse {
    #[serde(default)]
    pub device_states: Value,
}

/// `{success, newState}` returned by `/set-{part}-state`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStateResponse {
    #[serde(default)]
    pub new_state: Value,
}

/// `{success, newCalibration, coefs?}` returned by `/set-{part}-calibration`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCalibrationResponse {
    #[serde(default)]
    pub new_calibration: Value,
    #[serde(default)]
    pub coefs: Option<Value>,
}

/// `{success, max_signals}` returned by `/run-ods-test`.
#[derive(Debug, Clone, Deserialize)]
pub struct OdsTestResponse {
    #[serde(default)]
    pub max_signals: Value,
}

/// `{success, speed_profiles}` returned by `/run-stirrer-test`.
#[derive(Debug, Clone, Deserialize)]
pub struct StirrerTestResponse {
    #[serde(default)]
    pub speed_profiles: Value,
}

/// `{configs}` returned by `/list-device-configs`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfigsResponse {
    #[serde(default)]
    pub configs: Vec<String>,
}

/// `{success, speeds}` returned by `/measure-stirrer-speeds`.
#[derive(Debug, Clone, Deserialize)]
pub struct StirrerSpeedsResponse {
    #[serde(default)]
    pub speeds: Value,
}

// ── Experiment wire types ───────────────────────────────────────────

/// One experiment as serialized by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: i64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateExperimentRequest<'a> {
    pub name: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SelectExperimentRequest {
    pub experiment_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRequest<'a> {
    pub status: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParametersRequest<'a> {
    pub parameters: &'a Value,
}

/// `{message, parameters}` returned by `PUT /experiments/current/parameters`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParametersResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

/// `{message, growth_parameters}` from the growth-parameter endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct GrowthParametersResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub growth_parameters: Value,
}

/// `{message, summary_data}` returned by `/cultures/{vial}/run-simulation`.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub summary_data: Value,
}

// ── System ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct HostnameResponse {
    pub hostname: String,
}

// ── Tunnel operator endpoints (served by the proxy) ─────────────────

/// Tunnel state reported by the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelStatus {
    pub running: bool,
    #[serde(default)]
    pub tunnel_url: Option<String>,
}

/// `{tunnelUrl}` returned by `GET /tunnels/get-url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelUrlResponse {
    #[serde(default)]
    pub tunnel_url: Option<String>,
}

/// Body of `POST /tunnels/set-authtoken`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokenRequest {
    pub authtoken: String,
}

/// `{message, tunnelUrl}` returned after storing a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenResponse {
    pub message: String,
    #[serde(default)]
    pub tunnel_url: Option<String>,
}
