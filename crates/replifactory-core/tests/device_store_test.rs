#![allow(clippy::unwrap_used)]
// DeviceStore behaviour against a wiremock backend.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use replifactory_core::{
    CalibrationKey, CalibrationMap, Controller, CoreError, DevicePart, GatewayConfig, PartState,
    VIAL_COUNT, vials,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Controller) {
    let server = MockServer::start().await;
    let url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let controller = Controller::new(GatewayConfig::new(url)).unwrap();
    (server, controller)
}

fn device_tree(valve_1: &str, od_reading: f64) -> Value {
    let od_cal: serde_json::Map<String, Value> = vials()
        .map(|v| {
            (
                v.to_string(),
                json!({ "0.1": f64::from(v), "0.5": f64::from(v) * 10.0 }),
            )
        })
        .collect();
    json!({
        "success": true,
        "device_states": {
            "valves": { "states": { "1": valve_1, "2": "closed" } },
            "pumps": { "states": { "1": "stopped" } },
            "stirrers": { "states": { "1": "low" } },
            "ods": { "states": { "1": od_reading, "2": od_reading }, "calibration": od_cal },
            "temperatures": { "states": { "1": 37.0 } },
            "leds": { "states": {} }
        }
    })
}

fn renamed_tree() -> Value {
    let od_cal: serde_json::Map<String, Value> = vials()
        .map(|v| {
            (
                v.to_string(),
                json!({ "0.1": f64::from(v), "0.55": f64::from(v) * 10.0 }),
            )
        })
        .collect();
    json!({
        "success": true,
        "device_states": { "ods": { "states": {}, "calibration": od_cal } }
    })
}

async fn mount_fetch(server: &MockServer, body: Value, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path("/api/get-all-device-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body));
    match times {
        Some(n) => mock.up_to_n_times(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

// ── Fetch ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_replaces_snapshot_and_sets_flags() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), None).await;

    let snap = controller.devices().fetch_device_data().await.unwrap();
    assert!(snap.device_connected);
    assert!(snap.device_control_enabled);
    assert_eq!(
        snap.state(DevicePart::Valves, 1),
        Some(&PartState::label("open"))
    );
    assert_eq!(
        snap.state(DevicePart::Thermometers, 1),
        Some(&PartState::Reading(37.0))
    );
}

#[tokio::test]
async fn test_failed_fetch_keeps_data_but_clears_flags() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), Some(1)).await;
    Mock::given(method("GET"))
        .and(path("/api/get-all-device-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    devices.fetch_device_data().await.unwrap();
    assert!(devices.fetch_device_data().await.is_err());

    let snap = devices.snapshot();
    assert!(!snap.device_connected);
    assert!(!snap.device_control_enabled);
    assert_eq!(
        snap.state(DevicePart::Valves, 1),
        Some(&PartState::label("open"))
    );
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Failed to fetch device data.")
    );
}

#[tokio::test]
async fn test_late_response_to_earlier_fetch_is_discarded() {
    let (server, controller) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/get-all-device-data"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(device_tree("open", 0.4))
                .set_delay(Duration::from_millis(400)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_fetch(&server, device_tree("closed", 0.4), None).await;

    let devices = controller.devices();
    let (first, second) = tokio::join!(devices.fetch_device_data(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        devices.fetch_device_data().await
    });

    assert_eq!(
        second.unwrap().state(DevicePart::Valves, 1),
        Some(&PartState::label("closed"))
    );
    // The earlier-issued fetch answered last and was dropped
    assert_eq!(
        first.unwrap().state(DevicePart::Valves, 1),
        Some(&PartState::label("closed"))
    );
    assert_eq!(
        devices.snapshot().state(DevicePart::Valves, 1),
        Some(&PartState::label("closed"))
    );
}

// ── Connect ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_declared_failure_clears_flags() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/connect-device"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    let err = devices.connect_device().await.unwrap_err();
    assert!(matches!(err, CoreError::Rejected { .. }));

    let snap = devices.snapshot();
    assert!(!snap.device_connected);
    assert!(!snap.device_control_enabled);
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Failed to connect device.")
    );
}

// ── Part state ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_part_state_ends_on_refetched_value() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/set-valves-state"))
        .and(body_json(json!({ "partIndex": 1, "newState": "open" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "newState": "open" })),
        )
        .mount(&server)
        .await;
    // The backend refused to open valve 1 (e.g. interlock) and reports closed
    mount_fetch(&server, device_tree("closed", 0.4), None).await;

    let snap = controller
        .devices()
        .set_part_state(DevicePart::Valves, 1, PartState::label("open"), None)
        .await
        .unwrap();
    assert_eq!(
        snap.state(DevicePart::Valves, 1),
        Some(&PartState::label("closed"))
    );
}

#[tokio::test]
async fn test_set_part_state_failure_rolls_back() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("closed", 0.4), None).await;
    Mock::given(method("POST"))
        .and(path("/api/set-valves-state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Valve 1 is locked"
        })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    devices.fetch_device_data().await.unwrap();
    let err = devices
        .set_part_state(DevicePart::Valves, 1, PartState::label("open"), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Valve 1 is locked");

    assert_eq!(
        devices.snapshot().state(DevicePart::Valves, 1),
        Some(&PartState::label("closed"))
    );
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Failed to set valves state: Valve 1 is locked")
    );
}

#[tokio::test]
async fn test_set_all_stirrers_fails_whole_batch() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), None).await;
    Mock::given(method("POST"))
        .and(path("/api/set-stirrers-state"))
        .and(body_json(json!({ "partIndex": 4, "newState": "high" })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "stirrer 4 stalled" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/set-stirrers-state"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "newState": "high" })),
        )
        .mount(&server)
        .await;

    let devices = controller.devices();
    let before = devices.fetch_device_data().await.unwrap();
    let err = devices
        .set_all_stirrers_state(&PartState::label("high"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("stirrer 4 stalled"), "{err}");

    assert_eq!(devices.snapshot(), before);
    let fetches = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/get-all-device-data")
        .count();
    assert_eq!(fetches, 1);
    assert!(
        devices
            .error_message()
            .unwrap()
            .starts_with("Failed to set stirrers state: ")
    );
}

// ── Calibration maps ────────────────────────────────────────────────

#[tokio::test]
async fn test_set_part_calibration_adopts_response_then_refetches() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/set-ods-calibration"))
        .and(body_json(json!({ "partIndex": 2, "newCalibration": { "0.1": 1.5 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "newCalibration": { "0.1": 1.5, "1.0": 9.0 },
            "coefs": [1.0, 0.2]
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Refetch fails, so what remains is exactly what was adopted
    Mock::given(method("GET"))
        .and(path("/api/get-all-device-data"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let devices = controller.devices();
    let sent: CalibrationMap = [(CalibrationKey::from("0.1"), Some(1.5))]
        .into_iter()
        .collect();
    assert!(
        devices
            .set_part_calibration(DevicePart::Ods, 2, &sent)
            .await
            .is_err()
    );

    let snap = devices.snapshot();
    let adopted = snap.calibration(DevicePart::Ods, 2).unwrap();
    assert_eq!(adopted.len(), 2);
    assert_eq!(adopted.get(&CalibrationKey::from("1.0")), Some(Some(9.0)));
    assert_eq!(
        snap.family(DevicePart::Ods).unwrap().extra["calibration_coefs"]["2"],
        json!([1.0, 0.2])
    );
}

#[tokio::test]
async fn test_set_part_calibration_ends_on_refetched_tree() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/set-ods-calibration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "newCalibration": { "0.1": 1.5 }
        })))
        .mount(&server)
        .await;
    mount_fetch(&server, device_tree("open", 0.4), None).await;

    let sent: CalibrationMap = [(CalibrationKey::from("0.1"), Some(1.5))]
        .into_iter()
        .collect();
    let snap = controller
        .devices()
        .set_part_calibration(DevicePart::Ods, 2, &sent)
        .await
        .unwrap();
    assert_eq!(
        snap.calibration(DevicePart::Ods, 2)
            .unwrap()
            .get(&CalibrationKey::from("0.5")),
        Some(Some(20.0))
    );
}

#[tokio::test]
async fn test_valve_calibration_saves_then_refetches() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/set-valve-calibration"))
        .and(body_json(json!({ "partIndex": 1, "newCalibration": { "0.5": 1.2 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    mount_fetch(&server, device_tree("closed", 0.4), None).await;

    let map: CalibrationMap = [(CalibrationKey::from("0.5"), Some(1.2))]
        .into_iter()
        .collect();
    let snap = controller
        .devices()
        .set_valve_calibration(1, &map)
        .await
        .unwrap();
    assert!(snap.device_connected);
}

#[tokio::test]
async fn test_valve_calibration_failure_is_recorded() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/set-valve-calibration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    let result = devices.set_valve_calibration(1, &CalibrationMap::new()).await;
    assert!(matches!(result, Err(CoreError::Rejected { .. })));
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Failed to save valve calibration.")
    );
}

// ── OD sensors ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_measure_device_part_failure_propagates() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/measure-ods"))
        .and(body_json(json!({ "partIndex": 2 })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "sensor busy" })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    let err = devices
        .measure_device_part(DevicePart::Ods, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Api { status: 500, .. }), "{err:?}");
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Failed to measure ods.")
    );
}

#[tokio::test]
async fn test_measure_ods_all_or_nothing() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), None).await;
    Mock::given(method("POST"))
        .and(path("/api/measure-ods"))
        .and(body_json(json!({ "partIndex": 3 })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "sensor 3 offline" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/measure-ods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "device_states": { "ods": { "states": { "1": 9.9, "2": 9.9 } } }
        })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    let before = devices.fetch_device_data().await.unwrap();

    assert!(devices.measure_ods(&[1, 2, 3]).await.is_err());

    let after = devices.snapshot();
    assert_eq!(after.family(DevicePart::Ods), before.family(DevicePart::Ods));
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Failed to measure one or more ODs.")
    );
}

#[tokio::test]
async fn test_rename_od_key_applies_to_every_sensor() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), Some(1)).await;
    Mock::given(method("POST"))
        .and(path("/api/update-od-calibration-key"))
        .and(body_json(json!({ "oldOD": 0.5, "newOD": 0.55 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    mount_fetch(&server, renamed_tree(), None).await;

    let devices = controller.devices();
    let before = devices.fetch_device_data().await.unwrap();
    let old = CalibrationKey::from("0.5");
    let new = CalibrationKey::from("0.55");

    let after = devices.rename_od_calibration_key(&old, &new).await.unwrap();

    let mut checked = 0;
    for sensor in vials() {
        let was = before
            .calibration(DevicePart::Ods, sensor)
            .unwrap()
            .get(&old)
            .unwrap();
        let map = after.calibration(DevicePart::Ods, sensor).unwrap();
        assert_eq!(map.get(&new), Some(was));
        assert!(map.get(&old).is_none());
        checked += 1;
    }
    assert_eq!(checked, usize::from(VIAL_COUNT));
}

#[tokio::test]
async fn test_rename_od_key_failure_restores_rows() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), None).await;
    Mock::given(method("POST"))
        .and(path("/api/update-od-calibration-key"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let devices = controller.devices();
    let before = devices.fetch_device_data().await.unwrap();
    let result = devices
        .rename_od_calibration_key(&CalibrationKey::from("0.5"), &CalibrationKey::from("0.55"))
        .await;

    assert!(result.is_err());
    assert_eq!(devices.snapshot(), before);
}

#[tokio::test]
async fn test_remove_od_key_drops_row_from_every_sensor() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), Some(1)).await;
    Mock::given(method("POST"))
        .and(path("/api/remove-od-calibration-row"))
        .and(body_json(json!({ "odValue": 0.5 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    mount_fetch(&server, renamed_tree(), None).await;

    let devices = controller.devices();
    devices.fetch_device_data().await.unwrap();
    let gone = CalibrationKey::from("0.5");
    let after = devices.remove_od_calibration_key(&gone).await.unwrap();

    for sensor in vials() {
        let map = after.calibration(DevicePart::Ods, sensor).unwrap();
        assert!(map.get(&gone).is_none());
        assert_eq!(
            map.get(&CalibrationKey::from("0.1")),
            Some(Some(f64::from(sensor)))
        );
    }
}

#[tokio::test]
async fn test_remove_od_key_failure_restores_rows() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), None).await;
    Mock::given(method("POST"))
        .and(path("/api/remove-od-calibration-row"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let devices = controller.devices();
    let before = devices.fetch_device_data().await.unwrap();
    assert!(
        devices
            .remove_od_calibration_key(&CalibrationKey::from("0.5"))
            .await
            .is_err()
    );
    assert_eq!(devices.snapshot(), before);
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Failed to remove OD calibration row.")
    );
}

#[tokio::test]
async fn test_clearing_od_value_deletes_only_that_cell() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), None).await;
    Mock::given(method("POST"))
        .and(path("/api/update-od-calibration-value"))
        .and(body_json(json!({ "od": 0.5, "vial": 3, "newValue": null })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let devices = controller.devices();
    devices.fetch_device_data().await.unwrap();
    let key = CalibrationKey::from("0.5");

    // Inspect the optimistic edit while the request is in flight
    let (result, during) = tokio::join!(
        devices.update_od_calibration_value(&key, 3, None),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            devices.snapshot()
        }
    );
    result.unwrap();

    let sensor_3 = during.calibration(DevicePart::Ods, 3).unwrap();
    assert!(sensor_3.get(&key).is_none());
    assert_eq!(sensor_3.get(&CalibrationKey::from("0.1")), Some(Some(3.0)));
    for sensor in vials().filter(|v| *v != 3) {
        assert_eq!(
            during.calibration(DevicePart::Ods, sensor).unwrap().get(&key),
            Some(Some(f64::from(sensor) * 10.0))
        );
    }
}

// ── Hardware test runs ──────────────────────────────────────────────

#[tokio::test]
async fn test_od_test_adopts_max_signals_and_clears_flag() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/run-ods-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "max_signals": { "1": 0.91, "2": 0.88 } }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let devices = controller.devices();
    assert!(!devices.is_fetching_calibration());
    let (result, busy) = tokio::join!(devices.fetch_od_calibration_data(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        devices.is_fetching_calibration()
    });

    assert!(busy);
    assert!(!devices.is_fetching_calibration());
    let snap = result.unwrap();
    assert_eq!(
        snap.family(DevicePart::Ods).unwrap().extra["max_signal"],
        json!({ "1": 0.91, "2": 0.88 })
    );
}

#[tokio::test]
async fn test_stirrer_test_adopts_speed_profiles() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/run-stirrer-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "speed_profiles": { "1": [[0.2, 410.0], [0.8, 1620.0]] }
        })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    let snap = devices.fetch_stirrer_calibration_data().await.unwrap();
    assert_eq!(
        snap.family(DevicePart::Stirrers).unwrap().extra["speed_profiles"]["1"][0],
        json!([0.2, 410.0])
    );
    assert!(!devices.is_fetching_calibration());
}

#[tokio::test]
async fn test_failed_test_run_records_error_and_clears_flag() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/run-stirrer-test"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "no stirrers" })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    assert!(devices.fetch_stirrer_calibration_data().await.is_err());
    assert!(!devices.is_fetching_calibration());
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Failed to fetch stirrer calibration data.")
    );
}

// ── Pump calibration ────────────────────────────────────────────────

#[tokio::test]
async fn test_pump_calibration_surfaces_backend_message() {
    let (server, controller) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/start-pump-calibration-sequence"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "All valves are closed"
        })))
        .mount(&server)
        .await;

    let devices = controller.devices();
    let err = devices
        .start_pump_calibration_sequence(1, 10.0, 3)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "All valves are closed");
    assert_eq!(
        devices.error_message().as_deref(),
        Some("Error updating pumps calibration: All valves are closed")
    );
}

#[tokio::test]
async fn test_pump_calibration_stops_pump_afterwards() {
    let (server, controller) = setup().await;
    mount_fetch(&server, device_tree("open", 0.4), None).await;
    Mock::given(method("POST"))
        .and(path("/api/start-pump-calibration-sequence"))
        .and(body_json(json!({ "pumpId": 2, "rotations": 5.0, "iterations": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/set-pumps-state"))
        .and(body_json(json!({ "partIndex": 2, "newState": "stopped" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    controller
        .devices()
        .start_pump_calibration_sequence(2, 5.0, 1)
        .await
        .unwrap();
}

// ── Client-only flags ───────────────────────────────────────────────

#[tokio::test]
async fn test_calibration_mode_is_local() {
    let (server, controller) = setup().await;
    let devices = controller.devices();

    assert!(!devices.calibration_mode_enabled());
    assert!(devices.toggle_calibration_mode());
    devices.set_calibration_mode(false);
    assert!(!devices.calibration_mode_enabled());
    assert!(server.received_requests().await.unwrap().is_empty());
}
