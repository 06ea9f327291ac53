//! End-to-end scenarios for the diff engine: a fixture bootstrap is fed
//! decoded packets and the resulting graph, notifications, and echo
//! suppression are asserted.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};

use unifi_protect_data::bootstrap::Bootstrap;
use unifi_protect_data::engine::{EngineConfig, SyncEngine};
use unifi_protect_data::types::{ModelType, RecordingMode, VideoMode, WsAction};
use unifi_protect_data::websocket::{ActionFrame, WsPacket};

const CAMERA_ID: &str = "61ddb66b018e2703e7008c19";

fn fixture_bootstrap() -> Bootstrap {
    let raw = serde_json::to_vec(&json!({
        "authUserId": "u1",
        "accessKey": "ak",
        "lastUpdateId": "update-0",
        "nvr": { "id": "n1", "mac": "74acb9000000", "name": "UDM" },
        "cameras": [{
            "id": CAMERA_ID,
            "modelKey": "camera",
            "name": "Front Door",
            "mac": "aabbccddeeff",
            "state": "CONNECTED",
            "isConnected": true,
            "recordingSettings": { "mode": "never" },
            "videoMode": "default"
        }],
        "chimes": [{
            "id": "chime1",
            "modelKey": "chime",
            "mac": "aabbccddee22",
            "state": "CONNECTED",
            "cameraIds": [CAMERA_ID]
        }],
        "sensors": [],
        "lights": [],
        "viewers": [],
        "bridges": [],
        "doorlocks": [{
            "id": "lock1",
            "modelKey": "doorlock",
            "mac": "aabbccddee33",
            "state": "CONNECTED",
            "lockStatus": "CLOSED"
        }],
        "liveviews": []
    }))
    .unwrap();
    Bootstrap::from_json(&raw).unwrap()
}

fn packet(action: WsAction, model: ModelType, id: &str, update_id: &str, payload: Value) -> WsPacket {
    WsPacket {
        action: ActionFrame {
            action,
            new_update_id: Some(update_id.to_string()),
            model_key: model,
            id: id.to_string(),
            extras: HashMap::new(),
        },
        payload,
    }
}

fn engine() -> SyncEngine {
    SyncEngine::new(EngineConfig::default())
}

// ── Scenario: cold bootstrap, one motion event ───────────────────────

#[test]
fn motion_event_add_derives_camera_state() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Event,
            "event1",
            "update-1",
            json!({
                "id": "event1",
                "modelKey": "event",
                "type": "motion",
                "start": 1_700_000_000_000i64,
                "end": null,
                "camera": CAMERA_ID,
                "score": 50
            }),
        ),
    );

    // two notifications, in order: event add then camera update
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].action, WsAction::Add);
    assert_eq!(messages[0].model, ModelType::Event);
    assert_eq!(messages[1].action, WsAction::Update);
    assert_eq!(messages[1].model, ModelType::Camera);
    assert!(messages[1].changed_fields.contains("is_motion_detected"));
    assert!(messages[1].changed_fields.contains("last_motion"));

    assert!(bootstrap.events.contains_key("event1"));
    let camera = &bootstrap.cameras[CAMERA_ID];
    assert!(camera.is_motion_detected);
    assert_eq!(
        camera.last_motion.map(|t| t.timestamp_millis()),
        Some(1_700_000_000_000)
    );
    assert_eq!(bootstrap.last_update_id, "update-1");
}

// ── Scenario: motion end ─────────────────────────────────────────────

#[test]
fn motion_event_end_clears_camera_flag() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Event,
            "event1",
            "update-1",
            json!({
                "id": "event1",
                "type": "motion",
                "start": 1_700_000_000_000i64,
                "camera": CAMERA_ID
            }),
        ),
    );

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Event,
            "event1",
            "update-2",
            json!({ "end": 1_700_000_005_000i64 }),
        ),
    );

    // exactly one notification fires for the completion
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].model, ModelType::Event);
    assert!(messages[0].changed_fields.contains("end"));

    let camera = &bootstrap.cameras[CAMERA_ID];
    assert!(!camera.is_motion_detected);
    assert_eq!(
        camera.last_motion_end.map(|t| t.timestamp_millis()),
        Some(1_700_000_005_000)
    );
    let event = &bootstrap.events["event1"];
    assert_eq!(event.end.map(|t| t.timestamp_millis()), Some(1_700_000_005_000));
}

#[test]
fn completed_events_never_reopen() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Event,
            "event1",
            "update-1",
            json!({
                "id": "event1",
                "type": "motion",
                "start": 1_700_000_000_000i64,
                "end": 1_700_000_001_000i64,
                "camera": CAMERA_ID
            }),
        ),
    );

    engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Event,
            "event1",
            "update-2",
            json!({ "end": null }),
        ),
    );

    assert!(bootstrap.events["event1"].end.is_some());
}

// ── Scenario: self-echo suppression ──────────────────────────────────

#[test]
fn self_echo_is_suppressed_and_entry_consumed() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    // the write path registers the changed paths before PATCHing
    engine.ignore.register(CAMERA_ID, "recording_settings.mode");

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-1",
            json!({ "recordingSettings": { "mode": "always" } }),
        ),
    );

    // no notification for the echoed field, entry consumed
    assert!(messages.is_empty());
    assert!(engine.ignore.is_empty());

    // the echo still landed in the graph
    assert_eq!(
        bootstrap.cameras[CAMERA_ID].recording_settings.mode,
        RecordingMode::Always
    );

    // a second identical-looking change from the server is not suppressed
    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-2",
            json!({ "recordingSettings": { "mode": "never" } }),
        ),
    );
    assert_eq!(messages.len(), 1);
}

#[test]
fn server_derived_fields_are_never_suppressed() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    engine.ignore.register(CAMERA_ID, "last_seen");

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-1",
            json!({ "lastSeen": 1_700_000_000_000i64 }),
        ),
    );
    assert_eq!(messages.len(), 1);
    assert!(messages[0].changed_fields.contains("last_seen"));
}

// ── Scenario: reconnect replay ───────────────────────────────────────

#[test]
fn replayed_packets_are_dropped() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    let first = packet(
        WsAction::Update,
        ModelType::Camera,
        CAMERA_ID,
        "update-X",
        json!({ "micVolume": 25 }),
    );
    let applied = engine.apply(&mut bootstrap, &first);
    assert_eq!(applied.len(), 1);
    assert_eq!(bootstrap.last_update_id, "update-X");

    // the controller replays from the lastUpdateId checkpoint
    let replayed = engine.apply(&mut bootstrap, &first);
    assert!(replayed.is_empty());

    let next = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-X+1",
            json!({ "micVolume": 50 }),
        ),
    );
    assert_eq!(next.len(), 1);
    assert_eq!(bootstrap.cameras[CAMERA_ID].mic_volume, 50);
    assert_eq!(bootstrap.last_update_id, "update-X+1");
}

#[test]
fn last_update_id_is_monotonic_over_session() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    for i in 1..=5 {
        engine.apply(
            &mut bootstrap,
            &packet(
                WsAction::Update,
                ModelType::Camera,
                CAMERA_ID,
                &format!("update-{i}"),
                json!({ "micVolume": i }),
            ),
        );
        assert_eq!(bootstrap.last_update_id, format!("update-{i}"));
    }
}

// ── Scenario: unknown enum survives ──────────────────────────────────

#[test]
fn unknown_enum_value_round_trips() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-1",
            json!({ "videoMode": "future_mode_not_yet_known" }),
        ),
    );
    assert_eq!(messages.len(), 1);

    let camera = &bootstrap.cameras[CAMERA_ID];
    assert_eq!(
        camera.video_mode,
        VideoMode::Unknown("future_mode_not_yet_known".to_string())
    );

    let wire = serde_json::to_value(camera).unwrap();
    assert_eq!(wire["videoMode"], json!("future_mode_not_yet_known"));
}

// ── Scenario: chime paired-cameras hygiene ───────────────────────────

#[test]
fn unresolved_chime_camera_is_retained_and_repaired() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Chime,
            "chime1",
            "update-1",
            json!({ "cameraIds": [CAMERA_ID, "missing-cam"] }),
        ),
    );
    assert_eq!(messages.len(), 1);

    // the unresolved id is retained, not silently dropped
    assert!(bootstrap.chimes["chime1"]
        .camera_ids
        .contains(&"missing-cam".to_string()));

    // a subsequent camera add repairs the reference
    engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Camera,
            "missing-cam",
            "update-2",
            json!({
                "id": "missing-cam",
                "modelKey": "camera",
                "mac": "aabbccddee99",
                "state": "CONNECTED"
            }),
        ),
    );
    assert!(bootstrap.cameras.contains_key("missing-cam"));
}

// ── Boundary: clock skew clamp ───────────────────────────────────────

#[test]
fn end_before_start_is_clamped() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Event,
            "event1",
            "update-1",
            json!({
                "id": "event1",
                "type": "motion",
                "start": 1_700_000_010_000i64,
                "end": 1_700_000_005_000i64,
                "camera": CAMERA_ID
            }),
        ),
    );

    let event = &bootstrap.events["event1"];
    assert!(event.end.unwrap() >= event.start.unwrap());
}

// ── Removes, duplicates, divergence ──────────────────────────────────

#[test]
fn remove_deletes_device() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Remove,
            ModelType::Chime,
            "chime1",
            "update-1",
            Value::Null,
        ),
    );
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].action, WsAction::Remove);
    assert!(messages[0].old_object.is_some());
    assert!(bootstrap.chimes.is_empty());
}

#[test]
fn duplicate_add_overwrites() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Camera,
            CAMERA_ID,
            "update-1",
            json!({
                "id": CAMERA_ID,
                "modelKey": "camera",
                "name": "Replacement",
                "mac": "aabbccddeeff",
                "state": "CONNECTED"
            }),
        ),
    );

    assert_eq!(bootstrap.cameras.len(), 1);
    assert_eq!(
        bootstrap.cameras[CAMERA_ID].common.name.as_deref(),
        Some("Replacement")
    );
}

#[test]
fn repeated_unknown_removes_flag_refresh() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = SyncEngine::new(EngineConfig {
        divergence_threshold: 3,
        ..EngineConfig::default()
    });

    for i in 0..3 {
        engine.apply(
            &mut bootstrap,
            &packet(
                WsAction::Remove,
                ModelType::Camera,
                &format!("ghost-{i}"),
                &format!("update-{i}"),
                Value::Null,
            ),
        );
    }
    assert!(engine.take_needs_refresh());
    // flag clears on read
    assert!(!engine.take_needs_refresh());
}

#[test]
fn disconnect_clears_volatile_telemetry() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-1",
            json!({ "stats": { "rxBytes": 5, "txBytes": 6 }, "phyRate": 100.0 }),
        ),
    );
    assert!(bootstrap.cameras[CAMERA_ID].stats.is_some());

    engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-2",
            json!({ "state": "DISCONNECTED" }),
        ),
    );

    let camera = &bootstrap.cameras[CAMERA_ID];
    assert!(camera.stats.is_none());
    assert!(camera.phy_rate.is_none());
    // configuration survives the disconnect
    assert_eq!(camera.recording_settings.mode, RecordingMode::Never);
}

#[test]
fn ring_event_sets_flag_and_timer_expiry_clears_it() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Event,
            "ring1",
            "update-1",
            json!({
                "id": "ring1",
                "type": "ring",
                "start": 1_700_000_000_000i64,
                "camera": CAMERA_ID
            }),
        ),
    );
    assert_eq!(messages.len(), 2);
    assert!(bootstrap.cameras[CAMERA_ID].is_ringing);

    // the controller does not always send the end packet; the session
    // layer fires this after the configured reset interval
    let expiry = engine.expire_ring(&mut bootstrap, CAMERA_ID).unwrap();
    assert!(expiry.changed_fields.contains("is_ringing"));
    assert!(!bootstrap.cameras[CAMERA_ID].is_ringing);
    assert!(engine.expire_ring(&mut bootstrap, CAMERA_ID).is_none());
}

#[test]
fn nfc_and_fingerprint_events_mark_their_doorlock() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = engine();

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Event,
            "nfc1",
            "update-1",
            json!({
                "id": "nfc1",
                "type": "nfcCardScanned",
                "start": 1_700_000_000_000i64,
                "metadata": { "doorlockId": "lock1", "nfcId": "04AF12" }
            }),
        ),
    );

    // event add plus the derived doorlock update, in that order
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].model, ModelType::Event);
    assert_eq!(messages[1].model, ModelType::Doorlock);
    assert!(messages[1].changed_fields.contains("last_nfc_event_id"));
    assert!(messages[1].changed_fields.contains("last_access_at"));

    let doorlock = &bootstrap.doorlocks["lock1"];
    assert_eq!(doorlock.last_nfc_event_id.as_deref(), Some("nfc1"));
    assert_eq!(
        doorlock.last_access_at.map(|t| t.timestamp_millis()),
        Some(1_700_000_000_000)
    );
    assert!(doorlock.last_fingerprint_event_id.is_none());

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Add,
            ModelType::Event,
            "fp1",
            "update-2",
            json!({
                "id": "fp1",
                "type": "fingerprintIdentified",
                "start": 1_700_000_010_000i64,
                "metadata": { "doorlockId": "lock1", "fingerprintId": "fp-7" }
            }),
        ),
    );
    assert_eq!(messages.len(), 2);
    assert!(messages[1].changed_fields.contains("last_fingerprint_event_id"));

    let doorlock = &bootstrap.doorlocks["lock1"];
    assert_eq!(doorlock.last_fingerprint_event_id.as_deref(), Some("fp1"));
    assert_eq!(
        doorlock.last_access_at.map(|t| t.timestamp_millis()),
        Some(1_700_000_010_000)
    );
}

// ── Round-trip equivalence ───────────────────────────────────────────

#[test]
fn applied_stream_matches_directly_loaded_end_state() {
    let mut live = fixture_bootstrap();
    let mut engine = engine();

    engine.apply(
        &mut live,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-1",
            json!({ "name": "Porch", "micVolume": 10 }),
        ),
    );
    engine.apply(
        &mut live,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-2",
            json!({ "recordingSettings": { "mode": "always" } }),
        ),
    );

    // serialize the mutated graph and reload it directly
    let wire = live.to_json().unwrap();
    let reloaded = Bootstrap::from_json(&wire).unwrap();

    assert_eq!(reloaded.cameras[CAMERA_ID], live.cameras[CAMERA_ID]);
    assert_eq!(reloaded.last_update_id, "update-2");
}

#[test]
fn echo_ttl_expires() {
    let mut bootstrap = fixture_bootstrap();
    let mut engine = SyncEngine::new(EngineConfig {
        ignore_ttl: Duration::ZERO,
        ..EngineConfig::default()
    });

    engine.ignore.register(CAMERA_ID, "mic_volume");
    std::thread::sleep(Duration::from_millis(5));

    let messages = engine.apply(
        &mut bootstrap,
        &packet(
            WsAction::Update,
            ModelType::Camera,
            CAMERA_ID,
            "update-1",
            json!({ "micVolume": 1 }),
        ),
    );
    // entry expired, echo is treated as a legitimate remote change
    assert_eq!(messages.len(), 1);
}
