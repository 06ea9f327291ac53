//! Typed device records for every adoptable Protect device kind.
//!
//! Every record is the camelCase wire object viewed through snake_case
//! fields, with unknown keys preserved in an `extras` map so firmware
//! additions round-trip untouched. Fields the diff engine derives locally
//! (motion flags, last-event ids) live alongside the wire fields; the
//! controller ignores them on PATCH.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::serde::ts_milliseconds_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::convert::de_mac;
use crate::types::{
    LockStatusType, ModelType, MountType, RecordingMode, SmartDetectAudioType, SmartDetectType,
    StateType, VideoMode,
};

/// Header shared by every adoptable device and the NVR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceCommon {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "modelKey")]
    pub model: Option<ModelType>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    #[serde(deserialize_with = "de_mac")]
    pub mac: String,
    pub state: StateType,
    pub host: Option<IpAddr>,
    pub connection_host: Option<IpAddr>,
    pub firmware_version: Option<String>,
    pub hardware_revision: Option<String>,
    #[serde(with = "ts_milliseconds_option")]
    pub up_since: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub connected_since: Option<DateTime<Utc>>,
    /// Uptime in milliseconds.
    pub uptime: Option<i64>,
    pub is_connected: bool,
    pub is_adopted: bool,
    pub is_updating: bool,
    pub permissions: u64,
}

/// Access to the shared header and per-kind volatile telemetry.
pub trait ProtectDevice {
    const MODEL: ModelType;

    fn common(&self) -> &DeviceCommon;
    fn common_mut(&mut self) -> &mut DeviceCommon;

    /// Drops per-kind volatile telemetry, returning whether anything was
    /// cleared. Called on a transition to `DISCONNECTED`; configuration is
    /// retained.
    fn clear_volatile(&mut self) -> bool {
        false
    }

    fn id(&self) -> &str {
        &self.common().id
    }

    fn mac(&self) -> &str {
        &self.common().mac
    }

    fn state(&self) -> &StateType {
        &self.common().state
    }
}

// ── Camera sub-records ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraChannel {
    pub id: i64,
    pub video_id: Option<String>,
    pub name: Option<String>,
    pub enabled: bool,
    pub is_rtsp_enabled: bool,
    pub rtsp_alias: Option<String>,
    pub width: i64,
    pub height: i64,
    pub fps: i64,
    pub bitrate: i64,
    pub min_bitrate: i64,
    pub max_bitrate: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct IspSettings {
    pub brightness: i64,
    pub contrast: i64,
    pub hue: i64,
    pub saturation: i64,
    pub sharpness: i64,
    pub denoise: i64,
    pub is_auto_rotate_enabled: bool,
    pub is_flipped_vertical: bool,
    pub is_flipped_horizontal: bool,
    pub zoom_position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingSettings {
    /// Pre/post-roll padding in milliseconds.
    pub pre_padding: i64,
    pub post_padding: i64,
    pub min_motion_event_trigger: i64,
    pub end_motion_event_delay: i64,
    pub suppress_illumination_surge: bool,
    pub mode: RecordingMode,
    pub enable_motion_detection: Option<bool>,
    pub use_new_motion_algorithm: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SmartDetectSettings {
    pub object_types: Vec<SmartDetectType>,
    pub audio_types: Option<Vec<SmartDetectAudioType>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TalkbackSettings {
    pub type_fmt: Option<String>,
    pub type_in: Option<String>,
    pub bind_addr: Option<IpAddr>,
    pub bind_port: u16,
    pub filter_addr: Option<String>,
    pub filter_port: Option<u16>,
    pub channels: i64,
    pub sampling_rate: i64,
    pub bits_per_sample: i64,
    pub quality: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LcdMessage {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    #[serde(with = "ts_milliseconds_option")]
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LedSettings {
    pub is_enabled: bool,
    /// Milliseconds between blinks, zero for solid.
    pub blink_rate: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OsdSettings {
    pub is_name_enabled: bool,
    pub is_date_enabled: bool,
    pub is_logo_enabled: bool,
    pub is_debug_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeakerSettings {
    pub is_enabled: bool,
    pub are_system_sounds_enabled: bool,
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WifiStats {
    pub channel: Option<i64>,
    pub frequency: Option<i64>,
    pub signal_quality: Option<i64>,
    pub signal_strength: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoStats {
    #[serde(with = "ts_milliseconds_option")]
    pub recording_start: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub recording_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageStats {
    pub used: Option<i64>,
    /// Bytes per millisecond.
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraStats {
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub wifi: Option<WifiStats>,
    pub video: Option<VideoStats>,
    pub storage: Option<StorageStats>,
}

// ── Camera ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Camera {
    #[serde(flatten)]
    pub common: DeviceCommon,
    pub mic_volume: i64,
    pub is_mic_enabled: bool,
    pub is_recording: bool,
    pub is_motion_detected: bool,
    pub is_smart_detected: bool,
    pub phy_rate: Option<f64>,
    pub video_mode: VideoMode,
    pub chime_duration: i64,
    #[serde(with = "ts_milliseconds_option")]
    pub last_motion: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub last_ring: Option<DateTime<Utc>>,
    pub channels: Vec<CameraChannel>,
    pub isp_settings: IspSettings,
    pub recording_settings: RecordingSettings,
    pub smart_detect_settings: SmartDetectSettings,
    pub talkback_settings: Option<TalkbackSettings>,
    pub osd_settings: Option<OsdSettings>,
    pub led_settings: Option<LedSettings>,
    pub speaker_settings: Option<SpeakerSettings>,
    pub lcd_message: Option<LcdMessage>,
    pub stats: Option<CameraStats>,
    /// Currently attached bridge, if any.
    #[serde(rename = "bridge")]
    pub bridge_id: Option<String>,

    // Derived by the diff engine, never part of a PATCH body.
    pub is_ringing: bool,
    #[serde(with = "ts_milliseconds_option")]
    pub last_motion_end: Option<DateTime<Utc>>,
    pub last_motion_event_id: Option<String>,
    pub last_ring_event_id: Option<String>,
    #[serde(with = "ts_milliseconds_option")]
    pub last_smart_detect: Option<DateTime<Utc>>,
    pub last_smart_detect_event_id: Option<String>,
    #[serde(with = "ts_milliseconds_option")]
    pub last_smart_audio_detect: Option<DateTime<Utc>>,
    pub last_smart_audio_detect_event_id: Option<String>,

    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl ProtectDevice for Camera {
    const MODEL: ModelType = ModelType::Camera;

    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }

    fn clear_volatile(&mut self) -> bool {
        let had = self.stats.is_some() || self.phy_rate.is_some();
        self.stats = None;
        self.phy_rate = None;
        had
    }
}

// ── Light ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LightDeviceSettings {
    pub is_indicator_enabled: bool,
    pub led_level: i64,
    /// How long the light stays on after PIR motion, in milliseconds.
    pub pir_duration: i64,
    pub pir_sensitivity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LightOnSettings {
    pub is_led_force_on: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LightModeSettings {
    pub mode: Option<String>,
    pub enable_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Light {
    #[serde(flatten)]
    pub common: DeviceCommon,
    pub is_pir_motion_detected: bool,
    pub is_light_on: bool,
    pub is_locating: bool,
    pub light_device_settings: LightDeviceSettings,
    pub light_on_settings: LightOnSettings,
    pub light_mode_settings: LightModeSettings,
    /// Bound camera, if paired.
    #[serde(rename = "camera")]
    pub camera_id: Option<String>,
    pub is_camera_paired: bool,
    #[serde(with = "ts_milliseconds_option")]
    pub last_motion: Option<DateTime<Utc>>,

    // Derived by the diff engine.
    pub last_motion_event_id: Option<String>,

    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl ProtectDevice for Light {
    const MODEL: ModelType = ModelType::Light;

    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }
}

// ── Sensor ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BatteryStatus {
    pub percentage: Option<i64>,
    pub is_low: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorToggleSettings {
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorThresholdSettings {
    pub is_enabled: bool,
    pub margin: Option<f64>,
    pub low_threshold: Option<f64>,
    pub high_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorSensitivitySettings {
    pub is_enabled: bool,
    pub sensitivity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorStat {
    pub value: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorStats {
    pub light: SensorStat,
    pub humidity: SensorStat,
    pub temperature: SensorStat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Sensor {
    #[serde(flatten)]
    pub common: DeviceCommon,
    pub mount_type: MountType,
    pub battery_status: Option<BatteryStatus>,
    pub is_motion_detected: bool,
    pub is_opened: bool,
    #[serde(with = "ts_milliseconds_option")]
    pub leak_detected_at: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub motion_detected_at: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub open_status_changed_at: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub alarm_triggered_at: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub tampering_detected_at: Option<DateTime<Utc>>,
    pub stats: Option<SensorStats>,
    pub temperature_settings: Option<SensorThresholdSettings>,
    pub humidity_settings: Option<SensorThresholdSettings>,
    pub light_settings: Option<SensorThresholdSettings>,
    pub motion_settings: Option<SensorSensitivitySettings>,
    pub alarm_settings: Option<SensorToggleSettings>,
    pub led_settings: Option<SensorToggleSettings>,
    #[serde(rename = "camera")]
    pub camera_id: Option<String>,

    // Derived by the diff engine.
    pub last_motion_event_id: Option<String>,
    pub last_contact_event_id: Option<String>,

    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl ProtectDevice for Sensor {
    const MODEL: ModelType = ModelType::Sensor;

    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }

    fn clear_volatile(&mut self) -> bool {
        let had = self.stats.is_some();
        self.stats = None;
        had
    }
}

// ── Viewer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Viewer {
    #[serde(flatten)]
    pub common: DeviceCommon,
    pub stream_limit: i64,
    pub software_version: Option<String>,
    #[serde(rename = "liveview")]
    pub liveview_id: Option<String>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl ProtectDevice for Viewer {
    const MODEL: ModelType = ModelType::Viewer;

    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }
}

// ── Chime ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RingSetting {
    #[serde(rename = "camera")]
    pub camera_id: String,
    pub repeat_times: i64,
    pub track_no: i64,
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Chime {
    #[serde(flatten)]
    pub common: DeviceCommon,
    pub volume: i64,
    pub is_probing_for_wifi: bool,
    #[serde(with = "ts_milliseconds_option")]
    pub last_ring: Option<DateTime<Utc>>,
    /// Paired cameras. Unresolved ids are retained so a later camera add
    /// repairs the reference.
    pub camera_ids: Vec<String>,
    pub ring_settings: Vec<RingSetting>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl ProtectDevice for Chime {
    const MODEL: ModelType = ModelType::Chime;

    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }
}

// ── Doorlock ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Doorlock {
    #[serde(flatten)]
    pub common: DeviceCommon,
    pub lock_status: LockStatusType,
    /// Auto close delay in milliseconds.
    #[serde(rename = "autoCloseTimeMs")]
    pub auto_close_time: i64,
    pub battery_status: Option<BatteryStatus>,
    pub led_settings: Option<SensorToggleSettings>,
    #[serde(rename = "camera")]
    pub camera_id: Option<String>,

    // Derived by the diff engine from NFC/fingerprint access events.
    #[serde(with = "ts_milliseconds_option")]
    pub last_access_at: Option<DateTime<Utc>>,
    pub last_nfc_event_id: Option<String>,
    pub last_fingerprint_event_id: Option<String>,

    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl ProtectDevice for Doorlock {
    const MODEL: ModelType = ModelType::Doorlock;

    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Bridge {
    #[serde(flatten)]
    pub common: DeviceCommon,
    pub platform: Option<String>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl ProtectDevice for Bridge {
    const MODEL: ModelType = ModelType::Bridge;

    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut DeviceCommon {
        &mut self.common
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camera_parses_wire_form() {
        let camera: Camera = serde_json::from_value(json!({
            "id": "61ddb66b018e2703e7008c19",
            "modelKey": "camera",
            "name": "Front Door",
            "mac": "AA:BB:CC:DD:EE:FF",
            "state": "CONNECTED",
            "host": "192.168.1.20",
            "upSince": 1700000000000i64,
            "isConnected": true,
            "micVolume": 100,
            "videoMode": "default",
            "recordingSettings": { "mode": "detections", "prePadding": 3000 },
            "channels": [
                { "id": 0, "width": 3840, "height": 2160, "fps": 30, "bitrate": 16000000 }
            ],
            "bridge": "b1ddb66b018e2703e7008c20",
            "futureFirmwareField": { "nested": true }
        }))
        .unwrap();

        assert_eq!(camera.common.mac, "aabbccddeeff");
        assert!(camera.common.state.is_connected());
        assert_eq!(camera.recording_settings.mode, RecordingMode::Detections);
        assert_eq!(camera.channels.len(), 1);
        assert_eq!(camera.bridge_id.as_deref(), Some("b1ddb66b018e2703e7008c20"));
        assert_eq!(
            camera.extras.get("futureFirmwareField"),
            Some(&json!({ "nested": true }))
        );
    }

    #[test]
    fn extras_round_trip_on_serialization() {
        let camera: Camera = serde_json::from_value(json!({
            "id": "c1",
            "mac": "aabbccddeeff",
            "state": "DISCONNECTED",
            "newFirmwareKnob": 42
        }))
        .unwrap();
        let out = serde_json::to_value(&camera).unwrap();
        assert_eq!(out["newFirmwareKnob"], json!(42));
        assert_eq!(out["mac"], json!("aabbccddeeff"));
    }

    #[test]
    fn bad_mac_is_rejected() {
        let result: Result<Camera, _> = serde_json::from_value(json!({
            "id": "c1",
            "mac": "not-a-mac",
            "state": "CONNECTED"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn ipv6_host_is_accepted() {
        let camera: Camera = serde_json::from_value(json!({
            "id": "c1",
            "mac": "aabbccddeeff",
            "state": "CONNECTED",
            "host": "fd00::1234"
        }))
        .unwrap();
        assert!(matches!(camera.common.host, Some(IpAddr::V6(_))));
    }

    #[test]
    fn clear_volatile_keeps_configuration() {
        let mut camera: Camera = serde_json::from_value(json!({
            "id": "c1",
            "mac": "aabbccddeeff",
            "state": "CONNECTED",
            "phyRate": 1000.0,
            "stats": { "rxBytes": 10, "txBytes": 20 },
            "recordingSettings": { "mode": "always" }
        }))
        .unwrap();

        camera.clear_volatile();
        assert!(camera.stats.is_none());
        assert!(camera.phy_rate.is_none());
        assert_eq!(camera.recording_settings.mode, RecordingMode::Always);
    }

    #[test]
    fn sensor_telemetry_parses() {
        let sensor: Sensor = serde_json::from_value(json!({
            "id": "s1",
            "mac": "aabbccddee00",
            "state": "CONNECTED",
            "mountType": "door",
            "isOpened": true,
            "stats": {
                "light": { "value": 14.0, "status": "neutral" },
                "humidity": { "value": 48.2, "status": "neutral" },
                "temperature": { "value": 21.5, "status": "neutral" }
            },
            "batteryStatus": { "percentage": 88, "isLow": false }
        }))
        .unwrap();
        assert_eq!(sensor.mount_type, MountType::Door);
        assert!(sensor.is_opened);
        assert_eq!(sensor.stats.as_ref().unwrap().temperature.value, Some(21.5));
    }

    #[test]
    fn chime_ring_settings_parse() {
        let chime: Chime = serde_json::from_value(json!({
            "id": "ch1",
            "mac": "aabbccddee11",
            "state": "CONNECTED",
            "cameraIds": ["cam1", "cam2"],
            "ringSettings": [
                { "camera": "cam1", "repeatTimes": 1, "trackNo": 1, "volume": 60 }
            ]
        }))
        .unwrap();
        assert_eq!(chime.camera_ids, vec!["cam1", "cam2"]);
        assert_eq!(chime.ring_settings[0].camera_id, "cam1");
    }
}
