//! Closed enum registry for the Protect wire protocol.
//!
//! The controller grows new enum values between firmware releases, so every
//! string-backed enum carries an untagged `Unknown(String)` arm that
//! round-trips the raw value instead of failing deserialization.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Discriminator for every object kind the controller ships over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ModelType {
    Camera,
    Nvr,
    Event,
    Chime,
    Bridge,
    Light,
    Liveview,
    Sensor,
    Viewer,
    Doorlock,
    Keyring,
    UlpUser,
    User,
    Group,
    #[serde(untagged)]
    Unknown(String),
}

impl ModelType {
    /// The wire form of the model key.
    pub fn as_str(&self) -> &str {
        match self {
            ModelType::Camera => "camera",
            ModelType::Nvr => "nvr",
            ModelType::Event => "event",
            ModelType::Chime => "chime",
            ModelType::Bridge => "bridge",
            ModelType::Light => "light",
            ModelType::Liveview => "liveview",
            ModelType::Sensor => "sensor",
            ModelType::Viewer => "viewer",
            ModelType::Doorlock => "doorlock",
            ModelType::Keyring => "keyring",
            ModelType::UlpUser => "ulpUser",
            ModelType::User => "user",
            ModelType::Group => "group",
            ModelType::Unknown(raw) => raw,
        }
    }

    /// REST collection path segment for adoptable device kinds, `None` for
    /// object kinds that are not addressed as devices.
    pub fn devices_path(&self) -> Option<&'static str> {
        match self {
            ModelType::Camera => Some("cameras"),
            ModelType::Chime => Some("chimes"),
            ModelType::Bridge => Some("bridges"),
            ModelType::Light => Some("lights"),
            ModelType::Liveview => Some("liveviews"),
            ModelType::Sensor => Some("sensors"),
            ModelType::Viewer => Some("viewers"),
            ModelType::Doorlock => Some("doorlocks"),
            _ => None,
        }
    }
}

impl Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Adopted device connection state. The wire form is upper-case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateType {
    Connected,
    Connecting,
    #[default]
    Disconnected,
    #[serde(untagged)]
    Unknown(String),
}

impl StateType {
    pub fn is_connected(&self) -> bool {
        matches!(self, StateType::Connected)
    }
}

/// Event discriminator. Only the kinds the diff engine reacts to are named;
/// everything else survives as `Unknown`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Motion,
    Ring,
    SmartDetectZone,
    SmartDetectLine,
    SmartAudioDetect,
    NfcCardScanned,
    FingerprintIdentified,
    SensorMotion,
    SensorOpened,
    SensorClosed,
    SensorAlarm,
    SensorExtremeValues,
    SensorWaterLeak,
    SensorBatteryLow,
    LightMotion,
    DoorlockOpened,
    DoorlockClosed,
    DeviceAdopted,
    DeviceUnadopted,
    CameraConnected,
    CameraDisconnected,
    Disconnect,
    Provision,
    Update,
    Access,
    #[serde(untagged)]
    Unknown(String),
}

impl EventType {
    /// Event kinds that set the motion flag on their camera.
    pub fn is_camera_motion(&self) -> bool {
        matches!(
            self,
            EventType::Motion | EventType::SmartDetectZone | EventType::SmartDetectLine
        )
    }
}

/// Server-side classification of motion into object categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SmartDetectType {
    Person,
    Vehicle,
    Package,
    Animal,
    LicensePlate,
    Face,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SmartDetectAudioType {
    #[serde(rename = "alrmSmoke")]
    Smoke,
    #[serde(rename = "alrmCmonx")]
    CmonX,
    #[serde(rename = "alrmSiren")]
    Siren,
    #[serde(rename = "alrmBabyCry")]
    BabyCry,
    #[serde(rename = "alrmSpeak")]
    Speak,
    #[serde(rename = "alrmBark")]
    Bark,
    #[serde(rename = "alrmBurglar")]
    Burglar,
    #[serde(rename = "alrmCarHorn")]
    CarHorn,
    #[serde(rename = "alrmGlassBreak")]
    GlassBreak,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecordingMode {
    Always,
    #[default]
    Never,
    Schedule,
    Detections,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum VideoMode {
    #[default]
    Default,
    HighFps,
    Sport,
    SlowShutter,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MountType {
    #[default]
    None,
    Leak,
    Door,
    Window,
    Garage,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatusType {
    Open,
    Opening,
    #[default]
    Closed,
    Closing,
    JammedWhileClosing,
    JammedWhileOpening,
    NotCalibrated,
    #[serde(untagged)]
    Unknown(String),
}

/// Action field of a WebSocket action frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WsAction {
    Add,
    Update,
    Remove,
}

impl Display for WsAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WsAction::Add => write!(f, "add"),
            WsAction::Update => write!(f, "update"),
            WsAction::Remove => write!(f, "remove"),
        }
    }
}

/// Payload format byte of a WebSocket frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadFormat {
    Json = 1,
    Utf8String = 2,
    DeflatedJson = 3,
}

impl PayloadFormat {
    pub fn from_byte(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(PayloadFormat::Json),
            2 => Some(PayloadFormat::Utf8String),
            3 => Some(PayloadFormat::DeflatedJson),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_type_round_trips_wire_form() {
        let ulp: ModelType = serde_json::from_str("\"ulpUser\"").unwrap();
        assert_eq!(ulp, ModelType::UlpUser);
        assert_eq!(serde_json::to_string(&ulp).unwrap(), "\"ulpUser\"");
    }

    #[test]
    fn unknown_model_type_survives() {
        let raw: ModelType = serde_json::from_str("\"aiPort\"").unwrap();
        assert_eq!(raw, ModelType::Unknown("aiPort".to_string()));
        assert_eq!(serde_json::to_string(&raw).unwrap(), "\"aiPort\"");
    }

    #[test]
    fn unknown_video_mode_keeps_raw_string() {
        let mode: VideoMode = serde_json::from_str("\"future_mode_not_yet_known\"").unwrap();
        assert_eq!(
            mode,
            VideoMode::Unknown("future_mode_not_yet_known".to_string())
        );
        assert_eq!(
            serde_json::to_string(&mode).unwrap(),
            "\"future_mode_not_yet_known\""
        );
    }

    #[test]
    fn state_type_uses_upper_case_wire_form() {
        let state: StateType = serde_json::from_str("\"CONNECTED\"").unwrap();
        assert!(state.is_connected());
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"CONNECTED\"");
    }

    #[test]
    fn event_type_camel_case() {
        let kind: EventType = serde_json::from_str("\"smartDetectZone\"").unwrap();
        assert_eq!(kind, EventType::SmartDetectZone);
        assert!(kind.is_camera_motion());
        let ring: EventType = serde_json::from_str("\"ring\"").unwrap();
        assert!(!ring.is_camera_motion());
    }

    #[test]
    fn payload_format_from_byte() {
        assert_eq!(PayloadFormat::from_byte(1), Some(PayloadFormat::Json));
        assert_eq!(
            PayloadFormat::from_byte(3),
            Some(PayloadFormat::DeflatedJson)
        );
        assert_eq!(PayloadFormat::from_byte(9), None);
    }
}
