//! Event records from the controller's event stream.
//!
//! Events are first-class objects on the wire and also imply state changes
//! on their target device; the diff engine owns that derivation.

use std::collections::HashMap;

use chrono::serde::ts_milliseconds_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EventType, ModelType, MountType, SmartDetectType};

/// Type-dependent metadata bag carried by events.
///
/// Only the keys the engine dereferences are typed; everything else stays
/// in `extras`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EventMetadata {
    pub client_platform: Option<String>,
    pub reason: Option<String>,
    pub light_id: Option<String>,
    pub light_name: Option<String>,
    pub sensor_id: Option<String>,
    pub sensor_name: Option<String>,
    pub doorlock_id: Option<String>,
    pub doorlock_name: Option<String>,
    pub device_id: Option<String>,
    pub mac: Option<String>,
    pub mount_type: Option<MountType>,
    pub from_value: Option<String>,
    pub to_value: Option<String>,
    pub alarm_type: Option<String>,
    /// NFC scans and fingerprint identifications.
    pub nfc_id: Option<String>,
    pub fingerprint_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub id: String,
    #[serde(rename = "modelKey")]
    pub model: Option<ModelType>,
    #[serde(rename = "type")]
    pub kind: Option<EventType>,
    #[serde(with = "ts_milliseconds_option")]
    pub start: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub end: Option<DateTime<Utc>>,
    pub score: i64,
    #[serde(rename = "camera")]
    pub camera_id: Option<String>,
    #[serde(rename = "user")]
    pub user_id: Option<String>,
    #[serde(rename = "thumbnail")]
    pub thumbnail_id: Option<String>,
    #[serde(rename = "heatmap")]
    pub heatmap_id: Option<String>,
    pub smart_detect_types: Vec<SmartDetectType>,
    #[serde(rename = "smartDetectEvents")]
    pub smart_detect_event_ids: Vec<String>,
    pub metadata: Option<EventMetadata>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl Event {
    /// An event is active until its end time is set; it completes exactly
    /// once and never reopens.
    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }

    /// The device the event targets: the camera when present, otherwise
    /// whatever the metadata bag names.
    pub fn target_device_id(&self) -> Option<&str> {
        if let Some(camera_id) = self.camera_id.as_deref() {
            return Some(camera_id);
        }
        let metadata = self.metadata.as_ref()?;
        metadata
            .light_id
            .as_deref()
            .or(metadata.sensor_id.as_deref())
            .or(metadata.doorlock_id.as_deref())
            .or(metadata.device_id.as_deref())
    }
}
