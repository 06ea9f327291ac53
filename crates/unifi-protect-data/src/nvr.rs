//! Controller-level records: the NVR itself, saved liveview layouts, and
//! the keyring/ULP user objects newer controllers ship.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::serde::ts_milliseconds_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::convert::de_mac;
use crate::types::ModelType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NvrPorts {
    pub ump: Option<u16>,
    pub http: Option<u16>,
    pub https: Option<u16>,
    pub rtsp: Option<u16>,
    pub rtsps: Option<u16>,
    pub tcp_streams: Option<u16>,
    pub cameras: Option<u16>,
    pub discovery_client: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageInfo {
    pub total_size: Option<i64>,
    pub total_spaced_used: Option<i64>,
    pub available: Option<i64>,
    pub is_recycling: bool,
}

/// The controller record. Exactly one per bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Nvr {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "modelKey")]
    pub model: Option<ModelType>,
    #[serde(deserialize_with = "de_mac")]
    pub mac: String,
    pub host: Option<IpAddr>,
    pub hosts: Vec<IpAddr>,
    pub version: Option<String>,
    pub firmware_version: Option<String>,
    pub hardware_platform: Option<String>,
    pub timezone: Option<String>,
    #[serde(with = "ts_milliseconds_option")]
    pub up_since: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds_option")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Uptime in milliseconds.
    pub uptime: Option<i64>,
    pub ports: NvrPorts,
    pub storage_info: Option<StorageInfo>,
    pub is_stats_gathering_enabled: bool,
    pub enable_automatic_backups: bool,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

// ── Liveviews ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveviewSlot {
    pub camera_ids: Vec<String>,
    pub cycle_mode: Option<String>,
    /// Cycle interval in milliseconds.
    pub cycle_interval: Option<i64>,
}

/// A saved multi-camera layout on the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Liveview {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "modelKey")]
    pub model: Option<ModelType>,
    pub is_default: bool,
    pub is_global: bool,
    pub layout: i64,
    pub slots: Vec<LiveviewSlot>,
    pub owner: Option<String>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

// ── Keyring / ULP users (2.11+ controllers) ──────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Keyring {
    pub id: String,
    #[serde(rename = "modelKey")]
    pub model: Option<ModelType>,
    pub device_type: Option<String>,
    pub device_id: Option<String>,
    pub registry_type: Option<String>,
    pub registry_id: Option<String>,
    pub ulp_user: Option<String>,
    #[serde(with = "ts_milliseconds_option")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UlpUser {
    pub id: String,
    #[serde(rename = "modelKey")]
    pub model: Option<ModelType>,
    pub ulp_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<String>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}
