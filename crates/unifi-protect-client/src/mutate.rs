//! Write path: dirty buffer, minimal PATCH, echo suppression.
//!
//! A [`PendingDevice`] is a detached clone of a graph device. Setters stage
//! changes on the clone; `save()` diffs it against the server-confirmed
//! record, registers the changed paths in the ignore table, PATCHes the
//! minimal body, and commits locally on success. On failure the dirty
//! buffer is discarded, so retrying is always safe.

use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use unifi_protect_data::convert::value_diff;
use unifi_protect_data::devices::{Camera, Chime, Doorlock, Light, Sensor, Viewer};
use unifi_protect_data::types::{ModelType, RecordingMode, VideoMode};

use crate::error::{Error, Result};
use crate::ProtectClient;

/// Wire keys the controller owns; a save that touches one is refused and
/// the dirty buffer discarded.
const READ_ONLY_WIRE_KEYS: &[&str] = &[
    "id",
    "modelKey",
    "mac",
    "host",
    "connectionHost",
    "type",
    "state",
    "upSince",
    "uptime",
    "lastSeen",
    "connectedSince",
    "hardwareRevision",
    "firmwareVersion",
    "isConnected",
    "isAdopted",
    "isUpdating",
    "permissions",
];

/// Wire keys the diff engine derives locally. They never belong in a PATCH
/// body and are stripped from the diff silently.
const LOCAL_DERIVED_WIRE_KEYS: &[&str] = &[
    "isRinging",
    "isMotionDetected",
    "isSmartDetected",
    "lastMotion",
    "lastMotionEnd",
    "lastMotionEventId",
    "lastRing",
    "lastRingEventId",
    "lastSmartDetect",
    "lastSmartDetectEventId",
    "lastSmartAudioDetect",
    "lastSmartAudioDetectEventId",
    "lastAccessAt",
    "lastNfcEventId",
    "lastFingerprintEventId",
];

/// Staged changes for one device.
///
/// Dereferences to the device record, so any field reachable through the
/// typed model can be edited; the typed setters below cover the common
/// operations.
pub struct PendingDevice<T> {
    client: ProtectClient,
    model: ModelType,
    id: String,
    confirmed: T,
    dirty: T,
}

impl<T> Deref for PendingDevice<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.dirty
    }
}

impl<T> DerefMut for PendingDevice<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.dirty
    }
}

impl<T> PendingDevice<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn new(client: ProtectClient, model: ModelType, id: &str, device: T) -> Self {
        Self {
            client,
            model,
            id: id.to_string(),
            confirmed: device.clone(),
            dirty: device,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    /// The minimal PATCH body the staged changes would produce.
    pub fn changes(&self) -> Result<Value> {
        let confirmed = serde_json::to_value(&self.confirmed).map_err(unifi_protect_data::Error::from)?;
        let dirty = serde_json::to_value(&self.dirty).map_err(unifi_protect_data::Error::from)?;
        let mut diff = value_diff(&confirmed, &dirty);
        if let Value::Object(map) = &mut diff {
            for key in LOCAL_DERIVED_WIRE_KEYS {
                map.remove(*key);
            }
        }
        Ok(diff)
    }

    /// Discards staged changes, restoring the server-confirmed state.
    pub fn revert(&mut self) {
        self.dirty = self.confirmed.clone();
    }

    /// Sends the staged changes to the controller.
    ///
    /// Emits only changed leaves. Matching WebSocket echoes arriving within
    /// the suppression TTL are swallowed. On any error the staged changes
    /// are dropped with the handle; the caller may safely retry.
    pub async fn save(self) -> Result<()> {
        if self.client.is_closing() {
            return Err(Error::Cancelled);
        }

        let diff = self.changes()?;
        let Value::Object(map) = &diff else {
            return Err(Error::State("device did not serialize to an object"));
        };
        if map.is_empty() {
            return Ok(());
        }

        for key in READ_ONLY_WIRE_KEYS {
            if map.contains_key(*key) {
                return Err(Error::BadRequest {
                    status: 400,
                    message: format!("field '{key}' is read only"),
                });
            }
        }

        debug!(model = %self.model, id = self.id.as_str(), body = %diff, "saving device changes");

        // register before the PATCH so a fast echo cannot outrun us
        self.client.register_pending_write(&self.id, &diff).await;
        self.client
            .update_device(&self.model, &self.id, diff.clone())
            .await?;
        self.client
            .apply_local_patch(&self.model, &self.id, &diff)
            .await;
        Ok(())
    }
}

// ── Typed setters for the common operations ──────────────────────────

impl PendingDevice<Camera> {
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.dirty.common.name = Some(name.into());
    }

    pub fn set_recording_mode(&mut self, mode: RecordingMode) {
        self.dirty.recording_settings.mode = mode;
    }

    pub fn set_video_mode(&mut self, mode: VideoMode) {
        self.dirty.video_mode = mode;
    }

    pub fn set_mic_volume(&mut self, volume: i64) {
        self.dirty.mic_volume = volume;
    }
}

impl PendingDevice<Light> {
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.dirty.common.name = Some(name.into());
    }

    /// Forces the light on or returns it to its configured mode.
    pub fn set_light_on(&mut self, on: bool) {
        self.dirty.light_on_settings.is_led_force_on = on;
    }

    pub fn set_paired_camera(&mut self, camera_id: Option<String>) {
        self.dirty.camera_id = camera_id;
    }
}

impl PendingDevice<Chime> {
    pub fn set_volume(&mut self, volume: i64) {
        self.dirty.volume = volume;
    }

    pub fn set_camera_ids(&mut self, camera_ids: Vec<String>) {
        self.dirty.camera_ids = camera_ids;
    }
}

impl PendingDevice<Viewer> {
    pub fn set_liveview(&mut self, liveview_id: impl Into<String>) {
        self.dirty.liveview_id = Some(liveview_id.into());
    }
}

impl PendingDevice<Sensor> {
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.dirty.common.name = Some(name.into());
    }
}

impl PendingDevice<Doorlock> {
    pub fn set_auto_close_time(&mut self, millis: i64) {
        self.dirty.auto_close_time = millis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use unifi_protect_data::types::StateType;

    fn camera() -> Camera {
        serde_json::from_value(json!({
            "id": "cam1",
            "modelKey": "camera",
            "name": "Front Door",
            "mac": "aabbccddeeff",
            "state": "CONNECTED",
            "micVolume": 100,
            "recordingSettings": { "mode": "never", "prePadding": 3000 }
        }))
        .unwrap()
    }

    fn pending(camera: Camera) -> PendingDevice<Camera> {
        let client = ProtectClient::new(crate::ProtectConfig {
            address: "192.0.2.1".into(),
            username: "svc".into(),
            password: "pw".into(),
            ..crate::ProtectConfig::default()
        })
        .unwrap();
        PendingDevice::new(client, ModelType::Camera, "cam1", camera)
    }

    #[test]
    fn diff_is_minimal() {
        let mut pending = pending(camera());
        pending.set_recording_mode(RecordingMode::Always);

        let diff = pending.changes().unwrap();
        assert_eq!(diff, json!({ "recordingSettings": { "mode": "always" } }));
    }

    #[test]
    fn no_changes_produces_empty_diff() {
        let pending = pending(camera());
        let diff = pending.changes().unwrap();
        assert_eq!(diff, json!({}));
    }

    #[test]
    fn locally_derived_fields_are_stripped() {
        let mut pending = pending(camera());
        pending.dirty.is_motion_detected = true;
        pending.set_mic_volume(25);

        let diff = pending.changes().unwrap();
        assert_eq!(diff, json!({ "micVolume": 25 }));
    }

    #[test]
    fn revert_restores_confirmed_state() {
        let mut pending = pending(camera());
        pending.set_name("Garage");
        pending.revert();
        assert!(pending.changes().unwrap().as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_only_fields_are_refused() {
        let mut pending = pending(camera());
        pending.dirty.common.state = StateType::Disconnected;

        match pending.save().await {
            Err(Error::BadRequest { message, .. }) => {
                assert!(message.contains("read only"), "{message}");
            }
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn nested_setter_batches_combine() {
        let mut pending = pending(camera());
        pending.set_recording_mode(RecordingMode::Detections);
        pending.set_name("Porch");

        let diff = pending.changes().unwrap();
        assert_eq!(diff["name"], json!("Porch"));
        assert_eq!(diff["recordingSettings"]["mode"], json!("detections"));
        assert!(diff.get("micVolume").is_none());
    }
}
