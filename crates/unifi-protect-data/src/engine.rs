//! Differential update pipeline.
//!
//! The engine owns everything between a decoded WebSocket packet and a
//! subscriber notification: replay elision, dispatch by model key, sparse
//! merge into the graph, echo suppression, event derivation, and the
//! divergence counter that triggers a full re-bootstrap. It never returns
//! an error across the reader boundary; malformed packets are logged,
//! counted, and dropped.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::bootstrap::{Bootstrap, Identified, ProtectObject};
use crate::convert::{canonicalize_keys, leaf_paths, update_in_place, ConvertCache};
use crate::devices::ProtectDevice;
use crate::error::Result;
use crate::events::Event;
use crate::ignore::IgnoreTable;
use crate::types::{EventType, ModelType, WsAction};
use crate::websocket::WsPacket;

/// Keys the controller updates continuously; stripped from update packets
/// when `ignore_stats` is set.
const STATS_KEYS: &[&str] = &[
    "storageStats",
    "stats",
    "systemInfo",
    "phyRate",
    "wifiConnectionState",
    "upSince",
    "uptime",
    "lastSeen",
    "recordingSchedules",
];

/// Keys that are dropped from every device update.
const IGNORED_DEVICE_KEYS: &[&str] = &["nvrMac", "guid"];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL of echo-suppression entries.
    pub ignore_ttl: Duration,
    /// Unresolved-reference count that triggers a full re-bootstrap.
    pub divergence_threshold: usize,
    /// Sliding window for the divergence counter.
    pub divergence_window: Duration,
    /// How many applied update ids are remembered for replay elision.
    pub recent_id_window: usize,
    /// Events older than this fall out of the recent-events map.
    pub event_retention: Duration,
    /// Strip stats/telemetry keys from update packets.
    pub ignore_stats: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ignore_ttl: Duration::from_secs(2),
            divergence_threshold: 3,
            divergence_window: Duration::from_secs(60),
            recent_id_window: 64,
            event_retention: Duration::from_secs(3600),
            ignore_stats: false,
        }
    }
}

/// Notification produced by one applied packet.
///
/// Objects are detached snapshots; the graph keeps sole ownership of the
/// live records.
#[derive(Debug, Clone)]
pub struct SyncMessage {
    pub action: WsAction,
    pub model: ModelType,
    pub id: String,
    pub new_update_id: Option<String>,
    /// Snake_case dotted paths of the fields that changed.
    pub changed_fields: BTreeSet<String>,
    pub new_object: Option<ProtectObject>,
    pub old_object: Option<ProtectObject>,
}

enum DeviceUpdate {
    Missing,
    NoChange,
    Failed(crate::error::Error),
    Changed {
        old: ProtectObject,
        new: ProtectObject,
        changed: BTreeSet<String>,
    },
}

/// Single-writer state machine that keeps a [`Bootstrap`] synchronized
/// with the packet stream.
#[derive(Debug)]
pub struct SyncEngine {
    config: EngineConfig,
    pub ignore: IgnoreTable,
    cache: ConvertCache,
    recent_ids: VecDeque<String>,
    inconsistencies: VecDeque<Instant>,
    needs_refresh: bool,
}

impl SyncEngine {
    pub fn new(config: EngineConfig) -> Self {
        let ignore = IgnoreTable::new(config.ignore_ttl);
        Self {
            config,
            ignore,
            cache: ConvertCache::new(),
            recent_ids: VecDeque::new(),
            inconsistencies: VecDeque::new(),
            needs_refresh: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the stream has diverged beyond repair and the session layer
    /// should fetch a fresh bootstrap. Clears the flag on read.
    pub fn take_needs_refresh(&mut self) -> bool {
        let flagged = self.needs_refresh;
        self.needs_refresh = false;
        if flagged {
            self.inconsistencies.clear();
        }
        flagged
    }

    /// Resets per-session stream state after a full re-bootstrap. Pending
    /// echo-suppression entries survive; they describe writes that are
    /// still in flight.
    pub fn reset_stream_state(&mut self) {
        self.recent_ids.clear();
        self.inconsistencies.clear();
        self.needs_refresh = false;
    }

    /// Applies one decoded packet to the graph.
    ///
    /// Returns the notifications to fan out, in order. An event add that
    /// also flips derived camera state yields two messages.
    pub fn apply(&mut self, bootstrap: &mut Bootstrap, packet: &WsPacket) -> Vec<SyncMessage> {
        let action = &packet.action;

        // Replay elision: the controller resends from the lastUpdateId
        // checkpoint after a reconnect.
        if let Some(new_id) = &action.new_update_id {
            if *new_id == bootstrap.last_update_id
                || self.recent_ids.iter().any(|seen| seen == new_id)
            {
                debug!(update_id = %new_id, "dropping replayed packet");
                return Vec::new();
            }
        }

        // The stream position advances for every fresh packet, including
        // ones that dispatch filters out.
        if let Some(new_id) = &action.new_update_id {
            bootstrap.last_update_id = new_id.clone();
            self.recent_ids.push_back(new_id.clone());
            while self.recent_ids.len() > self.config.recent_id_window {
                self.recent_ids.pop_front();
            }
        }

        if let ModelType::Unknown(raw) = &action.model_key {
            debug!(model = raw.as_str(), "unknown model key, dropping packet");
            return Vec::new();
        }

        let update_id = action.new_update_id.clone();
        match action.action {
            WsAction::Remove => self.apply_remove(bootstrap, packet, update_id),
            WsAction::Add => {
                if packet.payload.is_null() {
                    debug!(model = %action.model_key, "add packet without payload");
                    return Vec::new();
                }
                self.apply_add(bootstrap, packet, update_id)
            }
            WsAction::Update => {
                if packet.payload.is_null() {
                    return Vec::new();
                }
                self.apply_update(bootstrap, packet, update_id)
            }
        }
    }

    // ── Add ──────────────────────────────────────────────────────────

    fn apply_add(
        &mut self,
        bootstrap: &mut Bootstrap,
        packet: &WsPacket,
        update_id: Option<String>,
    ) -> Vec<SyncMessage> {
        let model = packet.action.model_key.clone();
        let mut data = packet.payload.clone();
        canonicalize_keys(&mut data, &mut self.cache);
        let changed = leaf_paths(&data, &mut self.cache);

        if model == ModelType::Event {
            return self.apply_event_add(bootstrap, data, changed, update_id);
        }

        let object = match decode_object(&model, data) {
            Ok(Some(object)) => object,
            Ok(None) => {
                debug!(model = %model, "unsupported model for add");
                return Vec::new();
            }
            Err(err) => {
                warn!(model = %model, error = %err, "failed to decode add payload");
                self.record_inconsistency();
                return Vec::new();
            }
        };

        let id = object.id().to_string();
        if insert_object(bootstrap, object.clone()) {
            warn!(model = %model, id = id.as_str(), "duplicate add, overwriting");
        }
        bootstrap.check_camera_refs(&model, &id);

        vec![SyncMessage {
            action: WsAction::Add,
            model,
            id,
            new_update_id: update_id,
            changed_fields: changed,
            new_object: Some(object),
            old_object: None,
        }]
    }

    fn apply_event_add(
        &mut self,
        bootstrap: &mut Bootstrap,
        data: Value,
        changed: BTreeSet<String>,
        update_id: Option<String>,
    ) -> Vec<SyncMessage> {
        let mut event: Event = match serde_json::from_value(data) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "failed to decode event payload, ignoring event");
                return Vec::new();
            }
        };
        clamp_times(&mut event);

        let mut messages = Vec::with_capacity(2);
        let derived = self.derive_event_started(bootstrap, &event, update_id.clone());

        bootstrap.insert_event(event.clone());
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.event_retention)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        bootstrap.prune_events(cutoff);

        messages.push(SyncMessage {
            action: WsAction::Add,
            model: ModelType::Event,
            id: event.id.clone(),
            new_update_id: update_id,
            changed_fields: changed,
            new_object: Some(ProtectObject::Event(event)),
            old_object: None,
        });
        messages.extend(derived);
        messages
    }

    // ── Remove ───────────────────────────────────────────────────────

    fn apply_remove(
        &mut self,
        bootstrap: &mut Bootstrap,
        packet: &WsPacket,
        update_id: Option<String>,
    ) -> Vec<SyncMessage> {
        let model = packet.action.model_key.clone();
        let id = packet.action.id.clone();

        if !is_tracked_model(&model) {
            debug!(model = %model, "remove for untracked model");
            return Vec::new();
        }

        let removed = remove_object(bootstrap, &model, &id);
        let Some(old_object) = removed else {
            if model == ModelType::Event {
                // events phase out of the recent map on their own
                return Vec::new();
            }
            warn!(model = %model, id = id.as_str(), "remove for unknown id");
            self.record_inconsistency();
            return Vec::new();
        };

        vec![SyncMessage {
            action: WsAction::Remove,
            model,
            id,
            new_update_id: update_id,
            changed_fields: BTreeSet::new(),
            new_object: None,
            old_object: Some(old_object),
        }]
    }

    // ── Update ───────────────────────────────────────────────────────

    fn apply_update(
        &mut self,
        bootstrap: &mut Bootstrap,
        packet: &WsPacket,
        update_id: Option<String>,
    ) -> Vec<SyncMessage> {
        let model = packet.action.model_key.clone();
        let id = packet.action.id.clone();

        let mut data = packet.payload.clone();
        canonicalize_keys(&mut data, &mut self.cache);
        strip_keys(&mut data, IGNORED_DEVICE_KEYS);
        if self.config.ignore_stats {
            strip_keys(&mut data, STATS_KEYS);
        }
        // cameras emit lastMotion every 100ms while motion is active; only
        // event starts move last_motion
        if model == ModelType::Camera {
            strip_keys(&mut data, &["lastMotion"]);
        }
        if data.as_object().is_some_and(|map| map.is_empty()) {
            return Vec::new();
        }

        if model == ModelType::Event {
            return self.apply_event_update(bootstrap, &id, data, update_id);
        }
        if model == ModelType::Nvr {
            // packets for another NVR in a stack are not ours
            if !id.is_empty() && id != bootstrap.nvr.id {
                return Vec::new();
            }
            let old = bootstrap.nvr.clone();
            return match update_in_place(&mut bootstrap.nvr, &data, &mut self.cache) {
                Ok(changed) if changed.is_empty() => Vec::new(),
                Ok(changed) => self
                    .finish_update(
                        ModelType::Nvr,
                        bootstrap.nvr.id.clone(),
                        update_id,
                        ProtectObject::Nvr(old),
                        ProtectObject::Nvr(bootstrap.nvr.clone()),
                        changed,
                    )
                    .into_iter()
                    .collect(),
                Err(err) => {
                    warn!(error = %err, "nvr update caused invalid state");
                    self.record_inconsistency();
                    Vec::new()
                }
            };
        }

        let outcome = match model {
            ModelType::Camera => {
                update_adoptable(&mut bootstrap.cameras, ProtectObject::Camera, &id, &data, &mut self.cache)
            }
            ModelType::Light => {
                update_adoptable(&mut bootstrap.lights, ProtectObject::Light, &id, &data, &mut self.cache)
            }
            ModelType::Sensor => {
                update_adoptable(&mut bootstrap.sensors, ProtectObject::Sensor, &id, &data, &mut self.cache)
            }
            ModelType::Viewer => {
                update_adoptable(&mut bootstrap.viewers, ProtectObject::Viewer, &id, &data, &mut self.cache)
            }
            ModelType::Chime => {
                update_adoptable(&mut bootstrap.chimes, ProtectObject::Chime, &id, &data, &mut self.cache)
            }
            ModelType::Doorlock => {
                update_adoptable(&mut bootstrap.doorlocks, ProtectObject::Doorlock, &id, &data, &mut self.cache)
            }
            ModelType::Bridge => {
                update_adoptable(&mut bootstrap.bridges, ProtectObject::Bridge, &id, &data, &mut self.cache)
            }
            ModelType::Liveview => {
                update_object(&mut bootstrap.liveviews, ProtectObject::Liveview, &id, &data, &mut self.cache)
            }
            ModelType::Keyring => {
                update_object(&mut bootstrap.keyrings, ProtectObject::Keyring, &id, &data, &mut self.cache)
            }
            ModelType::UlpUser => {
                update_object(&mut bootstrap.ulp_users, ProtectObject::UlpUser, &id, &data, &mut self.cache)
            }
            _ => {
                debug!(model = %model, "unsupported model for update");
                return Vec::new();
            }
        };

        match outcome {
            DeviceUpdate::Missing => {
                debug!(model = %model, id = id.as_str(), "update for unknown id");
                self.record_inconsistency();
                Vec::new()
            }
            DeviceUpdate::NoChange => Vec::new(),
            DeviceUpdate::Failed(err) => {
                warn!(model = %model, id = id.as_str(), error = %err, "update caused invalid state");
                self.record_inconsistency();
                Vec::new()
            }
            DeviceUpdate::Changed { old, new, changed } => {
                bootstrap.check_camera_refs(&model, &id);
                self.finish_update(model, id, update_id, old, new, changed)
                    .into_iter()
                    .collect()
            }
        }
    }

    /// Consumes echo-suppression entries and builds the notification. When
    /// every changed field was a self-echo, no message is emitted.
    fn finish_update(
        &mut self,
        model: ModelType,
        id: String,
        update_id: Option<String>,
        old: ProtectObject,
        new: ProtectObject,
        changed: BTreeSet<String>,
    ) -> Option<SyncMessage> {
        let remaining: BTreeSet<String> = changed
            .into_iter()
            .filter(|path| !self.ignore.consume(&id, path))
            .collect();
        self.ignore.purge_expired();

        if remaining.is_empty() {
            debug!(model = %model, id = id.as_str(), "update fully suppressed as self-echo");
            return None;
        }

        Some(SyncMessage {
            action: WsAction::Update,
            model,
            id,
            new_update_id: update_id,
            changed_fields: remaining,
            new_object: Some(new),
            old_object: Some(old),
        })
    }

    fn apply_event_update(
        &mut self,
        bootstrap: &mut Bootstrap,
        id: &str,
        data: Value,
        update_id: Option<String>,
    ) -> Vec<SyncMessage> {
        let Some(existing) = bootstrap.events.get_mut(id) else {
            // updates for events that already phased out of the window
            debug!(event = id, "update for unknown event");
            return Vec::new();
        };

        let old = existing.clone();
        let mut changed = match update_in_place(existing, &data, &mut self.cache) {
            Ok(changed) => changed,
            Err(err) => {
                warn!(event = id, error = %err, "event update caused invalid state");
                self.record_inconsistency();
                return Vec::new();
            }
        };
        if changed.is_empty() {
            return Vec::new();
        }

        // completed events never reopen
        if old.end.is_some() && changed.contains("end") {
            existing.end = old.end;
            changed.remove("end");
            if changed.is_empty() {
                return Vec::new();
            }
        }
        if clamp_times(existing) {
            changed.insert("start".to_string());
        }

        let event = existing.clone();
        if changed.contains("end") && event.end.is_some() {
            // flag clears ride along with the event notification
            self.derive_event_ended(bootstrap, &event);
        }

        vec![SyncMessage {
            action: WsAction::Update,
            model: ModelType::Event,
            id: id.to_string(),
            new_update_id: update_id,
            changed_fields: changed,
            new_object: Some(ProtectObject::Event(event)),
            old_object: Some(ProtectObject::Event(old)),
        }]
    }

    // ── Event derivation ─────────────────────────────────────────────

    /// Applies the state a starting event implies on its target device and
    /// returns the matching notification.
    fn derive_event_started(
        &mut self,
        bootstrap: &mut Bootstrap,
        event: &Event,
        update_id: Option<String>,
    ) -> Option<SyncMessage> {
        let kind = event.kind.clone()?;
        let mut changed = BTreeSet::new();

        let (model, id) = match kind {
            EventType::Motion | EventType::SmartDetectZone | EventType::SmartDetectLine => {
                let camera_id = event.camera_id.clone()?;
                let camera = bootstrap.cameras.get_mut(&camera_id)?;
                camera.is_motion_detected = true;
                camera.last_motion = event.start;
                camera.last_motion_event_id = Some(event.id.clone());
                changed.extend([
                    "is_motion_detected".to_string(),
                    "last_motion".to_string(),
                    "last_motion_event_id".to_string(),
                ]);
                if kind != EventType::Motion {
                    camera.is_smart_detected = true;
                    camera.last_smart_detect = event.start;
                    camera.last_smart_detect_event_id = Some(event.id.clone());
                    changed.extend([
                        "is_smart_detected".to_string(),
                        "last_smart_detect".to_string(),
                        "last_smart_detect_event_id".to_string(),
                    ]);
                }
                (ModelType::Camera, camera_id)
            }
            EventType::Ring => {
                let camera_id = event.camera_id.clone()?;
                let camera = bootstrap.cameras.get_mut(&camera_id)?;
                camera.is_ringing = true;
                camera.last_ring = event.start;
                camera.last_ring_event_id = Some(event.id.clone());
                changed.extend([
                    "is_ringing".to_string(),
                    "last_ring".to_string(),
                    "last_ring_event_id".to_string(),
                ]);
                (ModelType::Camera, camera_id)
            }
            EventType::SmartAudioDetect => {
                let camera_id = event.camera_id.clone()?;
                let camera = bootstrap.cameras.get_mut(&camera_id)?;
                camera.last_smart_audio_detect = event.start;
                camera.last_smart_audio_detect_event_id = Some(event.id.clone());
                changed.extend([
                    "last_smart_audio_detect".to_string(),
                    "last_smart_audio_detect_event_id".to_string(),
                ]);
                (ModelType::Camera, camera_id)
            }
            EventType::SensorMotion => {
                let sensor_id = event.target_device_id()?.to_string();
                let sensor = bootstrap.sensors.get_mut(&sensor_id)?;
                sensor.is_motion_detected = true;
                sensor.motion_detected_at = event.start;
                sensor.last_motion_event_id = Some(event.id.clone());
                changed.extend([
                    "is_motion_detected".to_string(),
                    "motion_detected_at".to_string(),
                    "last_motion_event_id".to_string(),
                ]);
                (ModelType::Sensor, sensor_id)
            }
            EventType::SensorOpened | EventType::SensorClosed => {
                let sensor_id = event.target_device_id()?.to_string();
                let sensor = bootstrap.sensors.get_mut(&sensor_id)?;
                sensor.is_opened = kind == EventType::SensorOpened;
                sensor.open_status_changed_at = event.start;
                sensor.last_contact_event_id = Some(event.id.clone());
                changed.extend([
                    "is_opened".to_string(),
                    "open_status_changed_at".to_string(),
                    "last_contact_event_id".to_string(),
                ]);
                (ModelType::Sensor, sensor_id)
            }
            EventType::SensorWaterLeak => {
                let sensor_id = event.target_device_id()?.to_string();
                let sensor = bootstrap.sensors.get_mut(&sensor_id)?;
                sensor.leak_detected_at = event.start;
                changed.insert("leak_detected_at".to_string());
                (ModelType::Sensor, sensor_id)
            }
            EventType::LightMotion => {
                let light_id = event.target_device_id()?.to_string();
                let light = bootstrap.lights.get_mut(&light_id)?;
                light.is_pir_motion_detected = true;
                light.last_motion = event.start;
                light.last_motion_event_id = Some(event.id.clone());
                changed.extend([
                    "is_pir_motion_detected".to_string(),
                    "last_motion".to_string(),
                    "last_motion_event_id".to_string(),
                ]);
                (ModelType::Light, light_id)
            }
            EventType::NfcCardScanned | EventType::FingerprintIdentified => {
                let doorlock_id = event.target_device_id()?.to_string();
                let doorlock = bootstrap.doorlocks.get_mut(&doorlock_id)?;
                doorlock.last_access_at = event.start;
                if kind == EventType::NfcCardScanned {
                    doorlock.last_nfc_event_id = Some(event.id.clone());
                    changed.insert("last_nfc_event_id".to_string());
                } else {
                    doorlock.last_fingerprint_event_id = Some(event.id.clone());
                    changed.insert("last_fingerprint_event_id".to_string());
                }
                changed.insert("last_access_at".to_string());
                (ModelType::Doorlock, doorlock_id)
            }
            _ => return None,
        };

        let new_object = bootstrap.device_by_id(&model, &id)?;
        Some(SyncMessage {
            action: WsAction::Update,
            model,
            id,
            new_update_id: update_id,
            changed_fields: changed,
            new_object: Some(new_object),
            old_object: None,
        })
    }

    /// Clears the derived flags a completing event set. Runs silently; the
    /// event notification is the only one subscribers see.
    fn derive_event_ended(&mut self, bootstrap: &mut Bootstrap, event: &Event) {
        let Some(kind) = event.kind.clone() else {
            return;
        };
        match kind {
            EventType::Motion | EventType::SmartDetectZone | EventType::SmartDetectLine => {
                if let Some(camera) = event
                    .camera_id
                    .as_ref()
                    .and_then(|id| bootstrap.cameras.get_mut(id))
                {
                    camera.is_motion_detected = false;
                    camera.last_motion_end = event.end;
                    if kind != EventType::Motion {
                        camera.is_smart_detected = false;
                    }
                }
            }
            EventType::Ring => {
                if let Some(camera) = event
                    .camera_id
                    .as_ref()
                    .and_then(|id| bootstrap.cameras.get_mut(id))
                {
                    camera.is_ringing = false;
                }
            }
            EventType::SensorMotion => {
                if let Some(sensor) = event
                    .target_device_id()
                    .and_then(|id| bootstrap.sensors.get_mut(id))
                {
                    sensor.is_motion_detected = false;
                }
            }
            EventType::LightMotion => {
                if let Some(light) = event
                    .target_device_id()
                    .and_then(|id| bootstrap.lights.get_mut(id))
                {
                    light.is_pir_motion_detected = false;
                }
            }
            _ => {}
        }
    }

    /// Clears a ring flag the controller never closed. Driven by the
    /// session layer's reset timer; emits a synthetic camera update.
    pub fn expire_ring(
        &mut self,
        bootstrap: &mut Bootstrap,
        camera_id: &str,
    ) -> Option<SyncMessage> {
        let camera = bootstrap.cameras.get_mut(camera_id)?;
        if !camera.is_ringing {
            return None;
        }
        camera.is_ringing = false;
        let snapshot = camera.clone();

        Some(SyncMessage {
            action: WsAction::Update,
            model: ModelType::Camera,
            id: camera_id.to_string(),
            new_update_id: None,
            changed_fields: BTreeSet::from(["is_ringing".to_string()]),
            new_object: Some(ProtectObject::Camera(snapshot)),
            old_object: None,
        })
    }

    fn record_inconsistency(&mut self) {
        let now = Instant::now();
        self.inconsistencies.push_back(now);
        while let Some(front) = self.inconsistencies.front() {
            if now.duration_since(*front) > self.config.divergence_window {
                self.inconsistencies.pop_front();
            } else {
                break;
            }
        }
        if self.inconsistencies.len() >= self.config.divergence_threshold {
            warn!(
                count = self.inconsistencies.len(),
                "stream divergence threshold reached, full refresh required"
            );
            self.needs_refresh = true;
        }
    }
}

// ── Graph helpers ────────────────────────────────────────────────────

/// If end precedes start, start is clamped to end. Returns whether a
/// clamp happened.
fn clamp_times(event: &mut Event) -> bool {
    if let (Some(start), Some(end)) = (event.start, event.end) {
        if end < start {
            event.start = Some(end);
            return true;
        }
    }
    false
}

/// Object kinds the bootstrap maintains a collection for.
fn is_tracked_model(model: &ModelType) -> bool {
    matches!(
        model,
        ModelType::Camera
            | ModelType::Light
            | ModelType::Sensor
            | ModelType::Viewer
            | ModelType::Chime
            | ModelType::Doorlock
            | ModelType::Bridge
            | ModelType::Liveview
            | ModelType::Keyring
            | ModelType::UlpUser
            | ModelType::Event
    )
}

fn strip_keys(data: &mut Value, keys: &[&str]) {
    if let Value::Object(map) = data {
        for key in keys {
            map.remove(*key);
        }
    }
}

fn decode_object(model: &ModelType, data: Value) -> Result<Option<ProtectObject>> {
    let object = match model {
        ModelType::Camera => Some(ProtectObject::Camera(serde_json::from_value(data)?)),
        ModelType::Light => Some(ProtectObject::Light(serde_json::from_value(data)?)),
        ModelType::Sensor => Some(ProtectObject::Sensor(serde_json::from_value(data)?)),
        ModelType::Viewer => Some(ProtectObject::Viewer(serde_json::from_value(data)?)),
        ModelType::Chime => Some(ProtectObject::Chime(serde_json::from_value(data)?)),
        ModelType::Doorlock => Some(ProtectObject::Doorlock(serde_json::from_value(data)?)),
        ModelType::Bridge => Some(ProtectObject::Bridge(serde_json::from_value(data)?)),
        ModelType::Liveview => Some(ProtectObject::Liveview(serde_json::from_value(data)?)),
        ModelType::Keyring => Some(ProtectObject::Keyring(serde_json::from_value(data)?)),
        ModelType::UlpUser => Some(ProtectObject::UlpUser(serde_json::from_value(data)?)),
        ModelType::Nvr => Some(ProtectObject::Nvr(serde_json::from_value(data)?)),
        ModelType::Event => Some(ProtectObject::Event(serde_json::from_value(data)?)),
        _ => None,
    };
    Ok(object)
}

/// Inserts an object into its map, returning whether an existing entry was
/// overwritten.
fn insert_object(bootstrap: &mut Bootstrap, object: ProtectObject) -> bool {
    match object {
        ProtectObject::Camera(device) => {
            let id = device.id().to_string();
            let mac = device.mac().to_string();
            bootstrap.index_device(ModelType::Camera, &id, &mac);
            bootstrap.cameras.insert(id, device).is_some()
        }
        ProtectObject::Light(device) => {
            let id = device.id().to_string();
            let mac = device.mac().to_string();
            bootstrap.index_device(ModelType::Light, &id, &mac);
            bootstrap.lights.insert(id, device).is_some()
        }
        ProtectObject::Sensor(device) => {
            let id = device.id().to_string();
            let mac = device.mac().to_string();
            bootstrap.index_device(ModelType::Sensor, &id, &mac);
            bootstrap.sensors.insert(id, device).is_some()
        }
        ProtectObject::Viewer(device) => {
            let id = device.id().to_string();
            let mac = device.mac().to_string();
            bootstrap.index_device(ModelType::Viewer, &id, &mac);
            bootstrap.viewers.insert(id, device).is_some()
        }
        ProtectObject::Chime(device) => {
            let id = device.id().to_string();
            let mac = device.mac().to_string();
            bootstrap.index_device(ModelType::Chime, &id, &mac);
            bootstrap.chimes.insert(id, device).is_some()
        }
        ProtectObject::Doorlock(device) => {
            let id = device.id().to_string();
            let mac = device.mac().to_string();
            bootstrap.index_device(ModelType::Doorlock, &id, &mac);
            bootstrap.doorlocks.insert(id, device).is_some()
        }
        ProtectObject::Bridge(device) => {
            let id = device.id().to_string();
            let mac = device.mac().to_string();
            bootstrap.index_device(ModelType::Bridge, &id, &mac);
            bootstrap.bridges.insert(id, device).is_some()
        }
        ProtectObject::Liveview(liveview) => {
            let id = liveview.id.clone();
            bootstrap.index_device(ModelType::Liveview, &id, "");
            bootstrap.liveviews.insert(id, liveview).is_some()
        }
        ProtectObject::Keyring(keyring) => {
            let id = keyring.id.clone();
            bootstrap.keyrings.insert(id, keyring).is_some()
        }
        ProtectObject::UlpUser(user) => {
            let id = user.id.clone();
            bootstrap.ulp_users.insert(id, user).is_some()
        }
        ProtectObject::Nvr(nvr) => {
            bootstrap.nvr = nvr;
            false
        }
        ProtectObject::Event(event) => {
            bootstrap.insert_event(event);
            false
        }
    }
}

fn remove_object(bootstrap: &mut Bootstrap, model: &ModelType, id: &str) -> Option<ProtectObject> {
    let removed = match model {
        ModelType::Camera => bootstrap.cameras.remove(id).map(ProtectObject::Camera),
        ModelType::Light => bootstrap.lights.remove(id).map(ProtectObject::Light),
        ModelType::Sensor => bootstrap.sensors.remove(id).map(ProtectObject::Sensor),
        ModelType::Viewer => bootstrap.viewers.remove(id).map(ProtectObject::Viewer),
        ModelType::Chime => bootstrap.chimes.remove(id).map(ProtectObject::Chime),
        ModelType::Doorlock => bootstrap.doorlocks.remove(id).map(ProtectObject::Doorlock),
        ModelType::Bridge => bootstrap.bridges.remove(id).map(ProtectObject::Bridge),
        ModelType::Liveview => bootstrap.liveviews.remove(id).map(ProtectObject::Liveview),
        ModelType::Keyring => bootstrap.keyrings.remove(id).map(ProtectObject::Keyring),
        ModelType::UlpUser => bootstrap.ulp_users.remove(id).map(ProtectObject::UlpUser),
        ModelType::Event => bootstrap.remove_event(id).map(ProtectObject::Event),
        _ => None,
    };

    if let Some(object) = &removed {
        let mac = match object {
            ProtectObject::Camera(d) => d.common.mac.clone(),
            ProtectObject::Light(d) => d.common.mac.clone(),
            ProtectObject::Sensor(d) => d.common.mac.clone(),
            ProtectObject::Viewer(d) => d.common.mac.clone(),
            ProtectObject::Chime(d) => d.common.mac.clone(),
            ProtectObject::Doorlock(d) => d.common.mac.clone(),
            ProtectObject::Bridge(d) => d.common.mac.clone(),
            _ => String::new(),
        };
        bootstrap.unindex_device(id, &mac);
    }
    removed
}

/// Sparse merge into one adoptable device. A transition to `DISCONNECTED`
/// clears volatile telemetry while configuration is retained.
fn update_adoptable<T>(
    map: &mut HashMap<String, T>,
    wrap: fn(T) -> ProtectObject,
    id: &str,
    data: &Value,
    cache: &mut ConvertCache,
) -> DeviceUpdate
where
    T: ProtectDevice + Clone + Serialize + DeserializeOwned,
{
    let Some(device) = map.get_mut(id) else {
        return DeviceUpdate::Missing;
    };
    let old = device.clone();
    let mut changed = match update_in_place(device, data, cache) {
        Ok(changed) => changed,
        Err(err) => return DeviceUpdate::Failed(err),
    };
    if changed.is_empty() {
        return DeviceUpdate::NoChange;
    }

    if changed.contains("state") && !device.common().state.is_connected() && device.clear_volatile() {
        changed.insert("stats".to_string());
    }

    DeviceUpdate::Changed {
        old: wrap(old),
        new: wrap(device.clone()),
        changed,
    }
}

/// Sparse merge into a non-adoptable object (liveviews, keyrings, users).
fn update_object<T>(
    map: &mut HashMap<String, T>,
    wrap: fn(T) -> ProtectObject,
    id: &str,
    data: &Value,
    cache: &mut ConvertCache,
) -> DeviceUpdate
where
    T: Identified + Clone + Serialize + DeserializeOwned,
{
    let Some(object) = map.get_mut(id) else {
        return DeviceUpdate::Missing;
    };
    let old = object.clone();
    let changed = match update_in_place(object, data, cache) {
        Ok(changed) => changed,
        Err(err) => return DeviceUpdate::Failed(err),
    };
    if changed.is_empty() {
        return DeviceUpdate::NoChange;
    }
    DeviceUpdate::Changed {
        old: wrap(old),
        new: wrap(object.clone()),
        changed,
    }
}
