//! The bootstrap object graph.
//!
//! A `Bootstrap` is a snapshot of the controller at an instant: the NVR
//! record plus a keyed map per device kind. The wire form carries devices
//! as arrays; in memory they are maps keyed by the 24-hex-digit object id.
//! The graph is single-writer: only the reader task mutates it, and a full
//! re-fetch replaces it wholesale.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::convert::{normalize_mac, ConvertCache};
use crate::devices::{Bridge, Camera, Chime, Doorlock, Light, ProtectDevice, Sensor, Viewer};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::nvr::{Keyring, Liveview, Nvr, UlpUser};
use crate::types::ModelType;

/// Objects addressable by id inside a bootstrap.
pub trait Identified {
    fn object_id(&self) -> &str;
}

macro_rules! identified {
    ($($kind:ty),* $(,)?) => {
        $(impl Identified for $kind {
            fn object_id(&self) -> &str {
                &self.common.id
            }
        })*
    };
}

identified!(Camera, Light, Sensor, Viewer, Chime, Doorlock, Bridge);

impl Identified for Liveview {
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl Identified for Keyring {
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl Identified for UlpUser {
    fn object_id(&self) -> &str {
        &self.id
    }
}

/// Wire arrays become id-keyed maps and back.
mod keyed_list {
    use super::Identified;
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S, T>(map: &HashMap<String, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<HashMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Identified,
    {
        let items: Vec<T> = Vec::deserialize(deserializer)?;
        Ok(items
            .into_iter()
            .map(|item| (item.object_id().to_string(), item))
            .collect())
    }
}

/// A device snapshot handed to subscribers. Devices in the graph are owned
/// by the bootstrap; messages carry detached clones.
#[derive(Debug, Clone)]
pub enum ProtectObject {
    Camera(Camera),
    Light(Light),
    Sensor(Sensor),
    Viewer(Viewer),
    Chime(Chime),
    Doorlock(Doorlock),
    Bridge(Bridge),
    Liveview(Liveview),
    Keyring(Keyring),
    UlpUser(UlpUser),
    Nvr(Nvr),
    Event(Event),
}

impl ProtectObject {
    pub fn model(&self) -> ModelType {
        match self {
            ProtectObject::Camera(_) => ModelType::Camera,
            ProtectObject::Light(_) => ModelType::Light,
            ProtectObject::Sensor(_) => ModelType::Sensor,
            ProtectObject::Viewer(_) => ModelType::Viewer,
            ProtectObject::Chime(_) => ModelType::Chime,
            ProtectObject::Doorlock(_) => ModelType::Doorlock,
            ProtectObject::Bridge(_) => ModelType::Bridge,
            ProtectObject::Liveview(_) => ModelType::Liveview,
            ProtectObject::Keyring(_) => ModelType::Keyring,
            ProtectObject::UlpUser(_) => ModelType::UlpUser,
            ProtectObject::Nvr(_) => ModelType::Nvr,
            ProtectObject::Event(_) => ModelType::Event,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ProtectObject::Camera(o) => &o.common.id,
            ProtectObject::Light(o) => &o.common.id,
            ProtectObject::Sensor(o) => &o.common.id,
            ProtectObject::Viewer(o) => &o.common.id,
            ProtectObject::Chime(o) => &o.common.id,
            ProtectObject::Doorlock(o) => &o.common.id,
            ProtectObject::Bridge(o) => &o.common.id,
            ProtectObject::Liveview(o) => &o.id,
            ProtectObject::Keyring(o) => &o.id,
            ProtectObject::UlpUser(o) => &o.id,
            ProtectObject::Nvr(o) => &o.id,
            ProtectObject::Event(o) => &o.id,
        }
    }

    pub fn as_camera(&self) -> Option<&Camera> {
        match self {
            ProtectObject::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            ProtectObject::Event(event) => Some(event),
            _ => None,
        }
    }
}

/// Upper bound on the recent-events map; beyond this the oldest entries
/// fall out regardless of age.
pub const MAX_EVENT_HISTORY: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    #[serde(default)]
    pub auth_user_id: String,
    #[serde(default)]
    pub access_key: String,
    pub nvr: Nvr,
    #[serde(with = "keyed_list", default)]
    pub cameras: HashMap<String, Camera>,
    #[serde(with = "keyed_list", default)]
    pub lights: HashMap<String, Light>,
    #[serde(with = "keyed_list", default)]
    pub sensors: HashMap<String, Sensor>,
    #[serde(with = "keyed_list", default)]
    pub viewers: HashMap<String, Viewer>,
    #[serde(with = "keyed_list", default)]
    pub chimes: HashMap<String, Chime>,
    #[serde(with = "keyed_list", default)]
    pub doorlocks: HashMap<String, Doorlock>,
    #[serde(with = "keyed_list", default)]
    pub bridges: HashMap<String, Bridge>,
    #[serde(with = "keyed_list", default)]
    pub liveviews: HashMap<String, Liveview>,
    /// Only present on newer controller versions.
    #[serde(with = "keyed_list", default)]
    pub keyrings: HashMap<String, Keyring>,
    #[serde(with = "keyed_list", default)]
    pub ulp_users: HashMap<String, UlpUser>,
    #[serde(default)]
    pub last_update_id: String,

    /// Recent events; not part of the wire bootstrap.
    #[serde(skip)]
    pub events: HashMap<String, Event>,
    #[serde(skip)]
    event_order: VecDeque<String>,
    #[serde(skip)]
    id_lookup: HashMap<String, ModelType>,
    #[serde(skip)]
    mac_lookup: HashMap<String, (ModelType, String)>,

    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl Bootstrap {
    /// Parses the raw `GET /bootstrap` body.
    ///
    /// Parsing is loose: unknown keys land in extras, device lists may be
    /// missing or empty (older controllers have no doorlocks or keyrings),
    /// but the NVR record is required.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let mut value: Value = serde_json::from_slice(data)?;
        if value.get("nvr").is_none() {
            return Err(Error::InvalidBootstrap("missing nvr record".to_string()));
        }
        let mut cache = ConvertCache::new();
        crate::convert::canonicalize_keys(&mut value, &mut cache);

        let mut bootstrap: Bootstrap = serde_json::from_value(value)?;
        bootstrap.rebuild_lookups();
        Ok(bootstrap)
    }

    /// Serializes back to the wire shape (device maps become arrays, local
    /// bookkeeping is dropped).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Rebuilds the id and MAC lookup tables from the device maps.
    pub fn rebuild_lookups(&mut self) {
        self.id_lookup.clear();
        self.mac_lookup.clear();

        fn index<T: ProtectDevice>(
            map: &HashMap<String, T>,
            id_lookup: &mut HashMap<String, ModelType>,
            mac_lookup: &mut HashMap<String, (ModelType, String)>,
        ) {
            for (id, device) in map {
                id_lookup.insert(id.clone(), T::MODEL);
                if !device.mac().is_empty() {
                    mac_lookup.insert(device.mac().to_string(), (T::MODEL, id.clone()));
                }
            }
        }

        index(&self.cameras, &mut self.id_lookup, &mut self.mac_lookup);
        index(&self.lights, &mut self.id_lookup, &mut self.mac_lookup);
        index(&self.sensors, &mut self.id_lookup, &mut self.mac_lookup);
        index(&self.viewers, &mut self.id_lookup, &mut self.mac_lookup);
        index(&self.chimes, &mut self.id_lookup, &mut self.mac_lookup);
        index(&self.doorlocks, &mut self.id_lookup, &mut self.mac_lookup);
        index(&self.bridges, &mut self.id_lookup, &mut self.mac_lookup);
        for id in self.liveviews.keys() {
            self.id_lookup.insert(id.clone(), ModelType::Liveview);
        }
    }

    pub(crate) fn index_device(&mut self, model: ModelType, id: &str, mac: &str) {
        self.id_lookup.insert(id.to_string(), model.clone());
        if !mac.is_empty() {
            self.mac_lookup
                .insert(mac.to_string(), (model, id.to_string()));
        }
    }

    pub(crate) fn unindex_device(&mut self, id: &str, mac: &str) {
        self.id_lookup.remove(id);
        self.mac_lookup.remove(mac);
    }

    /// Model type of an object id, if it is in the graph.
    pub fn model_of(&self, id: &str) -> Option<&ModelType> {
        self.id_lookup.get(id)
    }

    /// Looks up any adoptable device by normalized MAC.
    pub fn device_by_mac(&self, mac: &str) -> Option<ProtectObject> {
        let normalized = normalize_mac(mac).ok()?;
        let (model, id) = self.mac_lookup.get(&normalized)?;
        self.device_by_id(model, id)
    }

    /// Clones a device snapshot out of the graph.
    pub fn device_by_id(&self, model: &ModelType, id: &str) -> Option<ProtectObject> {
        match model {
            ModelType::Camera => self.cameras.get(id).cloned().map(ProtectObject::Camera),
            ModelType::Light => self.lights.get(id).cloned().map(ProtectObject::Light),
            ModelType::Sensor => self.sensors.get(id).cloned().map(ProtectObject::Sensor),
            ModelType::Viewer => self.viewers.get(id).cloned().map(ProtectObject::Viewer),
            ModelType::Chime => self.chimes.get(id).cloned().map(ProtectObject::Chime),
            ModelType::Doorlock => self.doorlocks.get(id).cloned().map(ProtectObject::Doorlock),
            ModelType::Bridge => self.bridges.get(id).cloned().map(ProtectObject::Bridge),
            ModelType::Liveview => self.liveviews.get(id).cloned().map(ProtectObject::Liveview),
            ModelType::Keyring => self.keyrings.get(id).cloned().map(ProtectObject::Keyring),
            ModelType::UlpUser => self.ulp_users.get(id).cloned().map(ProtectObject::UlpUser),
            ModelType::Event => self.events.get(id).cloned().map(ProtectObject::Event),
            ModelType::Nvr => Some(ProtectObject::Nvr(self.nvr.clone())),
            _ => None,
        }
    }

    /// Inserts an event, evicting the oldest once the history cap is hit.
    pub fn insert_event(&mut self, event: Event) {
        let id = event.id.clone();
        if self.events.insert(id.clone(), event).is_none() {
            self.event_order.push_back(id);
        }
        while self.event_order.len() > MAX_EVENT_HISTORY {
            if let Some(oldest) = self.event_order.pop_front() {
                self.events.remove(&oldest);
            }
        }
    }

    /// Drops events whose start precedes the retention cutoff. Active
    /// events (no end yet) are kept regardless of age.
    pub fn prune_events(&mut self, cutoff: chrono::DateTime<chrono::Utc>) {
        let events = &mut self.events;
        self.event_order.retain(|id| {
            let expired = events
                .get(id)
                .is_some_and(|event| !event.is_active() && event.start.is_some_and(|s| s < cutoff));
            if expired {
                events.remove(id);
            }
            !expired
        });
    }

    pub fn remove_event(&mut self, id: &str) -> Option<Event> {
        let removed = self.events.remove(id);
        if removed.is_some() {
            self.event_order.retain(|existing| existing != id);
        }
        removed
    }

    /// Warns about paired-camera references that do not resolve. Unresolved
    /// ids are retained so a later camera add repairs them.
    pub fn check_camera_refs(&self, model: &ModelType, id: &str) {
        match model {
            ModelType::Chime => {
                if let Some(chime) = self.chimes.get(id) {
                    for camera_id in &chime.camera_ids {
                        if !self.cameras.contains_key(camera_id) {
                            warn!(
                                chime = id,
                                camera = camera_id.as_str(),
                                "chime references unknown camera, keeping id"
                            );
                        }
                    }
                }
            }
            ModelType::Light => {
                if let Some(light) = self.lights.get(id) {
                    if let Some(camera_id) = &light.camera_id {
                        if !self.cameras.contains_key(camera_id) {
                            warn!(
                                light = id,
                                camera = camera_id.as_str(),
                                "light bound to unknown camera, keeping id"
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }

    pub fn device_count(&self) -> usize {
        self.cameras.len()
            + self.lights.len()
            + self.sensors.len()
            + self.viewers.len()
            + self.chimes.len()
            + self.doorlocks.len()
            + self.bridges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "authUserId": "u1",
            "accessKey": "key",
            "lastUpdateId": "df8fb8c0-6b2f-4b3a-a5ae-3e5a13cd6688",
            "nvr": { "id": "n1", "mac": "74acb9000000", "name": "UDM Pro" },
            "cameras": [
                { "id": "61ddb66b018e2703e7008c19", "mac": "aabbccddeeff", "state": "CONNECTED" }
            ],
            "lights": [],
            "sensors": [],
            "viewers": [],
            "chimes": [],
            "bridges": [],
            "liveviews": [
                { "id": "lv1", "name": "Main", "layout": 1, "slots": [] }
            ],
            "somethingNewer": { "x": 1 }
        }))
        .unwrap()
    }

    #[test]
    fn parses_and_indexes() {
        let bootstrap = Bootstrap::from_json(&fixture()).unwrap();
        assert_eq!(bootstrap.cameras.len(), 1);
        assert_eq!(
            bootstrap.model_of("61ddb66b018e2703e7008c19"),
            Some(&ModelType::Camera)
        );
        assert!(bootstrap.device_by_mac("AA:BB:CC:DD:EE:FF").is_some());
        assert_eq!(bootstrap.extras.get("somethingNewer"), Some(&json!({"x": 1})));
    }

    #[test]
    fn missing_nvr_is_rejected() {
        let result = Bootstrap::from_json(br#"{"cameras": []}"#);
        assert!(matches!(result, Err(Error::InvalidBootstrap(_))));
    }

    #[test]
    fn missing_optional_lists_are_tolerated() {
        let bootstrap = Bootstrap::from_json(
            br#"{"nvr": {"id": "n1", "mac": "74acb9000000"}, "cameras": [], "lastUpdateId": "x"}"#,
        )
        .unwrap();
        assert!(bootstrap.doorlocks.is_empty());
        assert!(bootstrap.keyrings.is_empty());
    }

    #[test]
    fn round_trips_through_wire_form() {
        let bootstrap = Bootstrap::from_json(&fixture()).unwrap();
        let wire = bootstrap.to_json().unwrap();
        let reparsed = Bootstrap::from_json(&wire).unwrap();

        assert_eq!(reparsed.last_update_id, bootstrap.last_update_id);
        assert_eq!(reparsed.cameras.len(), bootstrap.cameras.len());
        assert_eq!(
            reparsed.cameras["61ddb66b018e2703e7008c19"],
            bootstrap.cameras["61ddb66b018e2703e7008c19"]
        );
        assert_eq!(reparsed.extras, bootstrap.extras);
    }

    #[test]
    fn event_history_is_bounded() {
        let mut bootstrap = Bootstrap::from_json(&fixture()).unwrap();
        for i in 0..(MAX_EVENT_HISTORY + 10) {
            bootstrap.insert_event(Event {
                id: format!("event-{i}"),
                ..Default::default()
            });
        }
        assert_eq!(bootstrap.events.len(), MAX_EVENT_HISTORY);
        assert!(!bootstrap.events.contains_key("event-0"));
        assert!(bootstrap
            .events
            .contains_key(&format!("event-{}", MAX_EVENT_HISTORY + 9)));
    }
}
