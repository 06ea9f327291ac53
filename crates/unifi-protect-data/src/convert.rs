//! Wire-form conversion helpers.
//!
//! The controller speaks camelCase JSON and occasionally ships the same key
//! in both camelCase and snake_case during firmware transitions. Everything
//! that crosses the wire boundary goes through this module: key
//! canonicalization, MAC normalization, sparse-patch merging, and minimal
//! diff computation for the mutation path.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Memoization cache for hot-path conversions.
///
/// The same keys and timestamps repeat on nearly every packet, so case
/// conversion and millisecond parsing are cached per engine instance
/// instead of recomputed. Owned by the engine, never global.
#[derive(Debug, Default)]
pub struct ConvertCache {
    snake: HashMap<String, String>,
    camel: HashMap<String, String>,
    timestamps: HashMap<i64, DateTime<Utc>>,
}

const CACHE_MAX_ENTRIES: usize = 4096;

impl ConvertCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snake(&mut self, key: &str) -> String {
        if let Some(hit) = self.snake.get(key) {
            return hit.clone();
        }
        let converted = to_snake_case(key);
        if self.snake.len() < CACHE_MAX_ENTRIES {
            self.snake.insert(key.to_string(), converted.clone());
        }
        converted
    }

    pub fn camel(&mut self, key: &str) -> String {
        if let Some(hit) = self.camel.get(key) {
            return hit.clone();
        }
        let converted = to_camel_case(key);
        if self.camel.len() < CACHE_MAX_ENTRIES {
            self.camel.insert(key.to_string(), converted.clone());
        }
        converted
    }

    pub fn timestamp(&mut self, millis: i64) -> DateTime<Utc> {
        if let Some(hit) = self.timestamps.get(&millis) {
            return *hit;
        }
        let parsed = from_js_time(millis);
        if self.timestamps.len() < CACHE_MAX_ENTRIES {
            self.timestamps.insert(millis, parsed);
        }
        parsed
    }
}

/// Converts a camelCase wire key to snake_case.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_ascii_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Converts a snake_case key back to the camelCase wire form.
pub fn to_camel_case(name: &str) -> String {
    if !name.contains('_') {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Milliseconds-since-epoch to an instant.
pub fn from_js_time(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

/// Instant to milliseconds-since-epoch.
pub fn to_js_time(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Normalizes a MAC to lowercase hex without separators.
///
/// Exactly twelve hex digits are required; anything else is rejected.
pub fn normalize_mac(mac: &str) -> Result<String> {
    let cleaned: String = mac
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '_' | '.'))
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if cleaned.len() != 12 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidMac(mac.to_string()));
    }
    Ok(cleaned)
}

/// Serde deserializer for MAC fields; normalizes on ingest.
pub fn de_mac<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    normalize_mac(&raw).map_err(serde::de::Error::custom)
}

/// Canonicalizes the keys of a wire object in place.
///
/// snake_case keys are folded into their camelCase form; when the
/// controller ships both forms of the same key, the snake_case value wins
/// and the camelCase duplicate is discarded. Recurses into nested objects
/// and arrays.
pub fn canonicalize_keys(value: &mut Value, cache: &mut ConvertCache) {
    match value {
        Value::Object(map) => {
            let snake_keys: Vec<String> = map
                .keys()
                .filter(|k| k.contains('_'))
                .cloned()
                .collect();
            for key in snake_keys {
                let camel = cache.camel(&key);
                if camel == key {
                    continue;
                }
                if let Some(snake_value) = map.remove(&key) {
                    map.insert(camel, snake_value);
                }
            }
            for nested in map.values_mut() {
                canonicalize_keys(nested, cache);
            }
        }
        Value::Array(items) => {
            for item in items {
                canonicalize_keys(item, cache);
            }
        }
        _ => {}
    }
}

/// Computes the minimal patch that turns `orig` into `new`.
///
/// Nested objects are recursed so only changed leaves are emitted; arrays
/// and scalars are compared wholesale. Keys present only in `orig` are left
/// alone (the controller treats absent keys as unchanged).
pub fn value_diff(orig: &Value, new: &Value) -> Value {
    match (orig, new) {
        (Value::Object(orig_map), Value::Object(new_map)) => {
            let mut out = Map::new();
            for (key, new_value) in new_map {
                match orig_map.get(key) {
                    Some(orig_value) if orig_value == new_value => {}
                    Some(orig_value @ Value::Object(_)) if new_value.is_object() => {
                        let nested = value_diff(orig_value, new_value);
                        if nested.as_object().is_some_and(|m| !m.is_empty()) {
                            out.insert(key.clone(), nested);
                        }
                    }
                    _ => {
                        out.insert(key.clone(), new_value.clone());
                    }
                }
            }
            Value::Object(out)
        }
        _ => new.clone(),
    }
}

/// Merges a canonicalized sparse patch into a serialized object, recording
/// the snake_case dotted path of every leaf that actually changed.
pub fn merge_patch(
    dest: &mut Value,
    patch: &Value,
    prefix: &str,
    changed: &mut BTreeSet<String>,
    cache: &mut ConvertCache,
) {
    let (Value::Object(dest_map), Value::Object(patch_map)) = (&mut *dest, patch) else {
        if dest != patch {
            *dest = patch.clone();
            if !prefix.is_empty() {
                changed.insert(prefix.to_string());
            }
        }
        return;
    };

    for (key, patch_value) in patch_map {
        let snake_key = cache.snake(key);
        let path = if prefix.is_empty() {
            snake_key
        } else {
            format!("{prefix}.{snake_key}")
        };

        match dest_map.get_mut(key) {
            Some(dest_value @ Value::Object(_)) if patch_value.is_object() => {
                merge_patch(dest_value, patch_value, &path, changed, cache);
            }
            Some(dest_value) => {
                if dest_value != patch_value {
                    *dest_value = patch_value.clone();
                    changed.insert(path);
                }
            }
            None => {
                dest_map.insert(key.clone(), patch_value.clone());
                changed.insert(path);
            }
        }
    }
}

/// Merges a sparse wire partial into a typed object, returning the set of
/// changed leaf paths (snake_case, dot separated). The object is only
/// rebuilt when something actually changed.
pub fn update_in_place<T>(obj: &mut T, partial: &Value, cache: &mut ConvertCache) -> Result<BTreeSet<String>>
where
    T: Serialize + DeserializeOwned,
{
    let mut serialized = serde_json::to_value(&*obj)?;
    let mut patch = partial.clone();
    canonicalize_keys(&mut patch, cache);

    let mut changed = BTreeSet::new();
    merge_patch(&mut serialized, &patch, "", &mut changed, cache);
    if changed.is_empty() {
        return Ok(changed);
    }

    *obj = serde_json::from_value(serialized)?;
    Ok(changed)
}

/// Serializes only the listed top-level wire fields of an object.
///
/// Used by the mutation path to build minimal PATCH bodies.
pub fn to_wire<T: Serialize>(obj: &T, fields: &[&str]) -> Result<Vec<u8>> {
    let serialized = serde_json::to_value(obj)?;
    let Value::Object(map) = serialized else {
        return Err(Error::InvalidBootstrap(
            "cannot serialize non-object to wire form".to_string(),
        ));
    };
    let filtered: Map<String, Value> = map
        .into_iter()
        .filter(|(key, _)| fields.contains(&key.as_str()))
        .collect();
    Ok(serde_json::to_vec(&Value::Object(filtered))?)
}

/// Collects the snake_case dotted leaf paths of a patch body.
pub fn leaf_paths(patch: &Value, cache: &mut ConvertCache) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_leaf_paths(patch, "", &mut out, cache);
    out
}

fn collect_leaf_paths(value: &Value, prefix: &str, out: &mut BTreeSet<String>, cache: &mut ConvertCache) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                let snake_key = cache.snake(key);
                let path = if prefix.is_empty() {
                    snake_key
                } else {
                    format!("{prefix}.{snake_key}")
                };
                collect_leaf_paths(nested, &path, out, cache);
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("lastMotion"), "last_motion");
        assert_eq!(to_snake_case("isMotionDetected"), "is_motion_detected");
        assert_eq!(to_snake_case("rtspAlias"), "rtsp_alias");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn camel_case_conversion() {
        assert_eq!(to_camel_case("last_motion"), "lastMotion");
        assert_eq!(to_camel_case("is_motion_detected"), "isMotionDetected");
        assert_eq!(to_camel_case("plain"), "plain");
    }

    #[test]
    fn mac_normalization() {
        assert_eq!(
            normalize_mac("AA:BB:CC:DD:EE:FF").unwrap(),
            "aabbccddeeff"
        );
        assert_eq!(
            normalize_mac("aa-bb-cc-dd-ee-ff").unwrap(),
            "aabbccddeeff"
        );
        assert!(normalize_mac("aa:bb:cc").is_err());
        assert!(normalize_mac("zzbbccddeeff").is_err());
    }

    #[test]
    fn duplicate_keys_snake_wins() {
        let mut cache = ConvertCache::new();
        let mut value = json!({
            "isConnected": false,
            "is_connected": true,
            "nested": { "phyRate": 10, "phy_rate": 20 }
        });
        canonicalize_keys(&mut value, &mut cache);
        assert_eq!(value["isConnected"], json!(true));
        assert_eq!(value["nested"]["phyRate"], json!(20));
        assert!(value.get("is_connected").is_none());
    }

    #[test]
    fn value_diff_emits_only_changed_leaves() {
        let orig = json!({
            "name": "Front Door",
            "recordingSettings": { "mode": "never", "prePaddingSecs": 3 }
        });
        let new = json!({
            "name": "Front Door",
            "recordingSettings": { "mode": "always", "prePaddingSecs": 3 }
        });
        let diff = value_diff(&orig, &new);
        assert_eq!(diff, json!({ "recordingSettings": { "mode": "always" } }));
    }

    #[test]
    fn merge_patch_records_changed_paths() {
        let mut cache = ConvertCache::new();
        let mut dest = json!({
            "name": "Cam",
            "micVolume": 100,
            "recordingSettings": { "mode": "never" }
        });
        let patch = json!({
            "micVolume": 50,
            "recordingSettings": { "mode": "always" }
        });
        let mut changed = BTreeSet::new();
        merge_patch(&mut dest, &patch, "", &mut changed, &mut cache);

        assert_eq!(dest["micVolume"], json!(50));
        assert_eq!(dest["recordingSettings"]["mode"], json!("always"));
        assert!(changed.contains("mic_volume"));
        assert!(changed.contains("recording_settings.mode"));
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn merge_patch_is_noop_for_equal_values() {
        let mut cache = ConvertCache::new();
        let mut dest = json!({ "state": "CONNECTED" });
        let patch = json!({ "state": "CONNECTED" });
        let mut changed = BTreeSet::new();
        merge_patch(&mut dest, &patch, "", &mut changed, &mut cache);
        assert!(changed.is_empty());
    }

    #[test]
    fn to_wire_filters_fields() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Partial {
            name: String,
            mic_volume: u8,
            state: String,
        }
        let obj = Partial {
            name: "Cam".into(),
            mic_volume: 80,
            state: "CONNECTED".into(),
        };
        let bytes = to_wire(&obj, &["micVolume"]).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({ "micVolume": 80 }));
    }

    #[test]
    fn timestamp_cache_round_trips() {
        let mut cache = ConvertCache::new();
        let parsed = cache.timestamp(1_700_000_000_000);
        assert_eq!(to_js_time(parsed), 1_700_000_000_000);
        assert_eq!(cache.timestamp(1_700_000_000_000), parsed);
    }

    #[test]
    fn leaf_paths_are_dotted_snake_case() {
        let mut cache = ConvertCache::new();
        let patch = json!({
            "recordingSettings": { "mode": "always" },
            "name": "Cam"
        });
        let paths = leaf_paths(&patch, &mut cache);
        assert!(paths.contains("recording_settings.mode"));
        assert!(paths.contains("name"));
    }
}
