//! Echo suppression for self-initiated writes.
//!
//! When the client PATCHes a device, the controller echoes the change back
//! over the WebSocket. Entries registered here let the diff engine swallow
//! that echo instead of notifying subscribers about their own write.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Wire paths the controller owns outright. These change on the server's
/// schedule even when they ride along in an echo, so they are never
/// suppressed.
const SERVER_DERIVED_PREFIXES: &[&str] = &[
    "last_seen",
    "up_since",
    "uptime",
    "connected_since",
    "state",
    "stats",
    "storage_stats",
    "system_info",
    "phy_rate",
    "wifi_connection_state",
];

/// Short-lived set of `(device-id, field-path)` entries with a TTL.
///
/// Entries are consumed on first hit; stale entries are dropped lazily on
/// access so no background sweeper is needed.
#[derive(Debug)]
pub struct IgnoreTable {
    ttl: Duration,
    entries: HashMap<(String, String), Instant>,
}

impl IgnoreTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Registers a pending echo for a single field path (snake_case,
    /// dot separated). Server-derived paths are refused.
    pub fn register(&mut self, device_id: &str, path: &str) {
        if Self::is_server_derived(path) {
            return;
        }
        self.entries
            .insert((device_id.to_string(), path.to_string()), Instant::now());
    }

    /// Consumes a matching entry, returning whether the echo should be
    /// suppressed. Expired entries are removed but do not match.
    pub fn consume(&mut self, device_id: &str, path: &str) -> bool {
        if Self::is_server_derived(path) {
            return false;
        }
        let key = (device_id.to_string(), path.to_string());
        match self.entries.remove(&key) {
            Some(registered) => registered.elapsed() <= self.ttl,
            None => false,
        }
    }

    /// Drops every entry older than the TTL.
    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, registered| registered.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a field path is on the server-derived allow-list.
    pub fn is_server_derived(path: &str) -> bool {
        let head = path.split('.').next().unwrap_or(path);
        SERVER_DERIVED_PREFIXES.contains(&head)
    }
}
