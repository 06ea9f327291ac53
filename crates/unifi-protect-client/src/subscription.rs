//! Fan-out of applied packets to subscriber callbacks.
//!
//! Callbacks run synchronously on the reader task, in apply order, so they
//! must not block; long-running work belongs on a channel the subscriber
//! drains elsewhere. The list is append-under-lock with copy-on-iterate
//! semantics: emitting never holds the lock across user code.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use unifi_protect_data::SyncMessage;

/// One notification delivered to message subscribers.
#[derive(Debug, Clone)]
pub enum ProtectNotification {
    /// An applied packet, with the raw frame bytes when one existed (the
    /// ring-reset timer emits synthetic messages without a frame).
    Message {
        message: Arc<SyncMessage>,
        raw: Option<Arc<Vec<u8>>>,
    },
    /// The graph was replaced wholesale (explicit refresh or stream
    /// divergence). Everything previously read should be re-read; this
    /// precedes any notification for the new graph.
    Reset,
}

type Callback = Arc<dyn Fn(&ProtectNotification) + Send + Sync>;

#[derive(Default)]
struct Registry {
    entries: Vec<(u64, Callback)>,
}

/// Subscriber list shared between the client handle and the reader task.
#[derive(Clone, Default)]
pub(crate) struct Subscribers {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl Subscribers {
    pub(crate) fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProtectNotification) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .lock()
            .expect("subscriber registry poisoned")
            .entries
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invokes every subscriber with the notification, in subscribe order.
    pub(crate) fn emit(&self, notification: &ProtectNotification) {
        let callbacks: Vec<Callback> = {
            let registry = self.registry.lock().expect("subscriber registry poisoned");
            registry.entries.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in callbacks {
            callback(notification);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.registry
            .lock()
            .expect("subscriber registry poisoned")
            .entries
            .len()
    }
}

/// Handle returned at subscribe time. `unsubscribe` is idempotent; dropping
/// the handle without calling it leaves the subscription active for the
/// lifetime of the client.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let Ok(mut registry) = registry.lock() else {
            warn!("subscriber registry poisoned during unsubscribe");
            return;
        };
        registry.entries.retain(|(id, _)| *id != self.id);
    }
}
