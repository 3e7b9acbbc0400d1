//! Subscriber registry for collection change notifications.

use ferrydb_protocol::Update;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Callback = Arc<dyn Fn(&[Update]) + Send + Sync>;

/// A registration list of update callbacks.
///
/// Notification iterates over a snapshot of the list, so a callback may
/// unsubscribe itself (or any other subscriber) while being notified.
pub(crate) struct Subscribers {
    entries: Arc<RwLock<Vec<(u64, Callback)>>>,
    next_id: AtomicU64,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn subscribe(&self, callback: Callback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, callback));
        Subscription {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    pub(crate) fn notify(&self, updates: &[Update]) {
        if updates.is_empty() {
            return;
        }
        let snapshot: Vec<Callback> = self
            .entries
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(updates);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Handle returned by `subscribe`; cancels the registration on demand.
///
/// Dropping the handle without calling [`Subscription::unsubscribe`]
/// leaves the subscription active for the life of the collection.
pub struct Subscription {
    id: u64,
    entries: Weak<RwLock<Vec<(u64, Callback)>>>,
}

impl Subscription {
    /// Removes this subscriber from the registration list.
    ///
    /// Safe to call from inside a notification callback.
    pub fn unsubscribe(self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.write().retain(|(id, _)| *id != self.id);
        }
    }
}
