//! Modification listeners.
//!
//! Listeners observe every committed mutation as `(key, old, new)`:
//! insert is `(k, None, Some(v))`, overwrite `(k, Some(old), Some(new))`,
//! delete `(k, Some(old), None)`. Notification happens after the node
//! content is installed and the node lock released, so a listener can never
//! extend the locked region; an error raised by a listener reaches the
//! caller with the mutation already committed.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Observer of committed tree mutations.
pub trait ModListener<K, V>: Send + Sync {
    /// Called once per committed mutation.
    fn update(&self, key: &K, old: Option<&V>, new: Option<&V>);
}

// ============================================================================
//  Registry
// ============================================================================

/// Listener registry with copy-out reads.
///
/// `notify` clones the listener list before walking it, so registration
/// during notification never deadlocks.
pub(crate) struct ListenerRegistry<K, V> {
    listeners: RwLock<Vec<Arc<dyn ModListener<K, V>>>>,
}

impl<K, V> ListenerRegistry<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn ModListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    /// Remove a listener by identity. Returns whether it was registered.
    pub(crate) fn remove(&self, listener: &Arc<dyn ModListener<K, V>>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub(crate) fn notify(&self, key: &K, old: Option<&V>, new: Option<&V>) {
        let snapshot: Vec<_> = self.listeners.read().clone();
        for listener in snapshot {
            listener.update(key, old, new);
        }
    }
}

// ============================================================================
//  SizeCounter
// ============================================================================

/// O(1) size tracking as a listener over an atomic counter.
///
/// Keeping the counter adds a small cost to every insert and delete; without
/// it, size queries traverse the leaf chain.
#[derive(Debug, Default)]
pub struct SizeCounter {
    count: AtomicI64,
}

impl SizeCounter {
    /// New counter starting at `initial`.
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self {
            count: AtomicI64::new(initial),
        }
    }

    /// Current entry count.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }
}

impl<K, V> ModListener<K, V> for SizeCounter {
    fn update(&self, _key: &K, old: Option<&V>, new: Option<&V>) {
        match (old, new) {
            (None, Some(_)) => {
                self.count.fetch_add(1, Ordering::AcqRel);
            }
            (Some(_), None) => {
                self.count.fetch_sub(1, Ordering::AcqRel);
            }
            // overwrite or spurious notification: size unchanged
            _ => {}
        }
    }
}
