//! Per-node lock table.
//!
//! Node-level mutexes live in one process-wide map keyed by recid. A writer
//! holds at most two entries at a time (the node it is rewriting and, during
//! root promotion, the root-reference cell); readers never touch the table.
//!
//! # Write protocol
//!
//! ```text
//! 1. sweep = locks.sweep_guard()        // arm the failure sweep
//! 2. locks.lock(recid)                  // bounded spin + backoff parking
//! 3. re-read node, build new content
//! 4. store.update(recid, new_content)   // install
//! 5. locks.unlock(recid)
//! 6. drop(sweep)                        // no-op on the success path
//! ```
//!
//! If step 3 or 4 errors or panics (application codecs and comparators run
//! inside them), the sweep guard's drop removes every entry owned by the
//! current thread, so the tree stays usable.

use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use crate::store::Recid;

/// Spins before each lock attempt falls back to parking.
const SPIN_LIMIT: u32 = 64;

/// Park interval between contended lock attempts.
const PARK_NANOS: u64 = 10;

// ============================================================================
//  LockTable
// ============================================================================

/// Process-wide table of node locks, keyed by recid.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    owners: Mutex<HashMap<Recid, ThreadId>>,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `recid`, spinning with backoff parking until the
    /// current owner releases it.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the current thread already owns the lock;
    /// a mutator re-locking a node it holds is a bug, not contention.
    pub(crate) fn lock(&self, recid: Recid) {
        let me = thread::current().id();
        let mut spins = 0u32;
        loop {
            {
                let mut owners = self.owners.lock();
                match owners.get(&recid) {
                    None => {
                        owners.insert(recid, me);
                        return;
                    }
                    Some(owner) => {
                        debug_assert!(*owner != me, "node {recid} already locked by this thread");
                    }
                }
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                thread::park_timeout(Duration::from_nanos(PARK_NANOS));
            }
        }
    }

    /// Release the lock for `recid`.
    ///
    /// Ownership by the current thread is asserted in debug builds; the
    /// entry is removed regardless so a sweep cannot wedge the table.
    pub(crate) fn unlock(&self, recid: Recid) {
        let prev = self.owners.lock().remove(&recid);
        debug_assert_eq!(
            prev,
            Some(thread::current().id()),
            "unlocked node {recid} not owned by this thread"
        );
    }

    /// Failure sweep: release every lock owned by the current thread.
    pub(crate) fn unlock_all(&self) {
        let me = thread::current().id();
        self.owners.lock().retain(|_, owner| *owner != me);
    }

    /// Whether the current thread owns the lock for `recid`.
    #[cfg(debug_assertions)]
    pub(crate) fn held_by_current(&self, recid: Recid) -> bool {
        self.owners.lock().get(&recid) == Some(&thread::current().id())
    }

    /// Integrity assertion: the current thread owns nothing.
    pub(crate) fn assert_none_held(&self) {
        if cfg!(debug_assertions) {
            let me = thread::current().id();
            let owners = self.owners.lock();
            debug_assert!(
                !owners.values().any(|owner| *owner == me),
                "thread still owns node locks after operation"
            );
        }
    }

    /// Arm the failure sweep for the extent of a mutator.
    pub(crate) fn sweep_guard(&self) -> SweepGuard<'_> {
        SweepGuard { table: self }
    }
}

// ============================================================================
//  SweepGuard
// ============================================================================

/// RAII failure sweep.
///
/// On drop (normal return, `?` propagation, or unwind out of an
/// application-supplied codec) releases every lock the current thread still
/// owns. On the success path all locks were already released one by one and
/// the sweep is a no-op.
#[must_use = "the sweep must outlive the locked region"]
pub(crate) struct SweepGuard<'a> {
    table: &'a LockTable,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.table.unlock_all();
    }
}
