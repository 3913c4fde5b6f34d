//! Record store abstraction and the in-memory backend.
//!
//! The tree persists nodes through [`RecordStore`]: an opaque mapping from
//! integer recids to records, encoded through a [`RecordCodec`]. Any backend
//! satisfying the contract works; durability is whatever the backend
//! provides. [`MemStore`] is the heap-backed reference implementation used
//! by tests, benches, and pure in-memory maps.
//!
//! Records are immutable byte snapshots: `update` replaces the whole record,
//! so a concurrent `get` observes either the old or the new bytes, never a
//! splice. That atomicity is what lets tree readers run without node locks.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::RecordCodec;
use crate::error::{Result, TreeError};
use crate::pack::ByteReader;

/// Opaque identifier of a stored record. `0` is reserved as the null recid.
pub type Recid = u64;

/// The null recid: no record, end of a sibling chain.
pub const NULL_RECID: Recid = 0;

/// Recid reserved for a catalog root pointer when the tree backs a catalog.
pub const CATALOG_RECID: Recid = 1;

// ============================================================================
//  RecordStore contract
// ============================================================================

/// Storage engine the tree persists nodes into.
///
/// Implementations must allow concurrent calls from many threads. `get`
/// after a completed `update` of the same recid returns the new record
/// (happens-before through whatever synchronization the backend uses).
pub trait RecordStore: Send + Sync {
    /// Fetch and decode the record under `recid`.
    fn get<T>(&self, recid: Recid, codec: &dyn RecordCodec<T>) -> Result<T>;

    /// Encode `value` as a new record and return its recid.
    fn put<T>(&self, value: &T, codec: &dyn RecordCodec<T>) -> Result<Recid>;

    /// Replace the record under `recid` with the encoding of `value`.
    fn update<T>(&self, recid: Recid, value: &T, codec: &dyn RecordCodec<T>) -> Result<()>;

    /// Make all preceding writes durable (backend-defined; may be a no-op).
    fn commit(&self) -> Result<()>;

    /// Release backend resources. Further calls may fail.
    fn close(&self) -> Result<()>;

    /// Whether writes are rejected.
    fn is_read_only(&self) -> bool;
}

// ============================================================================
//  MemStore
// ============================================================================

/// Heap-backed record store.
///
/// Records live as `Arc<[u8]>` snapshots in a slot vector; recid = slot
/// index + 1, with slot 0 pre-allocated for [`CATALOG_RECID`]. `commit` is
/// a no-op, `close` drops all records.
pub struct MemStore {
    slots: RwLock<Vec<Option<Arc<[u8]>>>>,
    read_only: bool,
}

impl MemStore {
    /// Create an empty store with the catalog slot reserved.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(vec![None]),
            read_only: false,
        }
    }

    /// Number of allocated records (including empty reserved slots).
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.slots.read().len()
    }

    fn encode<T>(value: &T, codec: &dyn RecordCodec<T>) -> Result<Arc<[u8]>> {
        let mut buf = Vec::new();
        codec.serialize(&mut buf, value)?;
        Ok(buf.into())
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(TreeError::ReadOnly);
        }
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemStore {
    fn get<T>(&self, recid: Recid, codec: &dyn RecordCodec<T>) -> Result<T> {
        let bytes = {
            let slots = self.slots.read();
            let idx = usize::try_from(recid.wrapping_sub(1))
                .map_err(|_| TreeError::RecordNotFound(recid))?;
            if recid == NULL_RECID || idx >= slots.len() {
                return Err(TreeError::RecordNotFound(recid));
            }
            slots[idx]
                .as_ref()
                .cloned()
                .ok_or(TreeError::RecordNotFound(recid))?
        };
        codec.deserialize(&mut ByteReader::new(&bytes))
    }

    fn put<T>(&self, value: &T, codec: &dyn RecordCodec<T>) -> Result<Recid> {
        self.check_writable()?;
        let record = Self::encode(value, codec)?;
        let mut slots = self.slots.write();
        slots.push(Some(record));
        Ok(slots.len() as Recid)
    }

    fn update<T>(&self, recid: Recid, value: &T, codec: &dyn RecordCodec<T>) -> Result<()> {
        self.check_writable()?;
        let record = Self::encode(value, codec)?;
        let mut slots = self.slots.write();
        let idx = usize::try_from(recid.wrapping_sub(1))
            .map_err(|_| TreeError::RecordNotFound(recid))?;
        if recid == NULL_RECID || idx >= slots.len() {
            return Err(TreeError::RecordNotFound(recid));
        }
        slots[idx] = Some(record);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.slots.write().clear();
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecidCodec;

    #[test]
    fn put_then_get() {
        let store = MemStore::new();
        let recid = store.put(&42u64, &RecidCodec).unwrap();
        assert!(recid > CATALOG_RECID);
        assert_eq!(store.get(recid, &RecidCodec).unwrap(), 42);
    }

    #[test]
    fn update_replaces() {
        let store = MemStore::new();
        let recid = store.put(&1u64, &RecidCodec).unwrap();
        store.update(recid, &2u64, &RecidCodec).unwrap();
        assert_eq!(store.get(recid, &RecidCodec).unwrap(), 2);
    }

    #[test]
    fn catalog_slot_is_reserved_and_updatable() {
        let store = MemStore::new();
        assert_eq!(
            store.get(CATALOG_RECID, &RecidCodec),
            Err(TreeError::RecordNotFound(CATALOG_RECID))
        );
        store.update(CATALOG_RECID, &9u64, &RecidCodec).unwrap();
        assert_eq!(store.get(CATALOG_RECID, &RecidCodec).unwrap(), 9);
    }

    #[test]
    fn null_and_unknown_recids_are_not_found() {
        let store = MemStore::new();
        assert_eq!(
            store.get(NULL_RECID, &RecidCodec),
            Err(TreeError::RecordNotFound(NULL_RECID))
        );
        assert_eq!(
            store.get(999, &RecidCodec),
            Err(TreeError::RecordNotFound(999))
        );
    }
}
