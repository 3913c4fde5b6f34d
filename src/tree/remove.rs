//! Logical deletion.
//!
//! Removal is a leaf-only rewrite: the key slot and its value disappear from
//! a fresh copy of the leaf, which is installed under that leaf's lock.
//! Nodes are never merged and the tree never shrinks; what deletion leaves
//! behind is sparse leaves that only a rebuild would reclaim.

use std::cmp::Ordering;

use crate::error::Result;
use crate::node::{find_first_ge, slot_remove, LeafContent, NodeContent};
use crate::store::{RecordStore, NULL_RECID};

use super::BlinkTree;

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    /// Remove the entry under `key`; returns its value.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        self.remove_inner(key, |_| true)
    }

    /// Remove every entry. Not atomic: concurrent readers may observe any
    /// intermediate state.
    pub fn clear(&self) -> Result<()> {
        for entry in self.iter() {
            let (key, _) = entry?;
            self.remove(&key)?;
        }
        Ok(())
    }

    fn remove_inner(&self, key: &K, accept: impl Fn(&Option<V>) -> bool) -> Result<Option<V>> {
        let removed = {
            let _sweep = self.locks.sweep_guard();
            self.remove_locked(key, accept)?
        };
        self.locks.assert_none_held();

        if let Some(old) = &removed {
            self.notify(key, Some(old), None);
        }
        Ok(removed)
    }

    fn remove_locked(&self, key: &K, accept: impl Fn(&Option<V>) -> bool) -> Result<Option<V>> {
        let (mut current, _) = self.descend_to_leaf(key)?;

        loop {
            self.locks.lock(current);
            let leaf = self.load_leaf(current)?;
            let pos = find_first_ge(&*self.order, &leaf.keys, key);

            // the trailing slot is the high-key separator, never an entry
            let hit = pos < leaf.keys.len() - 1
                && leaf.keys[pos]
                    .as_ref()
                    .is_some_and(|found| self.order.cmp(key, found) == Ordering::Equal);

            if hit {
                let old = self.expand(&leaf.vals[pos - 1])?;
                if !accept(&old) {
                    self.locks.unlock(current);
                    return Ok(None);
                }

                let keys = slot_remove(&leaf.keys, pos);
                let vals = slot_remove(&leaf.vals, pos - 1);
                let updated = NodeContent::Leaf(LeafContent::new(keys, vals, leaf.next));
                self.install(current, &updated)?;
                self.locks.unlock(current);
                return Ok(old);
            }

            self.locks.unlock(current);

            // the key may have moved right under a concurrent split
            let beyond = leaf.keys[leaf.keys.len() - 1]
                .as_ref()
                .is_some_and(|high| self.order.cmp(key, high) == Ordering::Greater);
            if !beyond {
                return Ok(None);
            }
            let mut walker = leaf;
            loop {
                if find_first_ge(&*self.order, &walker.keys, key) < walker.keys.len() {
                    break;
                }
                if walker.next == NULL_RECID {
                    return Ok(None);
                }
                current = walker.next;
                walker = self.load_leaf(current)?;
            }
        }
    }
}

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    S: RecordStore,
{
    /// Remove the entry under `key` only when its value equals `expected`.
    /// Returns whether the removal happened.
    pub fn remove_if(&self, key: &K, expected: &V) -> Result<bool> {
        Ok(self
            .remove_inner(key, |old| old.as_ref() == Some(expected))?
            .is_some())
    }

    /// Remove and return the smallest entry, retrying when a concurrent
    /// writer races the removal.
    pub fn poll_first_entry(&self) -> Result<Option<(K, V)>> {
        loop {
            let Some((key, value)) = self.first_entry()? else {
                return Ok(None);
            };
            if self.remove_if(&key, &value)? {
                return Ok(Some((key, value)));
            }
        }
    }

    /// Remove and return the largest entry, retrying when a concurrent
    /// writer races the removal.
    pub fn poll_last_entry(&self) -> Result<Option<(K, V)>> {
        loop {
            let Some((key, value)) = self.last_entry()? else {
                return Ok(None);
            };
            if self.remove_if(&key, &value)? {
                return Ok(Some((key, value)));
            }
        }
    }
}
