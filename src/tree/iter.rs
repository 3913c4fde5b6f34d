//! Weakly consistent iteration.
//!
//! Forward iterators ride the leaf sibling chain: hold the current leaf
//! snapshot and a slot cursor, hop to `next` at the trailing high-key, and
//! skip leaves that hold nothing but their two fences. They observe
//! concurrent mutations that happen to be visible through the snapshots
//! they load, never error on concurrent modification, and never block.
//!
//! Descending iteration composes over `lower_entry` walks, one descent per
//! step, and is slower than ascending.

use std::cmp::Ordering;

use crate::error::{Result, TreeError};
use crate::node::{LeafContent, LeafValue, NodeContent};
use crate::store::{RecordStore, NULL_RECID};

use super::BlinkTree;

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    /// Iterate all entries in ascending key order.
    pub fn iter(&self) -> EntryIter<'_, K, V, S> {
        self.iter_range(None, true, None, false)
    }

    /// Iterate entries within the given bounds in ascending key order.
    pub fn iter_range(
        &self,
        lower: Option<&K>,
        lower_inclusive: bool,
        upper: Option<&K>,
        upper_inclusive: bool,
    ) -> EntryIter<'_, K, V, S> {
        let mut iter = EntryIter {
            tree: self,
            leaf: None,
            pos: 0,
            upper: upper.cloned(),
            upper_inclusive,
            pending_error: None,
        };
        if let Err(e) = iter.position_at(lower, lower_inclusive) {
            iter.pending_error = Some(e);
        }
        iter
    }

    /// Iterate all keys in ascending order.
    pub fn keys(&self) -> KeyIter<'_, K, V, S> {
        KeyIter { inner: self.iter() }
    }

    /// Iterate all values in ascending key order.
    pub fn values(&self) -> ValueIter<'_, K, V, S> {
        ValueIter { inner: self.iter() }
    }

    /// Iterate all entries in descending key order.
    pub fn iter_descending(&self) -> DescendingIter<'_, K, V, S> {
        DescendingIter {
            tree: self,
            cursor: None,
            started: false,
            done: false,
        }
    }
}

// ============================================================================
//  EntryIter
// ============================================================================

/// Ascending entry iterator. Yields `Err` once and stops if the store
/// fails mid-walk.
pub struct EntryIter<'a, K, V, S> {
    tree: &'a BlinkTree<K, V, S>,
    leaf: Option<LeafContent<K, V>>,
    pos: usize,
    upper: Option<K>,
    upper_inclusive: bool,
    pending_error: Option<TreeError>,
}

impl<K, V, S> EntryIter<'_, K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    /// Position on the first in-bounds slot.
    fn position_at(&mut self, lower: Option<&K>, lower_inclusive: bool) -> Result<()> {
        match lower {
            None => {
                let mut leaf = self.tree.load_leaf(self.tree.left_edge(0))?;
                // skip fence-only leaves
                while leaf.keys.len() == 2 {
                    if leaf.next == NULL_RECID {
                        return Ok(());
                    }
                    leaf = self.tree.load_leaf(leaf.next)?;
                }
                self.leaf = Some(leaf);
                self.pos = 1;
            }
            Some(lo) => {
                let (_, node) = self.tree.descend_to_leaf(lo)?;
                let mut leaf = match node {
                    NodeContent::Leaf(leaf) => leaf,
                    NodeContent::Inner(_) => {
                        return Err(TreeError::corrupt("descent ended on an inner node"))
                    }
                };
                'leaves: loop {
                    for i in 1..leaf.keys.len() - 1 {
                        let Some(key) = &leaf.keys[i] else {
                            continue;
                        };
                        let cmp = self.tree.order.cmp(lo, key);
                        if cmp == Ordering::Less || (lower_inclusive && cmp == Ordering::Equal) {
                            self.pos = i;
                            self.leaf = Some(leaf);
                            break 'leaves;
                        }
                    }
                    if leaf.next == NULL_RECID {
                        return Ok(());
                    }
                    leaf = self.tree.load_leaf(leaf.next)?;
                }
            }
        }
        self.check_upper_bound();
        Ok(())
    }

    /// Step the cursor to the next real slot, hopping leaves as needed.
    fn advance(&mut self) -> Result<()> {
        let Some(len) = self.leaf.as_ref().map(|leaf| leaf.keys.len()) else {
            return Ok(());
        };
        self.pos += 1;
        if self.pos == len - 1 {
            loop {
                let Some(next) = self.leaf.as_ref().map(|leaf| leaf.next) else {
                    return Ok(());
                };
                if next == NULL_RECID {
                    self.leaf = None;
                    return Ok(());
                }
                let hopped = self.tree.load_leaf(next)?;
                let has_entries = hopped.keys.len() > 2;
                self.leaf = Some(hopped);
                self.pos = 1;
                if has_entries {
                    break;
                }
            }
        }
        self.check_upper_bound();
        Ok(())
    }

    /// Drop the cursor once it passes the upper bound.
    fn check_upper_bound(&mut self) {
        let Some(hi) = &self.upper else {
            return;
        };
        let Some(leaf) = &self.leaf else {
            return;
        };
        let Some(key) = &leaf.keys[self.pos] else {
            return;
        };
        let cmp = self.tree.order.cmp(key, hi);
        if cmp == Ordering::Greater || (cmp == Ordering::Equal && !self.upper_inclusive) {
            self.leaf = None;
        }
    }
}

impl<K, V, S> Iterator for EntryIter<'_, K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            self.leaf = None;
            return Some(Err(e));
        }
        loop {
            let leaf = self.leaf.as_ref()?;
            let key = match &leaf.keys[self.pos] {
                Some(key) => key.clone(),
                None => {
                    self.leaf = None;
                    return Some(Err(TreeError::corrupt("sentinel inside entry slots")));
                }
            };
            let slot: LeafValue<V> = leaf.vals[self.pos - 1].clone();

            if let Err(e) = self.advance() {
                self.leaf = None;
                return Some(Err(e));
            }
            match self.tree.expand(&slot) {
                Err(e) => {
                    self.leaf = None;
                    return Some(Err(e));
                }
                // hole left by a set-mode delete
                Ok(None) => continue,
                Ok(Some(value)) => return Some(Ok((key, value))),
            }
        }
    }
}

// ============================================================================
//  Key / value projections
// ============================================================================

/// Ascending key iterator.
pub struct KeyIter<'a, K, V, S> {
    inner: EntryIter<'a, K, V, S>,
}

impl<K, V, S> Iterator for KeyIter<'_, K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.inner.next()?.map(|(k, _)| k))
    }
}

/// Ascending value iterator.
pub struct ValueIter<'a, K, V, S> {
    inner: EntryIter<'a, K, V, S>,
}

impl<K, V, S> Iterator for ValueIter<'_, K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.inner.next()?.map(|(_, v)| v))
    }
}

// ============================================================================
//  DescendingIter
// ============================================================================

/// Descending entry iterator built from repeated `lower_entry` descents.
pub struct DescendingIter<'a, K, V, S> {
    tree: &'a BlinkTree<K, V, S>,
    cursor: Option<K>,
    started: bool,
    done: bool,
}

impl<K, V, S> Iterator for DescendingIter<'_, K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = if self.started {
            match &self.cursor {
                Some(cursor) => self.tree.lower_entry(cursor),
                None => Ok(None),
            }
        } else {
            self.started = true;
            self.tree.last_entry()
        };
        match step {
            Ok(Some((key, value))) => {
                self.cursor = Some(key.clone());
                Some(Ok((key, value)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
