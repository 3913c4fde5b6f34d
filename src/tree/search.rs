//! Lock-free search paths: point lookup and ordered navigation.
//!
//! Descent follows child pointers only; sibling links are followed at the
//! target level to correct for concurrent splits (move-right). No search
//! path ever touches the lock table.

use std::cmp::Ordering;

use crate::error::{Result, TreeError};
use crate::node::{child_for, find_first_ge, LeafContent, NodeContent};
use crate::store::{Recid, RecordStore, NULL_RECID};

use super::BlinkTree;

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    /// Look up the value stored under `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let (_, node) = self.descend_to_leaf(key)?;
        let mut leaf = match node {
            NodeContent::Leaf(leaf) => leaf,
            NodeContent::Inner(_) => {
                return Err(TreeError::corrupt("descent ended on an inner node"))
            }
        };

        let mut pos = find_first_ge(&*self.order, &leaf.keys, key);
        while pos == leaf.keys.len() {
            // key exceeds this leaf's high-key: a concurrent split moved it
            if leaf.next == NULL_RECID {
                return Ok(None);
            }
            leaf = self.load_leaf(leaf.next)?;
            pos = find_first_ge(&*self.order, &leaf.keys, key);
        }

        // a hit on the trailing slot is the high-key separator, not an entry
        if pos == leaf.keys.len() - 1 {
            return Ok(None);
        }
        match &leaf.keys[pos] {
            Some(found) if self.order.cmp(key, found) == Ordering::Equal => {
                self.expand(&leaf.vals[pos - 1])
            }
            _ => Ok(None),
        }
    }

    /// Whether `key` has an entry.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Smallest entry, or `None` when the tree is empty.
    pub fn first_entry(&self) -> Result<Option<(K, V)>> {
        match self.iter().next() {
            None => Ok(None),
            Some(entry) => entry.map(Some),
        }
    }

    /// Largest entry, or `None` when the tree is empty.
    pub fn last_entry(&self) -> Result<Option<(K, V)>> {
        let root = self.load(self.root_recid()?)?;
        self.last_entry_recur(&root)
    }

    /// Smallest entry with key strictly greater than `key`.
    pub fn higher_entry(&self, key: &K) -> Result<Option<(K, V)>> {
        self.find_larger(key, false)
    }

    /// Smallest entry with key greater than or equal to `key`.
    pub fn ceiling_entry(&self, key: &K) -> Result<Option<(K, V)>> {
        self.find_larger(key, true)
    }

    /// Largest entry with key strictly less than `key`.
    pub fn lower_entry(&self, key: &K) -> Result<Option<(K, V)>> {
        self.find_smaller(key, false)
    }

    /// Largest entry with key less than or equal to `key`.
    pub fn floor_entry(&self, key: &K) -> Result<Option<(K, V)>> {
        self.find_smaller(key, true)
    }

    /// Key of [`BlinkTree::higher_entry`].
    pub fn higher_key(&self, key: &K) -> Result<Option<K>> {
        Ok(self.higher_entry(key)?.map(|(k, _)| k))
    }

    /// Key of [`BlinkTree::ceiling_entry`].
    pub fn ceiling_key(&self, key: &K) -> Result<Option<K>> {
        Ok(self.ceiling_entry(key)?.map(|(k, _)| k))
    }

    /// Key of [`BlinkTree::lower_entry`].
    pub fn lower_key(&self, key: &K) -> Result<Option<K>> {
        Ok(self.lower_entry(key)?.map(|(k, _)| k))
    }

    /// Key of [`BlinkTree::floor_entry`].
    pub fn floor_key(&self, key: &K) -> Result<Option<K>> {
        Ok(self.floor_entry(key)?.map(|(k, _)| k))
    }

    // ========================================================================
    //  Descent internals
    // ========================================================================

    /// Walk from the root to the leaf responsible for `key`.
    pub(crate) fn descend_to_leaf(&self, key: &K) -> Result<(Recid, NodeContent<K, V>)> {
        let mut current = self.root_recid()?;
        let mut node = self.load(current)?;
        while let NodeContent::Inner(inner) = &node {
            current = child_for(&*self.order, inner, key);
            if current == NULL_RECID {
                return Err(TreeError::corrupt("null child recid on descent"));
            }
            node = self.load(current)?;
        }
        Ok((current, node))
    }

    /// Load a recid that must be a leaf.
    pub(crate) fn load_leaf(&self, recid: Recid) -> Result<LeafContent<K, V>> {
        match self.load(recid)? {
            NodeContent::Leaf(leaf) => Ok(leaf),
            NodeContent::Inner(_) => Err(TreeError::corrupt("expected a leaf record")),
        }
    }

    /// First entry at or after `key`, walking the leaf chain.
    pub(crate) fn find_larger(&self, key: &K, inclusive: bool) -> Result<Option<(K, V)>> {
        let (_, node) = self.descend_to_leaf(key)?;
        let mut leaf = match node {
            NodeContent::Leaf(leaf) => leaf,
            NodeContent::Inner(_) => {
                return Err(TreeError::corrupt("descent ended on an inner node"))
            }
        };

        loop {
            for i in 1..leaf.keys.len() - 1 {
                let Some(candidate) = &leaf.keys[i] else {
                    continue;
                };
                let cmp = self.order.cmp(key, candidate);
                let matches = cmp == Ordering::Less || (inclusive && cmp == Ordering::Equal);
                if matches {
                    if let Some(value) = self.expand(&leaf.vals[i - 1])? {
                        return Ok(Some((candidate.clone(), value)));
                    }
                    // hole: keep scanning rightward
                }
            }
            if leaf.next == NULL_RECID {
                return Ok(None);
            }
            leaf = self.load_leaf(leaf.next)?;
        }
    }

    /// Last entry at or before `key`, by right-to-left recursive descent.
    pub(crate) fn find_smaller(&self, key: &K, inclusive: bool) -> Result<Option<(K, V)>> {
        let root = self.load(self.root_recid()?)?;
        self.find_smaller_recur(&root, key, inclusive)
    }

    fn find_smaller_recur(
        &self,
        node: &NodeContent<K, V>,
        key: &K,
        inclusive: bool,
    ) -> Result<Option<(K, V)>> {
        match node {
            NodeContent::Leaf(leaf) => {
                for i in (1..=leaf.keys.len().saturating_sub(2)).rev() {
                    let Some(candidate) = &leaf.keys[i] else {
                        continue;
                    };
                    let cmp = self.order.cmp(candidate, key);
                    let matches = cmp == Ordering::Less || (inclusive && cmp == Ordering::Equal);
                    if matches {
                        if let Some(value) = self.expand(&leaf.vals[i - 1])? {
                            return Ok(Some((candidate.clone(), value)));
                        }
                        // hole: the next smaller slot may still qualify
                    }
                }
                Ok(None)
            }
            NodeContent::Inner(inner) => {
                for i in (0..inner.keys.len()).rev() {
                    let below = match &inner.keys[i] {
                        // sentinel separator covers every key
                        None => true,
                        Some(sep) => {
                            let cmp = self.order.cmp(sep, key);
                            cmp == Ordering::Less || (inclusive && cmp == Ordering::Equal)
                        }
                    };
                    if !below {
                        continue;
                    }
                    let child = inner.children[i];
                    if child == NULL_RECID {
                        continue;
                    }
                    let node = self.load(child)?;
                    if let Some(found) = self.find_smaller_recur(&node, key, inclusive)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
        }
    }

    fn last_entry_recur(&self, node: &NodeContent<K, V>) -> Result<Option<(K, V)>> {
        match node {
            NodeContent::Leaf(leaf) => {
                // rightmost reachable leaf first
                if leaf.next != NULL_RECID {
                    let next = self.load(leaf.next)?;
                    if let Some(found) = self.last_entry_recur(&next)? {
                        return Ok(Some(found));
                    }
                }
                for i in (1..=leaf.keys.len().saturating_sub(2)).rev() {
                    let Some(key) = &leaf.keys[i] else {
                        continue;
                    };
                    if let Some(value) = self.expand(&leaf.vals[i - 1])? {
                        return Ok(Some((key.clone(), value)));
                    }
                }
                Ok(None)
            }
            NodeContent::Inner(inner) => {
                for i in (0..inner.children.len()).rev() {
                    let child = inner.children[i];
                    if child == NULL_RECID {
                        continue;
                    }
                    let node = self.load(child)?;
                    if let Some(found) = self.last_entry_recur(&node)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
        }
    }
}
