//! Locked insert paths: upsert, split ascent, root promotion, value swaps.
//!
//! # Write protocol
//!
//! ```text
//! 1. descend, pushing each ancestor whose rightmost child was NOT taken
//! 2. lock leaf, re-read; move-right if the key outgrew this node
//! 3. room: install copy-on-write content, unlock, done
//! 4. no room: split right-biased, install both halves, ascend with the
//!    new separator + sibling recid; the stack names the continuation
//!    parent, the left-edge registry covers a stack underrun
//! 5. at the root: promote under the root-reference lock
//! ```
//!
//! A writer holds one node lock at a time, plus the root-reference lock for
//! the promotion window. The move-right step always unlocks before walking.

use std::cmp::Ordering;

use crate::error::{Result, TreeError};
use crate::node::{child_for, find_first_ge, slot_insert, InnerContent, LeafContent, NodeContent};
use crate::store::{Recid, RecordStore, NULL_RECID};

use super::BlinkTree;

/// What a completed write did, carried out of the locked region so
/// listeners run lock-free.
enum PutOutcome<V> {
    /// New entry; no previous value.
    Inserted,

    /// Entry existed; value replaced.
    Replaced(Option<V>),

    /// `put_if_absent` hit an existing entry; nothing changed.
    Kept(Option<V>),
}

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    /// Insert or overwrite; returns the previous value.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.put_inner(key, value, false)
    }

    /// Insert only when absent; returns the existing value on a hit.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        self.put_inner(key, value, true)
    }

    /// Overwrite the value under `key` if present; returns the previous
    /// value. Never inserts.
    pub fn replace(&self, key: &K, value: V) -> Result<Option<V>> {
        let outcome = {
            let _sweep = self.locks.sweep_guard();
            self.replace_locked(key, &value, |_| true)?
        };
        self.locks.assert_none_held();
        if let Some(old) = &outcome {
            self.notify(key, old.as_ref(), Some(&value));
        }
        Ok(outcome.flatten())
    }

    fn put_inner(&self, key: K, value: V, only_if_absent: bool) -> Result<Option<V>> {
        let outcome = {
            let _sweep = self.locks.sweep_guard();
            self.put_locked(&key, &value, only_if_absent)?
        };
        self.locks.assert_none_held();

        match outcome {
            PutOutcome::Inserted => {
                self.notify(&key, None, Some(&value));
                Ok(None)
            }
            PutOutcome::Replaced(old) => {
                self.notify(&key, old.as_ref(), Some(&value));
                Ok(old)
            }
            PutOutcome::Kept(existing) => Ok(existing),
        }
    }

    fn put_locked(&self, key: &K, value: &V, only_if_absent: bool) -> Result<PutOutcome<V>> {
        // outside-node storage allocates the value record up front
        let stored = self.store_value(value)?;

        let root_recid = self.root_recid()?;
        let mut current = root_recid;
        let mut node = self.load(current)?;

        // descent, remembering ancestors whose rightmost child was not taken
        let mut stack: Vec<Recid> = Vec::new();
        while let NodeContent::Inner(inner) = &node {
            let parent = current;
            current = child_for(&*self.order, inner, key);
            if current == NULL_RECID {
                return Err(TreeError::corrupt("null child recid on descent"));
            }
            if current != inner.children[inner.children.len() - 1] {
                stack.push(parent);
            }
            node = self.load(current)?;
        }

        let mut level = 1usize;
        let mut target: K = key.clone();
        let mut carry: Recid = NULL_RECID;

        loop {
            // refinement: lock, re-read, resolve overwrite, move right
            let content = loop {
                self.locks.lock(current);
                let content = self.load(current)?;

                if let NodeContent::Leaf(leaf) = &content {
                    let pos = find_first_ge(&*self.order, &leaf.keys, &target);
                    if pos < leaf.keys.len() - 1 {
                        if let Some(found) = &leaf.keys[pos] {
                            if self.order.cmp(&target, found) == Ordering::Equal {
                                let old = self.expand(&leaf.vals[pos - 1])?;
                                if only_if_absent {
                                    self.locks.unlock(current);
                                    return Ok(PutOutcome::Kept(old));
                                }
                                let mut vals = leaf.vals.to_vec();
                                vals[pos - 1] = stored.clone();
                                let updated = NodeContent::Leaf(LeafContent::new(
                                    leaf.keys.clone(),
                                    vals.into_boxed_slice(),
                                    leaf.next,
                                ));
                                self.install(current, &updated)?;
                                self.locks.unlock(current);
                                return Ok(PutOutcome::Replaced(old));
                            }
                        }
                    }
                }

                let beyond = content
                    .high_key()
                    .is_some_and(|high| self.order.cmp(&target, high) == Ordering::Greater);
                if !beyond {
                    break content;
                }

                // move-right: unlock, walk siblings until the key fits
                self.locks.unlock(current);
                let mut walker = content;
                loop {
                    if find_first_ge(&*self.order, walker.keys(), &target) < walker.len() {
                        break;
                    }
                    let next = walker.next();
                    if next == NULL_RECID {
                        break;
                    }
                    current = next;
                    walker = self.load(current)?;
                }
            };

            // room test
            if content.fill() < self.max_node_size {
                let pos = find_first_ge(&*self.order, content.keys(), &target);
                let updated = match &content {
                    NodeContent::Leaf(leaf) => {
                        let keys = slot_insert(&leaf.keys, pos, Some(target.clone()));
                        let vals = slot_insert(&leaf.vals, pos - 1, stored.clone());
                        NodeContent::Leaf(LeafContent::new(keys, vals, leaf.next))
                    }
                    NodeContent::Inner(inner) => {
                        debug_assert!(carry != NULL_RECID, "split ascent lost its sibling");
                        let keys = slot_insert(&inner.keys, pos, Some(target.clone()));
                        let children = slot_insert(&inner.children, pos, carry);
                        NodeContent::Inner(InnerContent::new(keys, children))
                    }
                };
                self.install(current, &updated)?;
                self.locks.unlock(current);
                return Ok(PutOutcome::Inserted);
            }

            // split: apply the insertion to a widened copy, cut at the middle
            let pos = find_first_ge(&*self.order, content.keys(), &target);
            let (installed, sibling, separator) = match &content {
                NodeContent::Leaf(leaf) => {
                    let keys = slot_insert(&leaf.keys, pos, Some(target.clone()));
                    let vals = slot_insert(&leaf.vals, pos - 1, stored.clone());
                    let split = keys.len() / 2;

                    let right = LeafContent::new(
                        keys[split..].to_vec().into_boxed_slice(),
                        vals[split..].to_vec().into_boxed_slice(),
                        leaf.next,
                    );
                    let sibling = self.store.put(&NodeContent::Leaf(right), &self.codec)?;

                    // the left half duplicates its last real key as the new
                    // high-key, equal to the sibling's first key
                    let mut left_keys = keys[..split + 2].to_vec();
                    left_keys[split + 1] = left_keys[split].clone();
                    let left = LeafContent::new(
                        left_keys.into_boxed_slice(),
                        vals[..split].to_vec().into_boxed_slice(),
                        sibling,
                    );
                    let separator = left.keys[split + 1]
                        .clone()
                        .ok_or_else(|| TreeError::corrupt("sentinel at split point"))?;
                    (NodeContent::Leaf(left), sibling, separator)
                }
                NodeContent::Inner(inner) => {
                    let keys = slot_insert(&inner.keys, pos, Some(target.clone()));
                    let children = slot_insert(&inner.children, pos, carry);
                    let split = keys.len() / 2;

                    let right = InnerContent::new(
                        keys[split..].to_vec().into_boxed_slice(),
                        children[split..].to_vec().into_boxed_slice(),
                    );
                    let sibling = self.store.put(&NodeContent::Inner(right), &self.codec)?;

                    let left_keys = keys[..split + 1].to_vec();
                    let mut left_children = children[..split + 1].to_vec();
                    left_children[split] = sibling;
                    let left = InnerContent::new(
                        left_keys.into_boxed_slice(),
                        left_children.into_boxed_slice(),
                    );
                    let separator = left.keys[split]
                        .clone()
                        .ok_or_else(|| TreeError::corrupt("sentinel at split point"))?;
                    (NodeContent::Inner(left), sibling, separator)
                }
            };
            self.install(current, &installed)?;

            #[cfg(feature = "tracing")]
            tracing::debug!(recid = current, sibling, level, "node split");

            if current == root_recid && self.try_promote_root(current, sibling, &installed)? {
                return Ok(PutOutcome::Inserted);
            }

            // ascend: the popped ancestor (or the level's left edge) is a
            // starting point; move-right finds the true parent
            self.locks.unlock(current);
            carry = sibling;
            target = separator;
            level += 1;
            current = match stack.pop() {
                Some(parent) => parent,
                None => self.left_edge(level - 1),
            };
        }
    }

    /// Promote a split root: build a new root over both halves and swing
    /// the root-reference record, all under the root-reference lock.
    ///
    /// Returns `false` when another writer already promoted past `current`,
    /// in which case the caller continues its ascent instead.
    fn try_promote_root(
        &self,
        current: Recid,
        sibling: Recid,
        left: &NodeContent<K, V>,
    ) -> Result<bool> {
        self.locks.lock(self.root_ref);
        if self.root_recid()? != current {
            // someone else grew the tree first; current is no longer the root
            self.locks.unlock(self.root_ref);
            return Ok(false);
        }
        self.locks.unlock(current);

        let root = InnerContent::new(
            vec![left.keys()[0].clone(), left.high_key().cloned(), None].into_boxed_slice(),
            vec![current, sibling, NULL_RECID].into_boxed_slice(),
        );
        let new_root = self.store.put(&NodeContent::Inner(root), &self.codec)?;
        self.store
            .update(self.root_ref, &new_root, &crate::codec::RecidCodec)?;
        self.left_edges.write().push(new_root);

        #[cfg(feature = "tracing")]
        tracing::debug!(old_root = current, new_root, "root promoted");

        self.locks.unlock(self.root_ref);
        Ok(true)
    }

    /// Shared walk for the `replace` family: locate and lock the leaf slot
    /// holding `key`, rewrite its value when `accept` approves the current
    /// one. Returns `None` on a miss or rejection, otherwise the previous
    /// expanded value.
    fn replace_locked(
        &self,
        key: &K,
        value: &V,
        accept: impl Fn(Option<&V>) -> bool,
    ) -> Result<Option<Option<V>>> {
        let (mut current, _) = self.descend_to_leaf(key)?;
        self.locks.lock(current);

        let mut leaf = self.load_leaf(current)?;
        let mut pos = find_first_ge(&*self.order, &leaf.keys, key);
        while pos == leaf.keys.len() {
            if leaf.next == NULL_RECID {
                self.locks.unlock(current);
                return Ok(None);
            }
            // hand-over-hand along the chain
            self.locks.lock(leaf.next);
            self.locks.unlock(current);
            current = leaf.next;
            leaf = self.load_leaf(current)?;
            pos = find_first_ge(&*self.order, &leaf.keys, key);
        }

        let hit = pos < leaf.keys.len() - 1
            && leaf.keys[pos]
                .as_ref()
                .is_some_and(|found| self.order.cmp(key, found) == Ordering::Equal);
        if !hit {
            self.locks.unlock(current);
            return Ok(None);
        }

        let old = self.expand(&leaf.vals[pos - 1])?;
        if !accept(old.as_ref()) {
            self.locks.unlock(current);
            return Ok(None);
        }

        let stored = self.store_value(value)?;
        let mut vals = leaf.vals.to_vec();
        vals[pos - 1] = stored;
        let updated = NodeContent::Leaf(LeafContent::new(
            leaf.keys.clone(),
            vals.into_boxed_slice(),
            leaf.next,
        ));
        self.install(current, &updated)?;
        self.locks.unlock(current);
        Ok(Some(old))
    }
}

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    S: RecordStore,
{
    /// Overwrite the value under `key` only when the current value equals
    /// `expected`. Returns whether the swap happened.
    pub fn replace_if(&self, key: &K, expected: &V, value: V) -> Result<bool> {
        let outcome = {
            let _sweep = self.locks.sweep_guard();
            self.replace_locked(key, &value, |old| old == Some(expected))?
        };
        self.locks.assert_none_held();
        match outcome {
            Some(old) => {
                self.notify(key, old.as_ref(), Some(&value));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
