//! Tree-level integrity validation for tests and diagnostics.
//!
//! Walks every level through the sibling chain and verifies the structural
//! invariants: per-node key order, fence/slot laws, high-key chaining, and
//! globally sorted leaves. Meant for quiescent trees: running it against
//! an actively mutated tree can report spurious chain mismatches from the
//! per-node snapshots it compares.

use std::cmp::Ordering;

use crate::error::{Result, TreeError};
use crate::node::NodeContent;
use crate::store::{Recid, RecordStore, NULL_RECID};

use super::BlinkTree;

/// Aggregate facts from an integrity walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of levels (1 = a lone root leaf).
    pub height: usize,

    /// Nodes across all levels.
    pub node_count: usize,

    /// Leaves on the bottom chain.
    pub leaf_count: usize,

    /// Live entries (holes excluded).
    pub entry_count: u64,
}

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    /// Verify every structural invariant; returns aggregate stats.
    pub fn check_invariants(&self) -> Result<TreeStats> {
        let edges: Vec<Recid> = self.left_edges.read().clone();
        if edges.is_empty() {
            return Err(TreeError::corrupt("left-edge registry is empty"));
        }

        let root = self.load(self.root_recid()?)?;
        if root.keys()[0].is_some() || root.high_key().is_some() {
            return Err(TreeError::corrupt("root is missing its sentinels"));
        }

        let mut stats = TreeStats {
            height: edges.len(),
            node_count: 0,
            leaf_count: 0,
            entry_count: 0,
        };

        for (level, &edge) in edges.iter().enumerate() {
            self.check_level(level, edge, &mut stats)?;
        }
        Ok(stats)
    }

    fn check_level(&self, level: usize, edge: Recid, stats: &mut TreeStats) -> Result<()> {
        let mut recid = edge;
        let mut prev_key: Option<K> = None;
        let mut first = true;

        loop {
            let node = self.load(recid)?;
            stats.node_count += 1;

            if node.is_leaf() != (level == 0) {
                return Err(TreeError::corrupt(format!(
                    "node kind does not match its level at recid {recid}"
                )));
            }
            if first && node.keys()[0].is_some() {
                return Err(TreeError::corrupt(format!(
                    "leftmost node at level {level} lacks the low sentinel"
                )));
            }
            first = false;

            self.check_node_order(recid, node.keys())?;

            let slot_cap = self.max_node_size + if node.is_leaf() { 2 } else { 1 };
            if node.len() > slot_cap {
                return Err(TreeError::corrupt(format!(
                    "node exceeds the size bound at recid {recid}"
                )));
            }

            match &node {
                NodeContent::Leaf(leaf) => {
                    stats.leaf_count += 1;
                    if leaf.vals.len() != leaf.keys.len() - 2 {
                        return Err(TreeError::corrupt(format!(
                            "leaf slot law violated at recid {recid}"
                        )));
                    }
                    stats.entry_count +=
                        leaf.vals.iter().filter(|slot| !slot.is_empty()).count() as u64;

                    // global ascending order across the chain
                    for key in leaf.keys.iter().skip(1).take(leaf.keys.len() - 2) {
                        let Some(key) = key else {
                            continue;
                        };
                        if let Some(prev) = &prev_key {
                            if self.order.cmp(prev, key) != Ordering::Less {
                                return Err(TreeError::corrupt(format!(
                                    "leaf chain is not globally sorted at recid {recid}"
                                )));
                            }
                        }
                        prev_key = Some(key.clone());
                    }
                }
                NodeContent::Inner(inner) => {
                    if inner.children.len() != inner.keys.len() {
                        return Err(TreeError::corrupt(format!(
                            "inner slot law violated at recid {recid}"
                        )));
                    }
                }
            }

            match (node.high_key(), node.next()) {
                (None, NULL_RECID) => return Ok(()),
                (None, _) => {
                    return Err(TreeError::corrupt(format!(
                        "rightmost node at level {level} still has a sibling link"
                    )))
                }
                (Some(_), NULL_RECID) => {
                    return Err(TreeError::corrupt(format!(
                        "bounded node at level {level} lost its sibling link"
                    )))
                }
                (Some(_), next) => recid = next,
            }
        }
    }

    /// Real keys strictly increasing; the high-key may equal its neighbor
    /// (a split duplicates it).
    fn check_node_order(&self, recid: Recid, keys: &[Option<K>]) -> Result<()> {
        let len = keys.len();
        let from = if keys[0].is_none() { 2 } else { 1 };
        let to = if keys[len - 1].is_none() { len - 1 } else { len };
        for i in from..to {
            let (Some(prev), Some(curr)) = (keys[i - 1].as_ref(), keys[i].as_ref()) else {
                continue;
            };
            let ord = self.order.cmp(prev, curr);
            let ok = if i == len - 1 {
                ord != Ordering::Greater
            } else {
                ord == Ordering::Less
            };
            if !ok {
                return Err(TreeError::corrupt(format!(
                    "key order violated at slot {i} of recid {recid}"
                )));
            }
        }
        Ok(())
    }
}
