//! `BlinkTree`, a concurrent ordered key-value index.
//!
//! This module provides the main [`BlinkTree`] type and its configuration.
//!
//! The tree is a Lehman–Yao B-link tree over a [`RecordStore`]: every node
//! at every level carries a right-sibling link, which lets readers descend
//! with no locks at all and lets writers lock one node at a time (two during
//! root promotion). A reader that lands on a node whose high-key is smaller
//! than its target simply moves right along the link; that is the entire
//! correction needed for any split it raced with.
//!
//! Deletion is logical: entries are removed from their leaf but nodes are
//! never merged, so heavy deletion degrades occupancy until a compaction
//! pass (not implemented) rebuilds the tree.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::{KeyCodec, RecidCodec, ValueRecordCodec};
use crate::error::{Result, TreeError};
use crate::listener::{ListenerRegistry, ModListener, SizeCounter};
use crate::locks::LockTable;
use crate::node::{LeafContent, LeafValue, NodeContent};
use crate::node_codec::{NodeCodec, ValueStorage};
use crate::order::{KeyOrder, Natural};
use crate::store::{Recid, RecordStore, NULL_RECID};

mod check;
mod insert;
mod iter;
mod range;
mod remove;
mod search;

pub use check::TreeStats;
pub use iter::{DescendingIter, EntryIter, KeyIter, ValueIter};

/// Smallest allowed `max_node_size`.
const MIN_NODE_SIZE: usize = 6;

/// Largest allowed `max_node_size`; keeps every node under the format's
/// 255-slot limit with room for the split overshoot.
const MAX_NODE_SIZE: usize = 126;

/// Default `max_node_size`.
const DEFAULT_NODE_SIZE: usize = 32;

// ============================================================================
//  TreeConfig
// ============================================================================

/// Tree construction parameters.
///
/// `max_node_size` bounds the live entries of a node (key slots minus fence
/// overhead); a node whose bound is exceeded splits. It must be even and in
/// `6..=126`.
pub struct TreeConfig<K, V> {
    pub(crate) key_codec: Arc<dyn KeyCodec<K>>,
    pub(crate) values: ValueStorage<V>,
    pub(crate) order: Arc<dyn KeyOrder<K>>,
    pub(crate) order_overridden: bool,
    pub(crate) max_node_size: usize,
    pub(crate) num_metas: u16,
    pub(crate) counter: bool,
}

impl<K, V> TreeConfig<K, V>
where
    K: Ord,
{
    /// Config with natural key ordering and defaults.
    #[must_use]
    pub fn new(key_codec: Arc<dyn KeyCodec<K>>, values: ValueStorage<V>) -> Self {
        Self {
            key_codec,
            values,
            order: Arc::new(Natural),
            order_overridden: false,
            max_node_size: DEFAULT_NODE_SIZE,
            num_metas: 0,
            counter: false,
        }
    }
}

impl<K, V> TreeConfig<K, V> {
    /// Override the key ordering.
    ///
    /// Rejected at open time if the key codec's stream format requires its
    /// own ordering.
    #[must_use]
    pub fn with_order(mut self, order: Arc<dyn KeyOrder<K>>) -> Self {
        self.order = order;
        self.order_overridden = true;
        self
    }

    /// Set the node split threshold.
    #[must_use]
    pub fn with_max_node_size(mut self, max_node_size: usize) -> Self {
        self.max_node_size = max_node_size;
        self
    }

    /// Reserve per-node meta varints (forward-compatibility channel).
    #[must_use]
    pub fn with_num_metas(mut self, num_metas: u16) -> Self {
        self.num_metas = num_metas;
        self
    }

    /// Keep entry count in O(1) at a small per-mutation cost.
    #[must_use]
    pub fn with_counter(mut self) -> Self {
        self.counter = true;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_node_size % 2 != 0 {
            return Err(TreeError::invalid("max_node_size must be even"));
        }
        if self.max_node_size < MIN_NODE_SIZE {
            return Err(TreeError::invalid("max_node_size too low"));
        }
        if self.max_node_size > MAX_NODE_SIZE {
            return Err(TreeError::invalid("max_node_size too high"));
        }
        if self.order_overridden && self.key_codec.required_order().is_some() {
            return Err(TreeError::invalid(
                "key codec requires its own ordering; ordering cannot be overridden",
            ));
        }
        Ok(())
    }

    fn resolve_order(&self) -> Arc<dyn KeyOrder<K>> {
        if self.order_overridden {
            Arc::clone(&self.order)
        } else {
            self.key_codec
                .required_order()
                .unwrap_or_else(|| Arc::clone(&self.order))
        }
    }
}

// ============================================================================
//  BlinkTree
// ============================================================================

/// Concurrent ordered map over a record store.
///
/// Point operations (`get`, `put`, `put_if_absent`, `replace`, `remove`) are
/// safe under full concurrency. Iterators and range scans are weakly
/// consistent: they observe a mix of pre- and post-states of concurrent
/// mutations, never block, and never fail spuriously. Bulk operations
/// (`put_all`, `clear`) are not atomic.
pub struct BlinkTree<K, V, S> {
    pub(crate) store: Arc<S>,

    /// Recid of the root-reference record. The record holds the root's
    /// recid, so root promotion is a single record update visible to every
    /// reader at once.
    pub(crate) root_ref: Recid,

    pub(crate) codec: NodeCodec<K, V>,
    pub(crate) values: ValueStorage<V>,
    pub(crate) order: Arc<dyn KeyOrder<K>>,
    pub(crate) max_node_size: usize,
    pub(crate) locks: LockTable,

    /// Leftmost node of each level, index 0 = leaves. Appended only during
    /// root promotion; never shrinks.
    pub(crate) left_edges: RwLock<Vec<Recid>>,

    pub(crate) listeners: ListenerRegistry<K, V>,
    counter: Option<Arc<SizeCounter>>,
}

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    /// Create an empty tree root in `store` and return the recid of its
    /// root-reference record (pass to [`BlinkTree::open`]).
    pub fn create_root_ref(store: &S, config: &TreeConfig<K, V>) -> Result<Recid> {
        config.validate()?;
        let codec = NodeCodec::new(
            Arc::clone(&config.key_codec),
            config.values.clone(),
            config.resolve_order(),
            config.num_metas,
        );
        let empty: NodeContent<K, V> = NodeContent::Leaf(LeafContent::empty_root());
        let root = store.put(&empty, &codec)?;
        store.put(&root, &RecidCodec)
    }

    /// Open a tree whose root-reference record is `root_ref`.
    pub fn open(store: Arc<S>, root_ref: Recid, config: TreeConfig<K, V>) -> Result<Self> {
        config.validate()?;
        if root_ref == NULL_RECID {
            return Err(TreeError::invalid("root_ref must be a live recid"));
        }
        let order = config.resolve_order();
        let codec = NodeCodec::new(
            Arc::clone(&config.key_codec),
            config.values.clone(),
            Arc::clone(&order),
            config.num_metas,
        );

        let mut tree = Self {
            store,
            root_ref,
            codec,
            values: config.values.clone(),
            order,
            max_node_size: config.max_node_size,
            locks: LockTable::new(),
            left_edges: RwLock::new(Vec::new()),
            listeners: ListenerRegistry::new(),
            counter: None,
        };

        // collect the left edge of every level, leaves first
        let mut edges = Vec::new();
        let mut recid = tree.root_recid()?;
        loop {
            let node = tree.load(recid)?;
            edges.push(recid);
            match node.as_inner() {
                Some(inner) => recid = inner.children[0],
                None => break,
            }
        }
        edges.reverse();
        *tree.left_edges.write() = edges;

        if config.counter {
            let initial = i64::try_from(tree.count_entries()?)
                .map_err(|_| TreeError::corrupt("entry count overflow"))?;
            let counter = Arc::new(SizeCounter::new(initial));
            tree.counter = Some(Arc::clone(&counter));
            tree.listeners.add(counter);
        }
        Ok(tree)
    }

    /// Create an empty tree in `store` and open it.
    pub fn create(store: Arc<S>, config: TreeConfig<K, V>) -> Result<Self> {
        let root_ref = Self::create_root_ref(&store, &config)?;
        Self::open(store, root_ref, config)
    }

    /// Recid of this tree's root-reference record.
    #[must_use]
    pub fn root_ref(&self) -> Recid {
        self.root_ref
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Flush the store (backend-defined).
    pub fn commit(&self) -> Result<()> {
        self.store.commit()
    }

    /// Close the underlying store.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    /// Register a modification listener.
    pub fn add_listener(&self, listener: Arc<dyn ModListener<K, V>>) {
        self.listeners.add(listener);
    }

    /// Remove a previously registered listener (by identity).
    pub fn remove_listener(&self, listener: &Arc<dyn ModListener<K, V>>) -> bool {
        self.listeners.remove(listener)
    }

    /// Number of entries.
    ///
    /// O(1) when the tree was opened with a counter, otherwise a full
    /// leaf-chain traversal.
    pub fn len(&self) -> Result<u64> {
        match &self.counter {
            Some(counter) => Ok(counter.get().max(0) as u64),
            None => self.count_entries(),
        }
    }

    /// Whether the tree has no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.first_entry()?.is_none())
    }

    /// Insert every pair from `entries`. Not atomic: a concurrent reader
    /// may observe any prefix.
    pub fn put_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    fn count_entries(&self) -> Result<u64> {
        let mut count = 0;
        for entry in self.iter() {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    // ========================================================================
    //  Internal plumbing shared by the operation modules
    // ========================================================================

    /// Current root recid, through the root-reference record.
    pub(crate) fn root_recid(&self) -> Result<Recid> {
        self.store.get(self.root_ref, &RecidCodec)
    }

    /// Load one node's content snapshot.
    pub(crate) fn load(&self, recid: Recid) -> Result<NodeContent<K, V>> {
        self.store.get(recid, &self.codec)
    }

    /// Install new content for a locked node.
    pub(crate) fn install(&self, recid: Recid, content: &NodeContent<K, V>) -> Result<()> {
        #[cfg(debug_assertions)]
        debug_assert!(
            self.locks.held_by_current(recid),
            "install without holding the node lock"
        );
        self.store.update(recid, content, &self.codec)
    }

    /// Expand a leaf slot to its value: inline values clone, outside-node
    /// refs fetch their record, holes are `None`.
    pub(crate) fn expand(&self, slot: &LeafValue<V>) -> Result<Option<V>> {
        match slot {
            LeafValue::Empty => Ok(None),
            LeafValue::Value(v) => Ok(Some(v.clone())),
            LeafValue::Ref(recid) => match &self.values {
                ValueStorage::OutsideNodes(codec) => {
                    let codec = ValueRecordCodec::new(Arc::clone(codec));
                    Ok(Some(self.store.get(*recid, &codec)?))
                }
                _ => Err(TreeError::corrupt(
                    "outside-node value reference in inline storage mode",
                )),
            },
        }
    }

    /// Build the leaf slot that `put` will store for `value`.
    pub(crate) fn store_value(&self, value: &V) -> Result<LeafValue<V>> {
        match &self.values {
            ValueStorage::OutsideNodes(codec) => {
                let codec = ValueRecordCodec::new(Arc::clone(codec));
                Ok(LeafValue::Ref(self.store.put(value, &codec)?))
            }
            _ => Ok(LeafValue::Value(value.clone())),
        }
    }

    /// Leftmost node at `level` (0 = leaves).
    ///
    /// Spins when the level is being appended by a concurrent root
    /// promotion that has published the new root but not the edge yet.
    pub(crate) fn left_edge(&self, level: usize) -> Recid {
        loop {
            if let Some(&recid) = self.left_edges.read().get(level) {
                return recid;
            }
            std::hint::spin_loop();
        }
    }

    /// Notify listeners of a committed mutation; called with no node locks
    /// held.
    pub(crate) fn notify(&self, key: &K, old: Option<&V>, new: Option<&V>) {
        self.listeners.notify(key, old, new);
    }
}
