//! # blinktree
//!
//! A concurrent, ordered key-value index built as a Lehman–Yao B-link tree
//! over a pluggable record store.
//!
//! Every node carries a right-sibling link and a high-key bounding what is
//! reachable through it. That pair of facts buys the concurrency model:
//!
//! - Lookups and scans take no locks; a reader that races a split corrects
//!   itself by following the link ("move-right")
//! - Writers lock one node at a time, two only while promoting a new root
//! - Node contents are immutable snapshots installed by whole-record
//!   updates, so readers see pre- or post-state, never a torn node
//!
//! Nodes are serialized through [`NodeCodec`] and addressed by recid in any
//! [`RecordStore`]; [`MemStore`] is the built-in heap backend.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use blinktree::{
//!     BlinkTree, MemStore, TreeConfig, U64DeltaKeyCodec, Utf8ValueCodec, ValueStorage,
//! };
//!
//! # fn main() -> Result<(), blinktree::TreeError> {
//! let store = Arc::new(MemStore::new());
//! let config = TreeConfig::new(
//!     Arc::new(U64DeltaKeyCodec),
//!     ValueStorage::Inline(Arc::new(Utf8ValueCodec)),
//! );
//! let tree = BlinkTree::create(store, config)?;
//!
//! tree.put(1, "one".to_owned())?;
//! tree.put(2, "two".to_owned())?;
//! assert_eq!(tree.get(&2)?, Some("two".to_owned()));
//!
//! let values = tree.range_scan(Some(&1), true, None, false)?;
//! assert_eq!(values, vec!["one".to_owned(), "two".to_owned()]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Deletion caveat
//!
//! Deletion is logical: entries leave their leaf but nodes never merge.
//! Delete-heavy workloads degrade occupancy until the tree is rebuilt.

pub mod codec;
pub mod error;
pub mod listener;
pub mod node;
pub mod node_codec;
pub mod order;
pub mod pack;
pub mod store;
pub mod tree;

mod locks;

pub use codec::{
    BytesValueCodec, KeyCodec, RecidCodec, RecordCodec, U64DeltaKeyCodec, Utf8KeyCodec,
    Utf8ValueCodec, U64ValueCodec, ValueCodec, ValueRecordCodec,
};
pub use error::{Result, TreeError};
pub use listener::{ModListener, SizeCounter};
pub use node::{InnerContent, LeafContent, LeafValue, NodeContent};
pub use node_codec::{NodeCodec, ValueStorage};
pub use order::{KeyOrder, Natural, Reverse};
pub use store::{MemStore, Recid, RecordStore, CATALOG_RECID, NULL_RECID};
pub use tree::{
    BlinkTree, DescendingIter, EntryIter, KeyIter, TreeConfig, TreeStats, ValueIter,
};
