//! Binary node format.
//!
//! Byte layout, in order:
//!
//! ```text
//! header:u8      180..=187, leaf/inner crossed with sentinel flags
//! size:u8        number of key slots, fences included
//! metas          num_metas packed varints, all zero in this revision
//! links          leaf: packed next recid | inner: size packed child recids
//! keys           key-codec stream for the non-sentinel window
//! values         leaf only: inline values, packed value recids (0 = hole),
//!                or a presence bitmap, depending on the storage mode
//! ```
//!
//! Sentinel fence keys are never in the key stream; the header says where
//! they are and decode reconstructs them. Metas are a forward-compatibility
//! channel: readers skip however many the tree was configured with.

use std::sync::Arc;

use crate::codec::{KeyCodec, RecordCodec, ValueCodec};
use crate::error::{Result, TreeError};
use crate::node::{InnerContent, LeafContent, LeafValue, NodeContent};
use crate::order::KeyOrder;
use crate::pack::{pack_bools, pack_u64, ByteReader};
use crate::store::NULL_RECID;

// ============================================================================
//  Header tags
// ============================================================================

const HDR_LEAF_LR: u8 = 180;
const HDR_LEAF_L: u8 = 181;
const HDR_LEAF_R: u8 = 182;
const HDR_LEAF_C: u8 = 183;
const HDR_DIR_LR: u8 = 184;
const HDR_DIR_L: u8 = 185;
const HDR_DIR_R: u8 = 186;
const HDR_DIR_C: u8 = 187;

const fn header_tag(is_leaf: bool, left: bool, right: bool) -> u8 {
    match (is_leaf, left, right) {
        (true, true, true) => HDR_LEAF_LR,
        (true, true, false) => HDR_LEAF_L,
        (true, false, true) => HDR_LEAF_R,
        (true, false, false) => HDR_LEAF_C,
        (false, true, true) => HDR_DIR_LR,
        (false, true, false) => HDR_DIR_L,
        (false, false, true) => HDR_DIR_R,
        (false, false, false) => HDR_DIR_C,
    }
}

// ============================================================================
//  Value storage modes
// ============================================================================

/// How leaf payloads are represented in node records.
pub enum ValueStorage<V> {
    /// Values encoded inline in the node record.
    Inline(Arc<dyn ValueCodec<V>>),

    /// Values stored as separate records; nodes carry packed recids,
    /// `0` marking a hole.
    OutsideNodes(Arc<dyn ValueCodec<V>>),

    /// No value domain (set use): nodes carry a presence bitmap and decode
    /// restores present slots with the given constructor.
    PresenceOnly(fn() -> V),
}

impl<V> Clone for ValueStorage<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Inline(codec) => Self::Inline(Arc::clone(codec)),
            Self::OutsideNodes(codec) => Self::OutsideNodes(Arc::clone(codec)),
            Self::PresenceOnly(make) => Self::PresenceOnly(*make),
        }
    }
}

// ============================================================================
//  NodeCodec
// ============================================================================

/// Record codec for [`NodeContent`].
pub struct NodeCodec<K, V> {
    key_codec: Arc<dyn KeyCodec<K>>,
    values: ValueStorage<V>,
    order: Arc<dyn KeyOrder<K>>,
    num_metas: u16,
}

impl<K, V> NodeCodec<K, V> {
    /// Build a node codec.
    #[must_use]
    pub fn new(
        key_codec: Arc<dyn KeyCodec<K>>,
        values: ValueStorage<V>,
        order: Arc<dyn KeyOrder<K>>,
        num_metas: u16,
    ) -> Self {
        Self {
            key_codec,
            values,
            order,
            num_metas,
        }
    }

    /// The leaf-payload storage mode.
    #[must_use]
    pub fn values(&self) -> &ValueStorage<V> {
        &self.values
    }

    /// Integrity assertion: real keys strictly increasing, equality allowed
    /// only where the high-key duplicates the last real key.
    fn check_order(&self, keys: &[Option<K>]) {
        if cfg!(debug_assertions) {
            let len = keys.len();
            let from = if keys[0].is_none() { 2 } else { 1 };
            let to = if keys[len - 1].is_none() { len - 1 } else { len };
            for i in from..to {
                let (Some(prev), Some(curr)) = (keys[i - 1].as_ref(), keys[i].as_ref()) else {
                    continue;
                };
                let ord = self.order.cmp(prev, curr);
                let ok = if i == len - 1 {
                    ord != std::cmp::Ordering::Greater
                } else {
                    ord == std::cmp::Ordering::Less
                };
                debug_assert!(ok, "node key order violated at slot {i}");
            }
        }
    }
}

impl<K: Send + Sync, V: Send + Sync> RecordCodec<NodeContent<K, V>> for NodeCodec<K, V> {
    fn serialize(&self, out: &mut Vec<u8>, node: &NodeContent<K, V>) -> Result<()> {
        let keys = node.keys();
        let size = keys.len();
        if size > 255 {
            return Err(TreeError::Serialization(format!(
                "node has {size} key slots, format limit is 255"
            )));
        }
        self.check_order(keys);

        let left = keys[0].is_none();
        let right = keys[size - 1].is_none();
        out.push(header_tag(node.is_leaf(), left, right));
        out.push(size as u8);

        for _ in 0..self.num_metas {
            pack_u64(out, 0);
        }

        match node {
            NodeContent::Leaf(leaf) => pack_u64(out, leaf.next),
            NodeContent::Inner(inner) => {
                debug_assert!(
                    node.high_key().is_none() || inner.children[size - 1] != NULL_RECID,
                    "non-rightmost inner node lost its sibling link"
                );
                for &child in &inner.children {
                    pack_u64(out, child);
                }
            }
        }

        let start = usize::from(left);
        let end = if right { size - 1 } else { size };
        self.key_codec.serialize(out, keys, start, end)?;

        if let NodeContent::Leaf(leaf) = node {
            match &self.values {
                ValueStorage::Inline(codec) => {
                    for val in &leaf.vals {
                        let value = val.as_value().ok_or_else(|| {
                            TreeError::Serialization("non-inline payload in inline mode".into())
                        })?;
                        codec.serialize(out, value)?;
                    }
                }
                ValueStorage::OutsideNodes(_) => {
                    for val in &leaf.vals {
                        match val {
                            LeafValue::Ref(recid) => pack_u64(out, *recid),
                            LeafValue::Empty => pack_u64(out, NULL_RECID),
                            LeafValue::Value(_) => {
                                return Err(TreeError::Serialization(
                                    "inline payload in outside-nodes mode".into(),
                                ))
                            }
                        }
                    }
                }
                ValueStorage::PresenceOnly(_) => {
                    let flags: Vec<bool> = leaf.vals.iter().map(|v| !v.is_empty()).collect();
                    pack_bools(out, &flags);
                }
            }
        }
        Ok(())
    }

    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<NodeContent<K, V>> {
        let header = input.read_u8()?;
        if !(HDR_LEAF_LR..=HDR_DIR_C).contains(&header) {
            return Err(TreeError::corrupt(format!("unknown node header {header}")));
        }
        let size = usize::from(input.read_u8()?);
        if size < 2 {
            return Err(TreeError::corrupt(format!("node with {size} key slots")));
        }

        // unknown meta payloads are skipped, not interpreted
        for _ in 0..self.num_metas {
            input.unpack_u64()?;
        }

        let is_leaf = header <= HDR_LEAF_C;
        let left = matches!(header, HDR_LEAF_LR | HDR_LEAF_L | HDR_DIR_LR | HDR_DIR_L);
        let right = matches!(header, HDR_LEAF_LR | HDR_LEAF_R | HDR_DIR_LR | HDR_DIR_R);
        let start = usize::from(left);
        let end = if right { size - 1 } else { size };

        if is_leaf {
            let next = input.unpack_u64()?;
            let keys = self.key_codec.deserialize(input, start, end, size)?;
            if keys.len() != size {
                return Err(TreeError::corrupt("key codec returned wrong slot count"));
            }

            let mut vals = Vec::with_capacity(size - 2);
            match &self.values {
                ValueStorage::Inline(codec) => {
                    for _ in 0..size - 2 {
                        vals.push(LeafValue::Value(codec.deserialize(input)?));
                    }
                }
                ValueStorage::OutsideNodes(_) => {
                    for _ in 0..size - 2 {
                        let recid = input.unpack_u64()?;
                        vals.push(if recid == NULL_RECID {
                            LeafValue::Empty
                        } else {
                            LeafValue::Ref(recid)
                        });
                    }
                }
                ValueStorage::PresenceOnly(make) => {
                    for present in input.unpack_bools(size - 2)? {
                        vals.push(if present {
                            LeafValue::Value(make())
                        } else {
                            LeafValue::Empty
                        });
                    }
                }
            }

            Ok(NodeContent::Leaf(LeafContent::new(
                keys.into_boxed_slice(),
                vals.into_boxed_slice(),
                next,
            )))
        } else {
            let mut children = Vec::with_capacity(size);
            for _ in 0..size {
                children.push(input.unpack_u64()?);
            }
            let keys = self.key_codec.deserialize(input, start, end, size)?;
            if keys.len() != size {
                return Err(TreeError::corrupt("key codec returned wrong slot count"));
            }
            Ok(NodeContent::Inner(InnerContent::new(
                keys.into_boxed_slice(),
                children.into_boxed_slice(),
            )))
        }
    }

    fn fixed_size(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{U64DeltaKeyCodec, U64ValueCodec};
    use crate::order::Natural;

    fn codec(num_metas: u16) -> NodeCodec<u64, u64> {
        NodeCodec::new(
            Arc::new(U64DeltaKeyCodec),
            ValueStorage::Inline(Arc::new(U64ValueCodec)),
            Arc::new(Natural),
            num_metas,
        )
    }

    fn roundtrip(codec: &NodeCodec<u64, u64>, node: &NodeContent<u64, u64>) -> NodeContent<u64, u64> {
        let mut buf = Vec::new();
        codec.serialize(&mut buf, node).unwrap();
        codec.deserialize(&mut ByteReader::new(&buf)).unwrap()
    }

    #[test]
    fn leaf_roundtrip_inline() {
        let node = NodeContent::Leaf(LeafContent::new(
            vec![None, Some(3), Some(7), Some(9)].into_boxed_slice(),
            vec![LeafValue::Value(30), LeafValue::Value(70)].into_boxed_slice(),
            12,
        ));
        assert_eq!(roundtrip(&codec(0), &node), node);
    }

    #[test]
    fn empty_root_roundtrip() {
        let node: NodeContent<u64, u64> = NodeContent::Leaf(LeafContent::empty_root());
        assert_eq!(roundtrip(&codec(0), &node), node);
    }

    #[test]
    fn inner_roundtrip() {
        let node: NodeContent<u64, u64> = NodeContent::Inner(InnerContent::new(
            vec![None, Some(10), None].into_boxed_slice(),
            vec![4, 5, 0].into_boxed_slice(),
        ));
        assert_eq!(roundtrip(&codec(0), &node), node);
    }

    #[test]
    fn header_bytes_are_exact() {
        let cases: [(NodeContent<u64, u64>, u8); 3] = [
            (NodeContent::Leaf(LeafContent::empty_root()), HDR_LEAF_LR),
            (
                NodeContent::Leaf(LeafContent::new(
                    vec![Some(1), Some(2), Some(3), Some(3)].into_boxed_slice(),
                    vec![LeafValue::Value(2), LeafValue::Value(3)].into_boxed_slice(),
                    9,
                )),
                HDR_LEAF_C,
            ),
            (
                NodeContent::Inner(InnerContent::new(
                    vec![None, Some(10), None].into_boxed_slice(),
                    vec![4, 5, 0].into_boxed_slice(),
                )),
                HDR_DIR_LR,
            ),
        ];
        for (node, expected) in &cases {
            let mut buf = Vec::new();
            codec(0).serialize(&mut buf, node).unwrap();
            assert_eq!(buf[0], *expected);
            assert_eq!(usize::from(buf[1]), node.len());
        }
    }

    #[test]
    fn metas_are_skipped_on_read() {
        let node: NodeContent<u64, u64> = NodeContent::Leaf(LeafContent::new(
            vec![None, Some(5), None].into_boxed_slice(),
            vec![LeafValue::Value(50)].into_boxed_slice(),
            0,
        ));
        assert_eq!(roundtrip(&codec(3), &node), node);
    }

    #[test]
    fn outside_nodes_mode_keeps_holes() {
        let codec: NodeCodec<u64, u64> = NodeCodec::new(
            Arc::new(U64DeltaKeyCodec),
            ValueStorage::OutsideNodes(Arc::new(U64ValueCodec)),
            Arc::new(Natural),
            0,
        );
        let node = NodeContent::Leaf(LeafContent::new(
            vec![None, Some(1), Some(2), None].into_boxed_slice(),
            vec![LeafValue::Ref(41), LeafValue::Empty].into_boxed_slice(),
            0,
        ));
        let mut buf = Vec::new();
        codec.serialize(&mut buf, &node).unwrap();
        assert_eq!(codec.deserialize(&mut ByteReader::new(&buf)).unwrap(), node);
    }

    #[test]
    fn presence_mode_roundtrips_bitmap() {
        let codec: NodeCodec<u64, ()> = NodeCodec::new(
            Arc::new(U64DeltaKeyCodec),
            ValueStorage::PresenceOnly(|| ()),
            Arc::new(Natural),
            0,
        );
        let node = NodeContent::Leaf(LeafContent::new(
            vec![None, Some(1), Some(2), Some(3), None].into_boxed_slice(),
            vec![
                LeafValue::Value(()),
                LeafValue::Empty,
                LeafValue::Value(()),
            ]
            .into_boxed_slice(),
            0,
        ));
        let mut buf = Vec::new();
        codec.serialize(&mut buf, &node).unwrap();
        assert_eq!(codec.deserialize(&mut ByteReader::new(&buf)).unwrap(), node);
    }

    #[test]
    fn rejects_unknown_header() {
        let c = codec(0);
        let res: Result<NodeContent<u64, u64>> = c.deserialize(&mut ByteReader::new(&[17, 2]));
        assert!(matches!(res, Err(TreeError::Corruption(_))));
    }
}
