//! Range scan over the leaf chain.
//!
//! One routine covers every bound shape: locate the starting leaf, emit the
//! values of real keys inside the bound window, and follow `next` only while
//! the upper bound lies beyond the current leaf's high-key. The scan is
//! weakly consistent (each leaf is a point-in-time snapshot, the chain as a
//! whole is not) and it never blocks a writer.

use std::cmp::Ordering;

use crate::error::Result;
use crate::node::{LeafContent, NodeContent};
use crate::store::{RecordStore, NULL_RECID};

use super::BlinkTree;

impl<K, V, S> BlinkTree<K, V, S>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: RecordStore,
{
    /// Collect the values of every entry within the given bounds, in key
    /// order.
    ///
    /// Either bound may be absent for a one-sided scan; both absent returns
    /// an empty result, as does `lower > upper`. Equal bounds yield the
    /// single value iff either side is inclusive.
    pub fn range_scan(
        &self,
        lower: Option<&K>,
        lower_inclusive: bool,
        upper: Option<&K>,
        upper_inclusive: bool,
    ) -> Result<Vec<V>> {
        let mut out = Vec::new();

        match (lower, upper) {
            (None, None) => return Ok(out),
            (Some(lo), Some(hi)) => match self.order.cmp(lo, hi) {
                Ordering::Greater => return Ok(out),
                Ordering::Equal => {
                    if lower_inclusive || upper_inclusive {
                        if let Some(v) = self.get(lo)? {
                            out.push(v);
                        }
                    }
                    return Ok(out);
                }
                Ordering::Less => {}
            },
            _ => {}
        }

        let mut leaf = match lower {
            Some(lo) => match self.descend_to_leaf(lo)?.1 {
                NodeContent::Leaf(leaf) => leaf,
                NodeContent::Inner(_) => {
                    return Err(crate::error::TreeError::corrupt(
                        "descent ended on an inner node",
                    ))
                }
            },
            None => self.load_leaf(self.left_edge(0))?,
        };

        loop {
            if self.emit_leaf(&leaf, lower, lower_inclusive, upper, upper_inclusive, &mut out)? {
                return Ok(out);
            }
            if leaf.next == NULL_RECID || !self.upper_beyond(&leaf, upper) {
                return Ok(out);
            }
            leaf = self.load_leaf(leaf.next)?;
        }
    }

    /// Append this leaf's in-window values; `true` means the upper bound was
    /// reached inside the leaf and the scan is complete.
    fn emit_leaf(
        &self,
        leaf: &LeafContent<K, V>,
        lower: Option<&K>,
        lower_inclusive: bool,
        upper: Option<&K>,
        upper_inclusive: bool,
        out: &mut Vec<V>,
    ) -> Result<bool> {
        for i in 1..leaf.keys.len() - 1 {
            let Some(key) = &leaf.keys[i] else {
                continue;
            };
            if let Some(lo) = lower {
                match self.order.cmp(key, lo) {
                    Ordering::Less => continue,
                    Ordering::Equal if !lower_inclusive => continue,
                    _ => {}
                }
            }
            if let Some(hi) = upper {
                match self.order.cmp(key, hi) {
                    Ordering::Greater => return Ok(true),
                    Ordering::Equal if !upper_inclusive => return Ok(true),
                    _ => {}
                }
            }
            if let Some(value) = self.expand(&leaf.vals[i - 1])? {
                out.push(value);
            }
        }
        Ok(false)
    }

    /// Whether entries past this leaf's high-key can still be in range.
    fn upper_beyond(&self, leaf: &LeafContent<K, V>, upper: Option<&K>) -> bool {
        let Some(hi) = upper else {
            // unbounded above: scan to the end of the chain
            return true;
        };
        match leaf.keys[leaf.keys.len() - 1].as_ref() {
            // sentinel high-key: rightmost leaf, nothing beyond
            None => false,
            Some(high) => self.order.cmp(hi, high) == Ordering::Greater,
        }
    }
}
