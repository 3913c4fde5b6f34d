//! Key ordering for the tree.
//!
//! Keys are sorted by an external comparator rather than a hard `K: Ord`
//! bound on the tree itself, so a single key type can back differently
//! ordered indexes. [`Natural`] is the default and delegates to `Ord`.

use std::cmp::Ordering;
use std::sync::Arc;

/// Total order over keys.
///
/// Implementations must be consistent (antisymmetric, transitive) for the
/// tree invariants to hold. Equality under this order is what `put` and
/// `remove` treat as "same key".
pub trait KeyOrder<K>: Send + Sync {
    /// Compare two keys.
    fn cmp(&self, a: &K, b: &K) -> Ordering;
}

/// Natural ordering via `Ord`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Natural;

impl<K: Ord> KeyOrder<K> for Natural {
    #[inline]
    fn cmp(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Reversed ordering over another [`KeyOrder`].
pub struct Reverse<K>(pub Arc<dyn KeyOrder<K>>);

impl<K> KeyOrder<K> for Reverse<K> {
    #[inline]
    fn cmp(&self, a: &K, b: &K) -> Ordering {
        self.0.cmp(b, a)
    }
}
