//! Unordered membership set.
//!
//! Used pervasively as a membership filter: after-frontier tracking,
//! protected-branch lookups, dedup during variation generation. Iteration
//! order is not part of the contract; duplicates coalesce silently.

use std::hash::Hash;

use ahash::AHashSet;

/// A hash set over any `Eq + Hash` key.
///
/// Thin wrapper that pins down the operations the rest of the crate relies
/// on: `insert`, `contains`, `values`, `len`, and `difference`.
#[derive(Clone, Debug, Default)]
pub struct KeySet<K> {
    elements: AHashSet<K>,
}

impl<K: Eq + Hash> KeySet<K> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: AHashSet::new(),
        }
    }

    /// Inserts an element. Returns `true` if it was not already present.
    pub fn insert(&mut self, element: K) -> bool {
        self.elements.insert(element)
    }

    /// Returns true if the element is present.
    #[must_use]
    pub fn contains(&self, element: &K) -> bool {
        self.elements.contains(element)
    }

    /// Number of distinct elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if the set holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterates over the elements in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.elements.iter()
    }
}

impl<K: Eq + Hash + Clone> KeySet<K> {
    /// Snapshot of the elements in unspecified order.
    #[must_use]
    pub fn values(&self) -> Vec<K> {
        self.elements.iter().cloned().collect()
    }

    /// Elements present in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = Self::new();
        for element in &self.elements {
            if !other.contains(element) {
                result.insert(element.clone());
            }
        }
        result
    }
}

impl<K: Eq + Hash> FromIterator<K> for KeySet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<K: Eq + Hash> Extend<K> for KeySet<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.elements.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let mut set = KeySet::new();
        assert!(set.insert("a"));
        assert!(set.insert("b"));
        assert!(!set.insert("a"));

        assert!(set.contains(&"a"));
        assert!(set.contains(&"b"));
        assert!(!set.contains(&"c"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn duplicates_coalesce() {
        let set: KeySet<u32> = [1, 1, 2, 2, 3].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn difference() {
        let a: KeySet<u32> = [1, 2, 3, 4].into_iter().collect();
        let b: KeySet<u32> = [2, 4].into_iter().collect();

        let diff = a.difference(&b);
        assert_eq!(diff.len(), 2);
        assert!(diff.contains(&1));
        assert!(diff.contains(&3));

        let empty = b.difference(&a);
        assert!(empty.is_empty());
    }

    #[test]
    fn values_snapshot() {
        let set: KeySet<u32> = [5, 6].into_iter().collect();
        let mut values = set.values();
        values.sort_unstable();
        assert_eq!(values, vec![5, 6]);
    }
}
