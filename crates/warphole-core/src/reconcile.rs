//! Set reconciliation between two snapshots of keys.

use std::collections::BTreeSet;

/// Result of diffing a previous key set against a current one.
///
/// Each list is sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation<K> {
    /// `current - previous`
    pub created: Vec<K>,
    /// `current ∩ previous`
    pub updated: Vec<K>,
    /// `previous - current`
    pub destroyed: Vec<K>,
}

impl<K> Default for Reconciliation<K> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            destroyed: Vec::new(),
        }
    }
}

impl<K> Reconciliation<K> {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.destroyed.is_empty()
    }
}

/// Diffs `previous` against `current`.
///
/// Duplicates in either input collapse to one key.
pub fn reconcile<K, P, C>(previous: P, current: C) -> Reconciliation<K>
where
    K: Ord + Clone,
    P: IntoIterator<Item = K>,
    C: IntoIterator<Item = K>,
{
    let previous: BTreeSet<K> = previous.into_iter().collect();
    let current: BTreeSet<K> = current.into_iter().collect();

    Reconciliation {
        created: current.difference(&previous).cloned().collect(),
        updated: current.intersection(&previous).cloned().collect(),
        destroyed: previous.difference(&current).cloned().collect(),
    }
}
