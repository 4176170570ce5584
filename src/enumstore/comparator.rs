//! Pluggable value ordering for the enum store dictionary.

use std::cmp::Ordering;

/// Defines the total order a dictionary maintains over its values.
///
/// Range lookups are only valid because the dictionary order matches the
/// comparator's order, so a dictionary must use one comparator for its
/// whole lifetime.
pub trait EntryComparator<V>: Send + Sync {
    /// Compare two values under this ordering.
    fn compare(&self, lhs: &V, rhs: &V) -> Ordering;

    /// Equality under this ordering.
    fn equals(&self, lhs: &V, rhs: &V) -> bool {
        self.compare(lhs, rhs) == Ordering::Equal
    }
}

/// Orders values by their natural `Ord` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalComparator;

impl<V: Ord> EntryComparator<V> for NaturalComparator {
    fn compare(&self, lhs: &V, rhs: &V) -> Ordering {
        lhs.cmp(rhs)
    }
}

/// Orders strings case-insensitively. Strings that fold equal are equal
/// under this ordering, so a dictionary using it stores one entry per
/// folded spelling (first writer wins).
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseFoldComparator;

impl EntryComparator<String> for CaseFoldComparator {
    fn compare(&self, lhs: &String, rhs: &String) -> Ordering {
        lhs.chars()
            .flat_map(char::to_lowercase)
            .cmp(rhs.chars().flat_map(char::to_lowercase))
    }
}
