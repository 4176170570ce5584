//! Per-document variable-length arrays of enum indices.
//!
//! Arrays are immutable once published: an update builds a fresh array
//! and swaps the per-document reference. Readers clone the `Arc`, so a
//! reader holding an array keeps it valid across any number of later
//! swaps without copying the contents.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::enumstore::EnumIndex;

/// Reference to one document's published array.
pub type ArrayRef<T> = Arc<[T]>;

/// One slot of a multi-value array: an enum index plus an optional
/// weight, depending on the collection shape.
pub trait MultiValue: Copy + Debug + Send + Sync + 'static {
    /// Build a slot. Shapes without weights ignore `weight`.
    fn new(index: EnumIndex, weight: i32) -> Self;

    /// The enum index this slot refers to.
    fn index(&self) -> EnumIndex;

    /// The weight of this slot (1 for unweighted shapes).
    fn weight(&self) -> i32;
}

/// Array-collection slot: index only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueIndex(EnumIndex);

impl MultiValue for ValueIndex {
    fn new(index: EnumIndex, _weight: i32) -> Self {
        ValueIndex(index)
    }

    fn index(&self) -> EnumIndex {
        self.0
    }

    fn weight(&self) -> i32 {
        1
    }
}

/// Weighted-set slot: index and weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightedIndex {
    index: EnumIndex,
    weight: i32,
}

impl MultiValue for WeightedIndex {
    fn new(index: EnumIndex, weight: i32) -> Self {
        WeightedIndex { index, weight }
    }

    fn index(&self) -> EnumIndex {
        self.index
    }

    fn weight(&self) -> i32 {
        self.weight
    }
}

/// The per-document array table.
///
/// The lock only guards the table of `Arc` pointers; array contents are
/// never mutated in place. Readers hold it exactly long enough to clone
/// one pointer.
#[derive(Debug)]
pub struct MultiValueMapping<T: MultiValue> {
    table: RwLock<Vec<ArrayRef<T>>>,
    total_values: AtomicU64,
}

impl<T: MultiValue> MultiValueMapping<T> {
    /// Create an empty mapping.
    pub fn new() -> Self {
        MultiValueMapping {
            table: RwLock::new(Vec::new()),
            total_values: AtomicU64::new(0),
        }
    }

    /// Number of documents in the table.
    pub fn doc_count(&self) -> u32 {
        self.table.read().len() as u32
    }

    /// Total number of stored (index, weight) slots across all documents.
    pub fn total_values(&self) -> u64 {
        self.total_values.load(Ordering::Relaxed)
    }

    /// Register `count` additional documents with empty arrays.
    pub fn add_docs(&self, count: u32) {
        let mut table = self.table.write();
        for _ in 0..count {
            table.push(empty_array());
        }
    }

    /// Get a document's published array. Documents beyond the table read
    /// as empty (a reader may race a concurrent document addition).
    pub fn get(&self, doc: u32) -> ArrayRef<T> {
        let table = self.table.read();
        match table.get(doc as usize) {
            Some(array) => Arc::clone(array),
            None => empty_array(),
        }
    }

    /// Publish a new array for a document. Writer-only; the replaced
    /// array stays alive for any reader still holding it.
    pub fn set(&self, doc: u32, array: ArrayRef<T>) {
        let mut table = self.table.write();
        let slot = table
            .get_mut(doc as usize)
            .unwrap_or_else(|| panic!("set on unknown document {doc}"));
        let old_len = slot.len() as u64;
        let new_len = array.len() as u64;
        *slot = array;
        drop(table);
        if new_len >= old_len {
            self.total_values
                .fetch_add(new_len - old_len, Ordering::Relaxed);
        } else {
            self.total_values
                .fetch_sub(old_len - new_len, Ordering::Relaxed);
        }
    }

    /// Clone the whole pointer table (used by the saver to pin one
    /// consistent snapshot cheaply).
    pub fn snapshot(&self) -> Vec<ArrayRef<T>> {
        self.table.read().clone()
    }
}

impl<T: MultiValue> Default for MultiValueMapping<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_array<T: MultiValue>() -> ArrayRef<T> {
    Arc::new([])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(raw: u32) -> EnumIndex {
        EnumIndex::new(raw)
    }

    #[test]
    fn test_value_index_weight_is_one() {
        let v = ValueIndex::new(idx(3), 42);
        assert_eq!(v.index(), idx(3));
        assert_eq!(v.weight(), 1);
    }

    #[test]
    fn test_weighted_index_keeps_weight() {
        let v = WeightedIndex::new(idx(3), -5);
        assert_eq!(v.index(), idx(3));
        assert_eq!(v.weight(), -5);
    }

    #[test]
    fn test_mapping_publish_and_read() {
        let mapping = MultiValueMapping::<WeightedIndex>::new();
        mapping.add_docs(2);
        assert_eq!(mapping.doc_count(), 2);
        assert!(mapping.get(0).is_empty());

        let array: ArrayRef<WeightedIndex> =
            Arc::from(vec![WeightedIndex::new(idx(1), 10), WeightedIndex::new(idx(2), 20)]);
        mapping.set(0, array);
        assert_eq!(mapping.get(0).len(), 2);
        assert_eq!(mapping.total_values(), 2);

        mapping.set(0, Arc::from(vec![WeightedIndex::new(idx(9), 1)]));
        assert_eq!(mapping.total_values(), 1);
    }

    #[test]
    fn test_reader_keeps_replaced_array() {
        let mapping = MultiValueMapping::<ValueIndex>::new();
        mapping.add_docs(1);
        mapping.set(0, Arc::from(vec![ValueIndex::new(idx(7), 1)]));

        let held = mapping.get(0);
        mapping.set(0, Arc::from(vec![ValueIndex::new(idx(8), 1)]));

        assert_eq!(held[0].index(), idx(7));
        assert_eq!(mapping.get(0)[0].index(), idx(8));
    }

    #[test]
    fn test_out_of_range_reads_empty() {
        let mapping = MultiValueMapping::<ValueIndex>::new();
        assert!(mapping.get(99).is_empty());
    }

    #[test]
    #[should_panic(expected = "set on unknown document")]
    fn test_set_unknown_doc_panics() {
        let mapping = MultiValueMapping::<ValueIndex>::new();
        mapping.set(0, Arc::new([]));
    }
}
