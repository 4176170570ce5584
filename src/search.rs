//! Search iterator abstractions for query execution.
//!
//! A [`SearchIterator`] enumerates matching document ids in increasing
//! order. Iterators position themselves on their first match at
//! construction; `doc_id()` reports [`NO_DOC`] once exhausted.

use std::fmt::Debug;

use crate::bitvector::BitVectorSnapshot;
use crate::error::Result;

pub mod context;

/// Sentinel document id reported by exhausted iterators.
pub const NO_DOC: u32 = u32::MAX;

/// Trait for iterators over matching documents.
pub trait SearchIterator: Send + Debug {
    /// Current document id, or [`NO_DOC`] when exhausted.
    fn doc_id(&self) -> u32;

    /// Advance to the next matching document.
    fn next(&mut self) -> Result<bool>;

    /// Advance to the first match at or past `target`.
    fn seek(&mut self, target: u32) -> Result<bool>;

    /// Estimated number of documents this iterator will produce.
    fn cost(&self) -> u64;

    /// Whether the iterator is exhausted.
    fn is_exhausted(&self) -> bool;
}

/// An iterator that matches no documents.
#[derive(Debug, Default)]
pub struct EmptyIterator;

impl EmptyIterator {
    /// Create a new empty iterator.
    pub fn new() -> Self {
        EmptyIterator
    }
}

impl SearchIterator for EmptyIterator {
    fn doc_id(&self) -> u32 {
        NO_DOC
    }

    fn next(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn seek(&mut self, _target: u32) -> Result<bool> {
        Ok(false)
    }

    fn cost(&self) -> u64 {
        0
    }

    fn is_exhausted(&self) -> bool {
        true
    }
}

/// Iterator over a sorted document id list.
#[derive(Debug)]
pub struct DocIdIterator {
    docs: Vec<u32>,
    pos: usize,
}

impl DocIdIterator {
    /// Create an iterator positioned on the first document.
    /// `docs` must be sorted ascending.
    pub fn new(docs: Vec<u32>) -> Self {
        debug_assert!(docs.windows(2).all(|w| w[0] < w[1]));
        DocIdIterator { docs, pos: 0 }
    }
}

impl SearchIterator for DocIdIterator {
    fn doc_id(&self) -> u32 {
        self.docs.get(self.pos).copied().unwrap_or(NO_DOC)
    }

    fn next(&mut self) -> Result<bool> {
        if self.pos < self.docs.len() {
            self.pos += 1;
        }
        Ok(self.pos < self.docs.len())
    }

    fn seek(&mut self, target: u32) -> Result<bool> {
        let remaining = &self.docs[self.pos.min(self.docs.len())..];
        self.pos += remaining.partition_point(|&doc| doc < target);
        Ok(self.pos < self.docs.len())
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.docs.len()
    }
}

/// Iterator scanning a bit-vector snapshot.
///
/// The snapshot pins one word buffer, so a concurrent reallocating grow
/// of the underlying vector does not disturb an in-flight scan.
#[derive(Debug)]
pub struct BitVectorIterator {
    snapshot: BitVectorSnapshot,
    current: u32,
    cost: u64,
}

impl BitVectorIterator {
    /// Create an iterator positioned on the first set bit.
    pub fn new(snapshot: BitVectorSnapshot) -> Self {
        let cost = snapshot.count_ones() as u64;
        let current = snapshot.next_set_bit(0).unwrap_or(NO_DOC);
        BitVectorIterator {
            snapshot,
            current,
            cost,
        }
    }
}

impl SearchIterator for BitVectorIterator {
    fn doc_id(&self) -> u32 {
        self.current
    }

    fn next(&mut self) -> Result<bool> {
        if self.current == NO_DOC {
            return Ok(false);
        }
        self.current = self.snapshot.next_set_bit(self.current + 1).unwrap_or(NO_DOC);
        Ok(self.current != NO_DOC)
    }

    fn seek(&mut self, target: u32) -> Result<bool> {
        if self.current == NO_DOC {
            return Ok(false);
        }
        if target > self.current {
            self.current = self.snapshot.next_set_bit(target).unwrap_or(NO_DOC);
        }
        Ok(self.current != NO_DOC)
    }

    fn cost(&self) -> u64 {
        self.cost
    }

    fn is_exhausted(&self) -> bool {
        self.current == NO_DOC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvector::AllocatedBitVector;

    #[test]
    fn test_empty_iterator() {
        let mut it = EmptyIterator::new();
        assert_eq!(it.doc_id(), NO_DOC);
        assert!(it.is_exhausted());
        assert!(!it.next().unwrap());
        assert!(!it.seek(5).unwrap());
        assert_eq!(it.cost(), 0);
    }

    #[test]
    fn test_doc_id_iterator_walk() {
        let mut it = DocIdIterator::new(vec![2, 5, 9]);
        assert_eq!(it.doc_id(), 2);
        assert!(it.next().unwrap());
        assert_eq!(it.doc_id(), 5);
        assert!(it.next().unwrap());
        assert_eq!(it.doc_id(), 9);
        assert!(!it.next().unwrap());
        assert_eq!(it.doc_id(), NO_DOC);
        assert!(it.is_exhausted());
    }

    #[test]
    fn test_doc_id_iterator_seek() {
        let mut it = DocIdIterator::new(vec![2, 5, 9, 30]);
        assert!(it.seek(5).unwrap());
        assert_eq!(it.doc_id(), 5);
        // Seek lands on the first match at or past the target.
        assert!(it.seek(10).unwrap());
        assert_eq!(it.doc_id(), 30);
        assert!(!it.seek(31).unwrap());
        assert!(it.is_exhausted());
    }

    #[test]
    fn test_bit_vector_iterator() {
        let bv = AllocatedBitVector::new(100);
        for bit in [3, 64, 99] {
            bv.set_bit(bit);
        }
        let mut it = BitVectorIterator::new(bv.snapshot());
        assert_eq!(it.cost(), 3);
        assert_eq!(it.doc_id(), 3);
        assert!(it.next().unwrap());
        assert_eq!(it.doc_id(), 64);
        assert!(it.seek(70).unwrap());
        assert_eq!(it.doc_id(), 99);
        assert!(!it.next().unwrap());
        assert_eq!(it.doc_id(), NO_DOC);
    }

    #[test]
    fn test_bit_vector_iterator_empty() {
        let bv = AllocatedBitVector::new(50);
        let mut it = BitVectorIterator::new(bv.snapshot());
        assert!(it.is_exhausted());
        assert!(!it.next().unwrap());
    }

    #[test]
    fn test_bit_vector_iterator_survives_grow() {
        let bv = AllocatedBitVector::new(64);
        bv.set_bit(10);
        bv.set_bit(63);
        let mut it = BitVectorIterator::new(bv.snapshot());
        let _held = bv.grow(1024, 1024).expect("reallocation");
        bv.set_bit(500);

        let mut seen = Vec::new();
        loop {
            seen.push(it.doc_id());
            if !it.next().unwrap() {
                break;
            }
        }
        assert_eq!(seen, vec![10, 63]);
    }
}
