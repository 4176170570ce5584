//! Growable bit vector with guard-bit scan termination.
//!
//! [`AllocatedBitVector`] follows a single-writer / multi-reader
//! discipline: exactly one thread calls the mutating operations while any
//! number of readers test bits or scan concurrently. The word buffer is
//! published through an [`ArcSwap`] so a reallocating grow never
//! invalidates a reader mid-scan; the replaced buffer is handed back to
//! the caller for generation-deferred release.
//!
//! One bit past the logical size is reserved as a guard bit that is always
//! set, so bit-scanning loops terminate without a bounds check per word.
//!
//! The size/capacity pair is the delicate part: a reader building a
//! consistent snapshot may race a concurrent shrink, so the two counters
//! are re-read until they agree (see [`AllocatedBitVector::size_and_capacity`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

use arc_swap::ArcSwap;

/// Bit position type.
pub type Index = u32;

const WORD_BITS: usize = 64;

/// Number of words needed to hold `bits` data bits plus the guard bit.
fn words_for(bits: Index) -> usize {
    bits as usize / WORD_BITS + 1
}

/// Usable bit capacity of an allocation of `words` words, reserving one
/// bit for the guard.
fn capacity_of(words: usize) -> Index {
    (words * WORD_BITS - 1) as Index
}

/// An immutable-length buffer of atomically accessed words.
///
/// The words themselves are mutated in place by the single writer; readers
/// observe those stores as benign races bounded by the guard bit.
#[derive(Debug)]
pub struct BitWords {
    words: Box<[AtomicU64]>,
}

impl BitWords {
    fn zeroed(words: usize) -> Self {
        let words = (0..words).map(|_| AtomicU64::new(0)).collect();
        BitWords { words }
    }

    fn len(&self) -> usize {
        self.words.len()
    }

    fn set(&self, bit: Index) {
        let mask = 1u64 << (bit as usize % WORD_BITS);
        self.words[bit as usize / WORD_BITS].fetch_or(mask, Ordering::Relaxed);
    }

    fn clear(&self, bit: Index) {
        let mask = !(1u64 << (bit as usize % WORD_BITS));
        self.words[bit as usize / WORD_BITS].fetch_and(mask, Ordering::Relaxed);
    }

    fn test(&self, bit: Index) -> bool {
        let word = self.words[bit as usize / WORD_BITS].load(Ordering::Relaxed);
        word & (1u64 << (bit as usize % WORD_BITS)) != 0
    }

    /// First set bit at or after `from`, bounded by the buffer itself.
    /// The guard bit guarantees this finds something within the
    /// allocation when called with `from <= size`.
    fn next_set_bit(&self, from: Index) -> Option<Index> {
        let mut word_idx = from as usize / WORD_BITS;
        if word_idx >= self.words.len() {
            return None;
        }
        let mut word = self.words[word_idx].load(Ordering::Relaxed);
        word &= !0u64 << (from as usize % WORD_BITS);
        loop {
            if word != 0 {
                let bit = word_idx * WORD_BITS + word.trailing_zeros() as usize;
                return Some(bit as Index);
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return None;
            }
            word = self.words[word_idx].load(Ordering::Relaxed);
        }
    }
}

/// A read-side view over one word buffer with a fixed logical size.
///
/// Captured once at scan start; a concurrent reallocating grow leaves the
/// snapshot scanning the old buffer, which stays alive through the `Arc`.
#[derive(Debug, Clone)]
pub struct BitVectorSnapshot {
    words: Arc<BitWords>,
    size: Index,
}

impl BitVectorSnapshot {
    /// Logical size in bits.
    pub fn size(&self) -> Index {
        self.size
    }

    /// Test a bit. Out-of-range positions read as unset.
    pub fn test_bit(&self, bit: Index) -> bool {
        bit < self.size && self.words.test(bit)
    }

    /// First set bit at or after `from`, ignoring the guard bit.
    pub fn next_set_bit(&self, from: Index) -> Option<Index> {
        if from >= self.size {
            return None;
        }
        match self.words.next_set_bit(from) {
            Some(bit) if bit < self.size => Some(bit),
            _ => None,
        }
    }

    /// Number of set bits in `[0, size)`.
    pub fn count_ones(&self) -> Index {
        let mut count = 0;
        let mut pos = 0;
        while let Some(bit) = self.next_set_bit(pos) {
            count += 1;
            pos = bit + 1;
        }
        count
    }
}

/// Growable bit vector with an always-set guard bit at position `size`.
#[derive(Debug)]
pub struct AllocatedBitVector {
    size: AtomicU32,
    capacity: AtomicU32,
    words: ArcSwap<BitWords>,
}

impl AllocatedBitVector {
    /// Create a cleared bit vector of `size` logical bits.
    pub fn new(size: Index) -> Self {
        let words = BitWords::zeroed(words_for(size));
        words.set(size); // guard bit
        AllocatedBitVector {
            size: AtomicU32::new(size),
            capacity: AtomicU32::new(capacity_of(words.len())),
            words: ArcSwap::from_pointee(words),
        }
    }

    /// Logical size in bits.
    pub fn size(&self) -> Index {
        self.size.load(Ordering::Acquire)
    }

    /// Usable capacity in bits (excludes the guard bit reservation).
    pub fn capacity(&self) -> Index {
        self.capacity.load(Ordering::Acquire)
    }

    /// Read size and capacity as a consistent pair.
    ///
    /// A concurrent shrink publishes the smaller size before the smaller
    /// capacity, and a grow publishes the larger capacity before the
    /// larger size, so `capacity < size` can only be observed as a torn
    /// read. Retry until the pair agrees.
    pub fn size_and_capacity(&self) -> (Index, Index) {
        let mut size = self.size();
        let mut capacity = self.capacity();
        while capacity < size {
            fence(Ordering::SeqCst);
            size = self.size();
            capacity = self.capacity();
        }
        (size, capacity)
    }

    /// Set a bit. Writer-only.
    pub fn set_bit(&self, bit: Index) {
        assert!(bit < self.size(), "set_bit past logical size");
        self.words.load().set(bit);
    }

    /// Clear a bit. Writer-only.
    pub fn clear_bit(&self, bit: Index) {
        assert!(bit < self.size(), "clear_bit past logical size");
        self.words.load().clear(bit);
    }

    /// Test a bit. Out-of-range positions read as unset.
    pub fn test_bit(&self, bit: Index) -> bool {
        bit < self.size() && self.words.load().test(bit)
    }

    /// Number of set bits in `[0, size)`.
    pub fn count_ones(&self) -> Index {
        self.snapshot().count_ones()
    }

    /// Capture a consistent read-side view of the current buffer.
    pub fn snapshot(&self) -> BitVectorSnapshot {
        let (size, _capacity) = self.size_and_capacity();
        BitVectorSnapshot {
            words: self.words.load_full(),
            size,
        }
    }

    /// Reallocate to `new_length` bits and clear everything. Prior content
    /// is discarded and the old buffer freed synchronously; callers must
    /// guarantee no concurrent readers.
    pub fn resize(&self, new_length: Index) {
        let words = BitWords::zeroed(words_for(new_length));
        words.set(new_length); // guard bit
        self.capacity
            .store(capacity_of(words.len()), Ordering::Release);
        self.size.store(new_length, Ordering::Release);
        self.words.store(Arc::new(words));
    }

    /// Change the logical size, reallocating only if the word capacity
    /// changes. Writer-only, safe against concurrent readers.
    ///
    /// Returns the replaced buffer when a reallocation happened; the
    /// caller must release it through the generation-reclamation system
    /// because a concurrent reader may still be scanning it.
    pub fn grow(&self, new_size: Index, new_capacity: Index) -> Option<Arc<BitWords>> {
        assert!(
            new_capacity >= new_size,
            "grow called with capacity {new_capacity} < size {new_size}"
        );
        let old_size = self.size();
        let old_words = self.words.load_full();
        let new_word_count = words_for(new_capacity);

        if new_word_count != old_words.len() {
            // Reallocating path: build the new buffer completely before
            // publishing it, then retire the old one.
            let words = BitWords::zeroed(new_word_count);
            let copy_words = old_words.len().min(new_word_count);
            for i in 0..copy_words {
                words.words[i].store(old_words.words[i].load(Ordering::Relaxed), Ordering::Relaxed);
            }
            if new_size > old_size {
                words.clear(old_size); // stale guard bit
            } else {
                // Shrink: wipe everything at and above the new size,
                // including the stale guard.
                let mut pos = new_size;
                while let Some(bit) = words.next_set_bit(pos) {
                    words.clear(bit);
                    pos = bit + 1;
                }
            }
            words.set(new_size); // guard bit
            if new_size >= old_size {
                self.capacity
                    .store(capacity_of(new_word_count), Ordering::Release);
                self.words.store(Arc::new(words));
                self.size.store(new_size, Ordering::Release);
            } else {
                self.size.store(new_size, Ordering::Release);
                self.words.store(Arc::new(words));
                self.capacity
                    .store(capacity_of(new_word_count), Ordering::Release);
            }
            Some(old_words)
        } else if new_size > old_size {
            // In-place extend: set the new guard and wipe the newly
            // visible range before publishing the size; the old guard is
            // dropped last so a reader mid-scan at the old size still
            // terminates.
            old_words.set(new_size);
            let mut pos = old_size + 1;
            while let Some(bit) = old_words.next_set_bit(pos) {
                if bit >= new_size {
                    break;
                }
                old_words.clear(bit);
                pos = bit + 1;
            }
            self.size.store(new_size, Ordering::Release);
            old_words.clear(old_size);
            None
        } else if new_size < old_size {
            // In-place shrink: publish the smaller size first so readers
            // stop before the range being wiped.
            old_words.set(new_size);
            self.size.store(new_size, Ordering::Release);
            for bit in (new_size + 1)..=old_size {
                if old_words.test(bit) {
                    old_words.clear(bit);
                }
            }
            None
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_bits(bv: &AllocatedBitVector, bits: &[Index]) {
        for &bit in bits {
            bv.set_bit(bit);
        }
    }

    #[test]
    fn test_new_is_clear_with_guard() {
        let bv = AllocatedBitVector::new(100);
        assert_eq!(bv.size(), 100);
        assert!(bv.capacity() >= 100);
        assert_eq!(bv.count_ones(), 0);
        // Guard bit sits just past the logical size.
        assert!(bv.words.load().test(100));
    }

    #[test]
    fn test_set_clear_test() {
        let bv = AllocatedBitVector::new(70);
        set_bits(&bv, &[0, 5, 63, 64, 69]);
        assert!(bv.test_bit(0));
        assert!(bv.test_bit(63));
        assert!(bv.test_bit(64));
        assert!(!bv.test_bit(1));
        assert_eq!(bv.count_ones(), 5);
        bv.clear_bit(63);
        assert!(!bv.test_bit(63));
        assert_eq!(bv.count_ones(), 4);
    }

    #[test]
    fn test_resize_discards_content() {
        let bv = AllocatedBitVector::new(40);
        set_bits(&bv, &[3, 17]);
        bv.resize(200);
        assert_eq!(bv.size(), 200);
        assert_eq!(bv.count_ones(), 0);
        assert!(bv.words.load().test(200));
    }

    #[test]
    fn test_grow_in_place_preserves_prefix() {
        // Size 10 -> 20 within the same word allocation.
        let bv = AllocatedBitVector::new(10);
        set_bits(&bv, &[1, 4, 9]);
        let capacity = bv.capacity();
        let held = bv.grow(20, capacity);
        assert!(held.is_none());
        assert_eq!(bv.size(), 20);
        assert!(bv.test_bit(1));
        assert!(bv.test_bit(4));
        assert!(bv.test_bit(9));
        for bit in 10..20 {
            assert!(!bv.test_bit(bit), "bit {bit} should be clear");
        }
        assert!(bv.words.load().test(20));
        assert!(!bv.words.load().test(10));
    }

    #[test]
    fn test_grow_in_place_clears_newly_visible_range() {
        let bv = AllocatedBitVector::new(10);
        let capacity = bv.capacity();
        // A stray word write past the guard must not surface as data
        // when the range becomes visible.
        bv.words.load().set(15);
        assert!(bv.grow(20, capacity).is_none());
        assert_eq!(bv.size(), 20);
        assert!(!bv.test_bit(15));
        assert_eq!(bv.count_ones(), 0);
        assert!(bv.words.load().test(20));
        assert!(!bv.words.load().test(10));
    }

    #[test]
    fn test_grow_in_place_shrink_clears_tail() {
        let bv = AllocatedBitVector::new(30);
        set_bits(&bv, &[2, 14, 15, 29]);
        let capacity = bv.capacity();
        let held = bv.grow(15, capacity);
        assert!(held.is_none());
        assert_eq!(bv.size(), 15);
        assert!(bv.test_bit(2));
        assert!(bv.test_bit(14));
        assert_eq!(bv.count_ones(), 2);
        assert!(bv.words.load().test(15));
        // Growing back must not resurrect the wiped bits.
        bv.grow(30, capacity);
        assert_eq!(bv.count_ones(), 2);
    }

    #[test]
    fn test_grow_reallocates_and_returns_old_buffer() {
        let bv = AllocatedBitVector::new(60);
        set_bits(&bv, &[0, 33, 59]);
        let old_capacity = bv.capacity();
        let held = bv.grow(500, 500);
        let held = held.expect("capacity change must return the old buffer");
        assert!(bv.capacity() > old_capacity);
        assert_eq!(bv.size(), 500);
        assert!(bv.test_bit(0));
        assert!(bv.test_bit(33));
        assert!(bv.test_bit(59));
        assert!(!bv.test_bit(60));
        assert_eq!(bv.count_ones(), 3);
        assert!(bv.words.load().test(500));
        // The retired buffer still carries the old content and guard.
        assert!(held.test(33));
        assert!(held.test(60));
    }

    #[test]
    fn test_snapshot_survives_reallocating_grow() {
        let bv = AllocatedBitVector::new(50);
        set_bits(&bv, &[7, 49]);
        let snapshot = bv.snapshot();
        let _held = bv.grow(1000, 1000).expect("reallocation");
        bv.set_bit(700);
        // The snapshot still reads the pre-grow buffer.
        assert_eq!(snapshot.size(), 50);
        assert!(snapshot.test_bit(7));
        assert!(snapshot.test_bit(49));
        assert!(!snapshot.test_bit(700));
        assert_eq!(snapshot.count_ones(), 2);
    }

    #[test]
    fn test_next_set_bit_scan() {
        let bv = AllocatedBitVector::new(300);
        set_bits(&bv, &[1, 64, 65, 299]);
        let snapshot = bv.snapshot();
        let mut found = Vec::new();
        let mut pos = 0;
        while let Some(bit) = snapshot.next_set_bit(pos) {
            found.push(bit);
            pos = bit + 1;
        }
        assert_eq!(found, vec![1, 64, 65, 299]);
    }

    #[test]
    fn test_size_and_capacity_consistent() {
        let bv = AllocatedBitVector::new(128);
        let (size, capacity) = bv.size_and_capacity();
        assert_eq!(size, 128);
        assert!(capacity >= size);
    }

    #[test]
    #[should_panic(expected = "grow called with capacity")]
    fn test_grow_capacity_below_size_panics() {
        let bv = AllocatedBitVector::new(10);
        bv.grow(20, 10);
    }
}
