//! Ordered, reference-counted dictionary from value to [`EnumIndex`].
//!
//! Values live in a slab addressed by raw slot number; an ordered index
//! of slots, sorted by the dictionary's comparator, provides exact and
//! range lookup via binary search.
//!
//! Writers mutate through [`EnumStoreBatchUpdater`], which stages
//! reference-count deltas and applies them atomically at commit. Indices
//! whose count reaches zero stay resolvable (readers pinned to older
//! generations may still dereference them) until [`purge_unused`] runs
//! with a generation bound proving no reader can observe them.
//!
//! [`purge_unused`]: EnumStoreDictionary::purge_unused

use std::cmp::Ordering;

use ahash::AHashMap;
use log::debug;

use crate::enumstore::comparator::{EntryComparator, NaturalComparator};
use crate::enumstore::{AttributeValue, EnumIndex, check_sorted_unique};
use crate::error::Result;
use crate::generation::Generation;

#[derive(Debug)]
struct EnumEntry<V> {
    value: V,
    ref_count: u32,
}

/// Counters reported by [`EnumStoreDictionary::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryStats {
    /// Entries with a non-zero reference count.
    pub referenced: usize,
    /// Entries still resolvable (referenced plus pending removal).
    pub resolvable: usize,
    /// Entries awaiting generation-safe compaction.
    pub pending_removal: usize,
}

/// Deduplicating value dictionary with deferred compaction.
#[derive(Debug)]
pub struct EnumStoreDictionary<V, C = NaturalComparator> {
    entries: Vec<Option<EnumEntry<V>>>,
    free_list: Vec<u32>,
    ordered: Vec<EnumIndex>,
    pending_unused: Vec<(Generation, EnumIndex)>,
    referenced: usize,
    comparator: C,
    frozen: bool,
}

impl<V: AttributeValue> EnumStoreDictionary<V, NaturalComparator> {
    /// Create an empty dictionary with natural value order.
    pub fn new() -> Self {
        Self::with_comparator(NaturalComparator)
    }
}

impl<V: AttributeValue> Default for EnumStoreDictionary<V, NaturalComparator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C> EnumStoreDictionary<V, C>
where
    V: AttributeValue,
    C: EntryComparator<V>,
{
    /// Create an empty dictionary ordered by `comparator`.
    pub fn with_comparator(comparator: C) -> Self {
        EnumStoreDictionary {
            entries: Vec::new(),
            free_list: Vec::new(),
            ordered: Vec::new(),
            pending_unused: Vec::new(),
            referenced: 0,
            comparator,
            frozen: false,
        }
    }

    /// Whether the dictionary is in its read-optimized frozen state.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Enter the read-only mode used between commit batches and after
    /// bulk load. Search contexts are only built against a frozen
    /// dictionary.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn thaw(&mut self) {
        self.frozen = false;
    }

    /// Number of values currently referenced by at least one document.
    pub fn unique_value_count(&self) -> usize {
        self.referenced
    }

    /// Number of values still resolvable, including entries pending
    /// generation-safe removal.
    pub fn resolvable_count(&self) -> usize {
        self.ordered.len()
    }

    /// Usage counters for statistics bookkeeping.
    pub fn stats(&self) -> DictionaryStats {
        DictionaryStats {
            referenced: self.referenced,
            resolvable: self.ordered.len(),
            pending_removal: self.pending_unused.len(),
        }
    }

    /// Resolve an index to its value. Returns `None` for freed slots.
    pub fn get_value(&self, idx: EnumIndex) -> Option<&V> {
        self.entries
            .get(idx.raw() as usize)
            .and_then(|slot| slot.as_ref())
            .map(|entry| &entry.value)
    }

    fn value(&self, idx: EnumIndex) -> &V {
        self.get_value(idx)
            .unwrap_or_else(|| panic!("enum index {} resolves to a freed slot", idx.raw()))
    }

    /// Current reference count of an index. Freed slots report zero.
    pub fn ref_count(&self, idx: EnumIndex) -> u32 {
        self.entries
            .get(idx.raw() as usize)
            .and_then(|slot| slot.as_ref())
            .map(|entry| entry.ref_count)
            .unwrap_or(0)
    }

    fn position_of(&self, value: &V) -> std::result::Result<usize, usize> {
        self.ordered
            .binary_search_by(|idx| self.comparator.compare(self.value(*idx), value))
    }

    /// Exact lookup. O(log n) against the ordered index.
    pub fn lookup_term(&self, value: &V) -> Option<EnumIndex> {
        self.position_of(value).ok().map(|pos| self.ordered[pos])
    }

    /// Inclusive range lookup returning indices in dictionary order.
    pub fn lookup_range(&self, low: &V, high: &V) -> &[EnumIndex] {
        let start = self
            .ordered
            .partition_point(|idx| self.comparator.compare(self.value(*idx), low) == Ordering::Less);
        let end = self.ordered.partition_point(|idx| {
            self.comparator.compare(self.value(*idx), high) != Ordering::Greater
        });
        &self.ordered[start..end.max(start)]
    }

    pub(crate) fn insert(&mut self, value: V) -> EnumIndex {
        assert!(!self.frozen, "insert into frozen dictionary");
        match self.position_of(&value) {
            Ok(pos) => self.ordered[pos],
            Err(pos) => {
                let slot = match self.free_list.pop() {
                    Some(slot) => {
                        self.entries[slot as usize] = Some(EnumEntry {
                            value,
                            ref_count: 0,
                        });
                        slot
                    }
                    None => {
                        self.entries.push(Some(EnumEntry {
                            value,
                            ref_count: 0,
                        }));
                        (self.entries.len() - 1) as u32
                    }
                };
                let idx = EnumIndex::new(slot);
                self.ordered.insert(pos, idx);
                idx
            }
        }
    }

    fn inc_ref_by(&mut self, idx: EnumIndex, amount: u32) {
        let entry = self.entries[idx.raw() as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("inc_ref on freed enum index {}", idx.raw()));
        if entry.ref_count == 0 {
            self.referenced += 1;
        }
        entry.ref_count += amount;
    }

    fn dec_ref_by(&mut self, idx: EnumIndex, amount: u32, generation: Generation) {
        let entry = self.entries[idx.raw() as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("dec_ref on freed enum index {}", idx.raw()));
        assert!(
            entry.ref_count >= amount,
            "reference count underflow on enum index {} ({} < {})",
            idx.raw(),
            entry.ref_count,
            amount
        );
        entry.ref_count -= amount;
        if entry.ref_count == 0 {
            self.referenced -= 1;
            self.mark_pending(generation, idx);
        }
    }

    fn mark_pending(&mut self, generation: Generation, idx: EnumIndex) {
        // An index retired, resurrected, and retired again keeps the
        // newest retire generation so it is never freed under a reader
        // that saw the resurrection.
        match self.pending_unused.iter_mut().find(|(_, i)| *i == idx) {
            Some(slot) => slot.0 = slot.0.max(generation),
            None => self.pending_unused.push((generation, idx)),
        }
    }

    /// Free all pending-removal entries retired before `first_used`.
    /// Entries resurrected by a later insert are dropped from the pending
    /// list without freeing. Idempotent; returns the number freed.
    pub fn purge_unused(&mut self, first_used: Generation) -> usize {
        if self.pending_unused.is_empty() {
            return 0;
        }
        let mut keep = Vec::new();
        let mut purged = 0;
        for (generation, idx) in std::mem::take(&mut self.pending_unused) {
            if self.ref_count(idx) > 0 {
                continue; // resurrected
            }
            if generation >= first_used {
                keep.push((generation, idx));
                continue;
            }
            let pos = self
                .position_of(self.value(idx))
                .unwrap_or_else(|_| panic!("enum index {} missing from ordered index", idx.raw()));
            self.ordered.remove(pos);
            self.entries[idx.raw() as usize] = None;
            self.free_list.push(idx.raw());
            purged += 1;
        }
        self.pending_unused = keep;
        if purged > 0 {
            debug!("purged {purged} unused dictionary entries below generation {first_used}");
        }
        purged
    }

    /// All referenced (index, value) pairs in dictionary order, used to
    /// capture the unique-value table for a save snapshot.
    pub fn referenced_values(&self) -> Vec<(EnumIndex, V)> {
        self.ordered
            .iter()
            .filter(|idx| self.ref_count(**idx) > 0)
            .map(|idx| (*idx, self.value(*idx).clone()))
            .collect()
    }

    pub(crate) fn inc_ref(&mut self, idx: EnumIndex) {
        self.inc_ref_by(idx, 1);
    }

    /// Build the dictionary directly from a sorted, deduplicated load
    /// buffer. Returns the allocated index for each input position.
    /// Reference counts start at zero; the loader accounts them while
    /// streaming document arrays.
    pub fn build_from_sorted(&mut self, values: Vec<V>) -> Result<Vec<EnumIndex>> {
        assert!(
            self.entries.is_empty(),
            "bulk build requires an empty dictionary"
        );
        check_sorted_unique(&values, &self.comparator)?;
        let mut indices = Vec::with_capacity(values.len());
        for value in values {
            let slot = self.entries.len() as u32;
            self.entries.push(Some(EnumEntry {
                value,
                ref_count: 0,
            }));
            let idx = EnumIndex::new(slot);
            self.ordered.push(idx);
            indices.push(idx);
        }
        Ok(indices)
    }
}

/// Stages dictionary mutations for one commit batch.
///
/// Inserts dedup immediately; reference-count changes are buffered and
/// applied together in [`commit`], so a batch that fails during change
/// translation leaves every count untouched.
///
/// [`commit`]: EnumStoreBatchUpdater::commit
#[derive(Debug)]
pub struct EnumStoreBatchUpdater<'a, V, C = NaturalComparator> {
    dict: &'a mut EnumStoreDictionary<V, C>,
    deltas: AHashMap<EnumIndex, i64>,
    inserted: Vec<EnumIndex>,
}

impl<'a, V, C> EnumStoreBatchUpdater<'a, V, C>
where
    V: AttributeValue,
    C: EntryComparator<V>,
{
    /// Open an update batch, thawing a frozen dictionary.
    pub fn new(dict: &'a mut EnumStoreDictionary<V, C>) -> Self {
        dict.thaw();
        EnumStoreBatchUpdater {
            dict,
            deltas: AHashMap::new(),
            inserted: Vec::new(),
        }
    }

    /// Get or allocate the index for a value.
    pub fn insert(&mut self, value: V) -> EnumIndex {
        let idx = self.dict.insert(value);
        if self.dict.ref_count(idx) == 0 && !self.inserted.contains(&idx) {
            self.inserted.push(idx);
        }
        idx
    }

    /// Exact lookup without allocating.
    pub fn lookup_term(&self, value: &V) -> Option<EnumIndex> {
        self.dict.lookup_term(value)
    }

    /// Stage a reference-count increment.
    pub fn stage_inc(&mut self, idx: EnumIndex) {
        *self.deltas.entry(idx).or_insert(0) += 1;
    }

    /// Stage a reference-count decrement.
    pub fn stage_dec(&mut self, idx: EnumIndex) {
        *self.deltas.entry(idx).or_insert(0) -= 1;
    }

    /// Apply all staged deltas. Indices dropping to zero references are
    /// tagged with `generation` for later generation-safe compaction;
    /// reference count underflow panics.
    pub fn commit(self, generation: Generation) {
        for (idx, delta) in self.deltas {
            match delta.cmp(&0) {
                Ordering::Greater => self.dict.inc_ref_by(idx, delta as u32),
                Ordering::Less => self.dict.dec_ref_by(idx, (-delta) as u32, generation),
                Ordering::Equal => {}
            }
        }
        // Entries allocated this batch that ended up unreferenced go
        // straight to the pending list.
        for idx in self.inserted {
            if self.dict.ref_count(idx) == 0 {
                self.dict.mark_pending(generation, idx);
            }
        }
    }
}
