//! The multi-value enumerated attribute.
//!
//! Every document holds a variable-length array of (enum index, weight)
//! slots; the indices point into a shared [`EnumStoreDictionary`]. One
//! writer thread applies the change feed through [`on_commit`]; readers
//! use the accessors concurrently under a generation guard and never
//! block on the writer.
//!
//! [`on_commit`]: MultiValueEnumAttribute::on_commit

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::attribute::loader::AttributeReader;
use crate::attribute::saver::{AttributeHeader, MultiValueAttributeSaver};
use crate::attribute::{
    AttributeState, Change, ChangeOp, Config, DocId, EnumHandle, StateCell, WeightedEnum,
};
use crate::enumstore::{
    AttributeValue, EnumIndex, EnumStoreBatchUpdater, EnumStoreDictionary,
};
use crate::error::{KontosError, Result};
use crate::generation::{Generation, GenerationGuard, GenerationHandler};
use crate::multivalue::{ArrayRef, MultiValue, MultiValueMapping, ValueIndex, WeightedIndex};
use crate::search::context::{EnumHintSearchContext, PostingSource};

/// Multi-value enumerated attribute over value type `V` with slot shape
/// `T` ([`ValueIndex`] for arrays, [`WeightedIndex`] for weighted sets).
#[derive(Debug)]
pub struct MultiValueEnumAttribute<V: AttributeValue, T: MultiValue> {
    config: Config,
    state: StateCell,
    dict: RwLock<EnumStoreDictionary<V>>,
    mapping: MultiValueMapping<T>,
    pending: Mutex<Vec<Change<V>>>,
    generations: Arc<GenerationHandler>,
    stat_unique: AtomicU64,
    stat_total: AtomicU64,
}

/// Unweighted multi-value string attribute.
pub type MultiValueStringAttribute = MultiValueEnumAttribute<String, ValueIndex>;
/// Weighted-set string attribute.
pub type WeightedSetStringAttribute = MultiValueEnumAttribute<String, WeightedIndex>;
/// Unweighted multi-value integer attribute.
pub type MultiValueIntegerAttribute = MultiValueEnumAttribute<i64, ValueIndex>;
/// Weighted-set integer attribute.
pub type WeightedSetIntegerAttribute = MultiValueEnumAttribute<i64, WeightedIndex>;

impl<V: AttributeValue, T: MultiValue> MultiValueEnumAttribute<V, T> {
    /// Create an empty, active attribute.
    pub fn new(config: Config) -> Self {
        Self::with_state(config, AttributeState::Active)
    }

    /// Create an attribute awaiting bulk load; it rejects reads and
    /// commits until [`load_enumerated_data`] succeeds.
    ///
    /// [`load_enumerated_data`]: Self::load_enumerated_data
    pub fn new_for_load(config: Config) -> Self {
        Self::with_state(config, AttributeState::Loading)
    }

    fn with_state(config: Config, state: AttributeState) -> Self {
        MultiValueEnumAttribute {
            config,
            state: StateCell::new(state),
            dict: RwLock::new(EnumStoreDictionary::new()),
            mapping: MultiValueMapping::new(),
            pending: Mutex::new(Vec::new()),
            generations: Arc::new(GenerationHandler::new()),
            stat_unique: AtomicU64::new(0),
            stat_total: AtomicU64::new(0),
        }
    }

    /// The attribute configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AttributeState {
        self.state.load()
    }

    /// Whether the attribute serves reads and commits.
    pub fn is_ready(&self) -> bool {
        self.state.load() == AttributeState::Active
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state.load() {
            AttributeState::Active => Ok(()),
            other => Err(KontosError::invalid_operation(format!(
                "attribute {} is {:?}, not active",
                self.config.name, other
            ))),
        }
    }

    /// The generation handler driving deferred reclamation.
    pub fn generation_handler(&self) -> &Arc<GenerationHandler> {
        &self.generations
    }

    /// Acquire a guard pinning the current generation for a read.
    pub fn take_read_guard(&self) -> GenerationGuard {
        self.generations.take_guard()
    }

    //-------------------------------------------------------------------
    // Write path
    //-------------------------------------------------------------------

    /// Register `count` additional documents with empty value sets.
    pub fn add_docs(&self, count: u32) -> Result<()> {
        self.ensure_active()?;
        self.mapping.add_docs(count);
        Ok(())
    }

    /// Queue a change for the next commit.
    pub fn append_change(&self, change: Change<V>) -> Result<()> {
        self.ensure_active()?;
        self.pending.lock().push(change);
        Ok(())
    }

    /// Publish all queued changes as a new generation.
    ///
    /// Values are translated through the dictionary (reusing existing
    /// indices, allocating new ones), per-document arrays are rebuilt and
    /// swapped, reference counts adjusted in one batch, and the
    /// dictionary re-frozen. Changes referencing documents that were
    /// never added panic; nothing becomes visible before the batch is
    /// fully translated.
    pub fn on_commit(&self) -> Result<()> {
        self.ensure_active()?;
        let changes: Vec<Change<V>> = std::mem::take(&mut *self.pending.lock());
        if changes.is_empty() {
            self.dict.write().freeze();
            return Ok(());
        }

        let doc_limit = self.mapping.doc_count();
        for change in &changes {
            assert!(
                change.doc < doc_limit,
                "change references unknown document {} (doc limit {doc_limit})",
                change.doc
            );
        }

        let change_count = changes.len();
        let mut dict = self.dict.write();
        let mut updater = EnumStoreBatchUpdater::new(&mut dict);

        // Rebuild the affected documents' arrays in feed order.
        let mut working: AHashMap<DocId, Vec<T>> = AHashMap::new();
        for change in changes {
            let entry = working
                .entry(change.doc)
                .or_insert_with(|| self.mapping.get(change.doc).to_vec());
            match change.op {
                ChangeOp::Insert { value, weight } => {
                    let idx = updater.insert(value);
                    match entry.iter_mut().find(|slot| slot.index() == idx) {
                        Some(slot) => *slot = T::new(idx, weight),
                        None => entry.push(T::new(idx, weight)),
                    }
                }
                ChangeOp::Update { values } => {
                    entry.clear();
                    for (value, weight) in values {
                        let idx = updater.insert(value);
                        match entry.iter_mut().find(|slot| slot.index() == idx) {
                            Some(slot) => *slot = T::new(idx, weight),
                            None => entry.push(T::new(idx, weight)),
                        }
                    }
                }
                ChangeOp::Clear => entry.clear(),
            }
        }

        // Stage the reference-count deltas: everything in the new arrays
        // up, everything in the replaced arrays down.
        for (doc, new_array) in &working {
            for slot in new_array {
                updater.stage_inc(slot.index());
            }
            for slot in self.mapping.get(*doc).iter() {
                updater.stage_dec(slot.index());
            }
        }

        let generation = self.generations.current_generation();
        updater.commit(generation);
        dict.freeze();
        drop(dict);

        let touched = working.len();
        for (doc, new_array) in working {
            self.mapping.set(doc, ArrayRef::from(new_array));
        }

        self.on_update_stat();
        self.on_generation_change();
        debug!(
            "attribute {}: committed {change_count} changes touching {touched} documents",
            self.config.name
        );
        Ok(())
    }

    fn on_generation_change(&self) {
        let generation = self.generations.increment_generation();
        debug!(
            "attribute {} now at generation {generation}",
            self.config.name
        );
    }

    /// Refresh the cached statistics after a commit or load.
    pub fn on_update_stat(&self) {
        self.stat_unique
            .store(self.dict.read().unique_value_count() as u64, Ordering::Relaxed);
        self.stat_total
            .store(self.mapping.total_values(), Ordering::Relaxed);
    }

    /// Free all dictionary entries and held resources retired before
    /// `first_used`. Idempotent and safe with no work pending.
    pub fn remove_old_generations(&self, first_used: Generation) {
        self.dict.write().purge_unused(first_used);
        self.generations.reclaim(first_used);
    }

    /// Compute the oldest generation still pinned by a reader and
    /// reclaim everything older.
    pub fn reclaim_memory(&self) {
        let first_used = self.generations.first_used_generation();
        self.remove_old_generations(first_used);
    }

    /// Reject all further mutations.
    pub fn close(&self) {
        self.state.store(AttributeState::Closed);
    }

    //-------------------------------------------------------------------
    // Read API
    //-------------------------------------------------------------------

    /// Number of documents.
    pub fn doc_count(&self) -> u32 {
        self.mapping.doc_count()
    }

    /// Number of unique referenced values.
    pub fn unique_value_count(&self) -> u64 {
        self.stat_unique.load(Ordering::Relaxed)
    }

    /// Total number of stored slots across all documents.
    pub fn total_value_count(&self) -> u64 {
        self.stat_total.load(Ordering::Relaxed)
    }

    /// Direct reference to the document's slot array without copying.
    /// Valid for as long as the caller holds it; callers reading under a
    /// generation guard see a consistent array.
    pub fn get_enum_handles(&self, doc: DocId) -> ArrayRef<T> {
        self.mapping.get(doc)
    }

    /// Copy up to `buffer.len()` enum handles for a document; returns the
    /// true slot count even when truncating.
    pub fn get(&self, doc: DocId, buffer: &mut [EnumHandle]) -> usize {
        let array = self.mapping.get(doc);
        for (out, slot) in buffer.iter_mut().zip(array.iter()) {
            *out = slot.index().raw();
        }
        array.len()
    }

    /// Copy up to `buffer.len()` weighted handles for a document; returns
    /// the true slot count even when truncating.
    pub fn get_weighted(&self, doc: DocId, buffer: &mut [WeightedEnum]) -> usize {
        let array = self.mapping.get(doc);
        for (out, slot) in buffer.iter_mut().zip(array.iter()) {
            *out = WeightedEnum {
                handle: slot.index().raw(),
                weight: slot.weight(),
            };
        }
        array.len()
    }

    /// First enum handle of a document, if it has any values.
    pub fn get_enum(&self, doc: DocId) -> Option<EnumHandle> {
        self.mapping.get(doc).first().map(|slot| slot.index().raw())
    }

    /// Resolve an enum handle to its value.
    pub fn get_value(&self, handle: EnumHandle) -> Option<V> {
        self.dict.read().get_value(EnumIndex::new(handle)).cloned()
    }

    /// Resolve a document's full (value, weight) set.
    pub fn get_values(&self, doc: DocId) -> Vec<(V, i32)> {
        let array = self.mapping.get(doc);
        let dict = self.dict.read();
        array
            .iter()
            .map(|slot| {
                let value = dict
                    .get_value(slot.index())
                    .unwrap_or_else(|| {
                        panic!("document {doc} references freed enum index {}", slot.index().raw())
                    })
                    .clone();
                (value, slot.weight())
            })
            .collect()
    }

    /// Exact dictionary lookup.
    pub fn lookup_term(&self, value: &V) -> Option<EnumIndex> {
        self.dict.read().lookup_term(value)
    }

    //-------------------------------------------------------------------
    // Search integration
    //-------------------------------------------------------------------

    /// Build a search context for one term.
    pub fn search_context(self: &Arc<Self>, term: &V) -> EnumHintSearchContext {
        let guard = self.take_read_guard();
        let dict = self.dict.read();
        let matched: Vec<EnumIndex> = dict.lookup_term(term).into_iter().collect();
        let unique = dict.unique_value_count() as u32;
        drop(dict);
        self.make_context(guard, matched, unique)
    }

    /// Build a search context for an inclusive value range.
    pub fn range_search_context(self: &Arc<Self>, low: &V, high: &V) -> EnumHintSearchContext {
        let guard = self.take_read_guard();
        let dict = self.dict.read();
        let matched: Vec<EnumIndex> = dict.lookup_range(low, high).to_vec();
        let unique = dict.unique_value_count() as u32;
        drop(dict);
        self.make_context(guard, matched, unique)
    }

    fn make_context(
        self: &Arc<Self>,
        guard: GenerationGuard,
        mut matched: Vec<EnumIndex>,
        unique: u32,
    ) -> EnumHintSearchContext {
        // Range lookups come back in value order; the posting scan
        // probes by raw index.
        matched.sort_unstable();
        EnumHintSearchContext::new(
            guard,
            Arc::clone(self) as Arc<dyn PostingSource>,
            matched,
            unique,
            self.doc_count(),
            self.total_value_count(),
        )
    }

    //-------------------------------------------------------------------
    // Persistence
    //-------------------------------------------------------------------

    /// Capture a snapshot-consistent saver.
    ///
    /// Must be called from the writer thread (no commit may run while the
    /// snapshot is captured); the returned saver may then serialize in
    /// the background while commits continue.
    pub fn on_init_save(&self) -> Result<MultiValueAttributeSaver<V, T>> {
        self.ensure_active()?;
        let guard = self.take_read_guard();
        let dict = self.dict.read();
        let referenced = dict.referenced_values();
        drop(dict);

        let mut values = Vec::with_capacity(referenced.len());
        let mut remap = AHashMap::with_capacity(referenced.len());
        for (ordinal, (idx, value)) in referenced.into_iter().enumerate() {
            remap.insert(idx.raw(), ordinal as u32);
            values.push(value);
        }

        let docs = self.mapping.snapshot();
        let header = AttributeHeader {
            collection: self.config.collection,
            doc_count: docs.len() as u32,
            unique_values: values.len() as u32,
            total_values: docs.iter().map(|array| array.len() as u64).sum(),
        };
        debug!(
            "attribute {}: snapshot for save ({} docs, {} unique values)",
            self.config.name, header.doc_count, header.unique_values
        );
        Ok(MultiValueAttributeSaver::new(guard, header, values, remap, docs))
    }

    /// Bulk-load the attribute from persisted data.
    ///
    /// Builds the dictionary directly from the already-sorted unique
    /// value table and accounts reference counts in a single pass over
    /// the document arrays, then freezes the dictionary. Equivalent to
    /// replaying every document as an incremental commit, without the
    /// per-insert dictionary churn. On any failure the attribute stays
    /// in `Loading` and never reports itself ready.
    pub fn load_enumerated_data(&self, reader: AttributeReader) -> Result<()> {
        if self.state.load() != AttributeState::Loading {
            return Err(KontosError::invalid_operation(format!(
                "attribute {} is not in loading state",
                self.config.name
            )));
        }
        if reader.header().collection != self.config.collection {
            return Err(KontosError::invalid_argument(format!(
                "persisted collection type {:?} does not match configured {:?}",
                reader.header().collection,
                self.config.collection
            )));
        }

        let doc_count = reader.header().doc_count;
        let loaded = reader.read_payload::<V>()?;

        // Assemble into a fresh dictionary before touching shared state.
        let mut dict = EnumStoreDictionary::new();
        let indices = dict.build_from_sorted(loaded.values)?;
        let mut arrays: Vec<ArrayRef<T>> = Vec::with_capacity(loaded.docs.len());
        for slots in loaded.docs {
            let mut array = Vec::with_capacity(slots.len());
            for (ordinal, weight) in slots {
                let idx = *indices.get(ordinal as usize).ok_or_else(|| {
                    KontosError::corrupted(format!(
                        "document references value ordinal {ordinal} beyond table"
                    ))
                })?;
                dict.inc_ref(idx);
                array.push(T::new(idx, weight));
            }
            arrays.push(ArrayRef::from(array));
        }
        dict.freeze();

        *self.dict.write() = dict;
        self.mapping.add_docs(doc_count);
        for (doc, array) in arrays.into_iter().enumerate() {
            self.mapping.set(doc as u32, array);
        }
        self.on_update_stat();
        self.state.store(AttributeState::Active);
        self.on_generation_change();
        debug!(
            "attribute {}: loaded {doc_count} documents, {} unique values",
            self.config.name,
            self.unique_value_count()
        );
        Ok(())
    }
}

impl<V: AttributeValue, T: MultiValue> PostingSource for MultiValueEnumAttribute<V, T> {
    fn doc_id_limit(&self) -> u32 {
        self.mapping.doc_count()
    }

    fn doc_matches(&self, doc: u32, matched: &[EnumIndex]) -> bool {
        self.mapping
            .get(doc)
            .iter()
            .any(|slot| matched.binary_search(&slot.index()).is_ok())
    }
}
