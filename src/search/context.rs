//! Dictionary-hinted search contexts.
//!
//! An [`EnumHintSearchContext`] is the query-side entry point for an
//! enumerated attribute: the dictionary lookup happens up front, so terms
//! that match no stored value cost nothing further, and the planner can
//! consult [`approximate_hits`] before committing to posting
//! materialization with [`fetch_postings`].
//!
//! [`approximate_hits`]: EnumHintSearchContext::approximate_hits
//! [`fetch_postings`]: EnumHintSearchContext::fetch_postings

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::bitvector::AllocatedBitVector;
use crate::enumstore::EnumIndex;
use crate::error::Result;
use crate::generation::GenerationGuard;
use crate::search::{BitVectorIterator, DocIdIterator, EmptyIterator, SearchIterator};

/// Execution hints passed by the query executor.
#[derive(Debug, Clone, Default)]
pub struct ExecuteInfo {
    /// Whether the iterator must land exactly on matches.
    pub strict: bool,
    /// Optional deadline; materialization past it returns a partial
    /// result instead of blocking.
    pub deadline: Option<Instant>,
}

impl ExecuteInfo {
    /// Strict execution without a deadline.
    pub fn strict() -> Self {
        ExecuteInfo {
            strict: true,
            deadline: None,
        }
    }

    /// Attach a deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Materialized postings for one term or range.
#[derive(Debug)]
pub enum Postings {
    /// Sparse representation: sorted document ids.
    DocIds(Vec<u32>),
    /// Dense representation: one bit per document.
    Bits(Arc<AllocatedBitVector>),
}

/// Result of posting materialization, possibly partial.
#[derive(Debug)]
pub struct PostingResult {
    /// The matching documents found before any deadline cut-off.
    pub postings: Postings,
    /// Number of documents that were not examined because the deadline
    /// expired. Zero for a complete result.
    pub timed_out: u32,
}

impl PostingResult {
    /// Whether the scan was cut short by the deadline.
    pub fn is_partial(&self) -> bool {
        self.timed_out > 0
    }
}

/// Access the search context needs into the attribute's document arrays.
pub trait PostingSource: Send + Sync + Debug {
    /// One past the highest document id.
    fn doc_id_limit(&self) -> u32;

    /// Whether a document's array contains any of the matched indices
    /// (sorted by raw index).
    fn doc_matches(&self, doc: u32, matched: &[EnumIndex]) -> bool;
}

/// Search context helper for enumerated attributes, used to eliminate
/// searches for values that are not present at all.
#[derive(Debug)]
pub struct EnumHintSearchContext {
    _guard: GenerationGuard,
    source: Arc<dyn PostingSource>,
    matched: Vec<EnumIndex>,
    unique_values: u32,
    doc_id_limit: u32,
    num_values: u64,
    postings: Option<PostingResult>,
}

impl EnumHintSearchContext {
    /// Build a context from an already-performed dictionary lookup.
    /// `matched` must be sorted by raw index.
    pub(crate) fn new(
        guard: GenerationGuard,
        source: Arc<dyn PostingSource>,
        matched: Vec<EnumIndex>,
        unique_values: u32,
        doc_id_limit: u32,
        num_values: u64,
    ) -> Self {
        EnumHintSearchContext {
            _guard: guard,
            source,
            matched,
            unique_values,
            doc_id_limit,
            num_values,
            postings: None,
        }
    }

    /// Number of unique dictionary values the lookup matched.
    pub fn matched_value_count(&self) -> usize {
        self.matched.len()
    }

    /// Upper-bound estimate of matching documents, derived from the
    /// matched unique-value cardinality and the average per-value
    /// fan-out. Zero exactly when the dictionary matched nothing.
    pub fn approximate_hits(&self) -> u32 {
        if self.matched.is_empty() {
            return 0;
        }
        if self.unique_values == 0 {
            return 0;
        }
        let estimate =
            (self.num_values * self.matched.len() as u64).div_ceil(self.unique_values as u64);
        estimate.clamp(1, self.doc_id_limit as u64) as u32
    }

    /// Materialize the posting list, honoring the deadline in
    /// `execute_info`. A deadline cut-off produces a partial result with
    /// an explicit count of unexamined documents; it is not an error.
    /// No-op if postings were already fetched.
    pub fn fetch_postings(&mut self, execute_info: &ExecuteInfo) -> Result<()> {
        if self.postings.is_some() {
            return Ok(());
        }
        if self.matched.is_empty() {
            self.postings = Some(PostingResult {
                postings: Postings::DocIds(Vec::new()),
                timed_out: 0,
            });
            return Ok(());
        }

        // Dense terms materialize as a bitmap, sparse ones as an id list.
        let dense = self.approximate_hits() as u64 * 8 >= self.doc_id_limit as u64;
        let bits = if dense {
            Some(AllocatedBitVector::new(self.doc_id_limit))
        } else {
            None
        };
        let mut doc_ids = Vec::new();
        let mut timed_out = 0;

        for doc in 0..self.doc_id_limit {
            if let Some(deadline) = execute_info.deadline
                && Instant::now() >= deadline
            {
                timed_out = self.doc_id_limit - doc;
                break;
            }
            if self.source.doc_matches(doc, &self.matched) {
                match &bits {
                    Some(bv) => bv.set_bit(doc),
                    None => doc_ids.push(doc),
                }
            }
        }

        let postings = match bits {
            Some(bv) => Postings::Bits(Arc::new(bv)),
            None => Postings::DocIds(doc_ids),
        };
        debug!(
            "fetched postings for {} matched values (dense: {dense}, timed out: {timed_out})",
            self.matched.len()
        );
        self.postings = Some(PostingResult { postings, timed_out });
        Ok(())
    }

    /// The materialized postings, if fetched.
    pub fn postings(&self) -> Option<&PostingResult> {
        self.postings.as_ref()
    }

    /// Build an iterator over the matching documents in increasing id
    /// order, fetching postings with default execution info if needed.
    ///
    /// The postings materialized here are exact, so strict and
    /// non-strict callers receive the same positioning behavior.
    pub fn create_posting_iterator(&mut self, strict: bool) -> Result<Box<dyn SearchIterator>> {
        self.fetch_postings(&ExecuteInfo {
            strict,
            deadline: None,
        })?;
        let result = self.postings.as_ref().expect("postings fetched above");
        Ok(match &result.postings {
            Postings::DocIds(docs) if docs.is_empty() => Box::new(EmptyIterator::new()),
            Postings::DocIds(docs) => Box::new(DocIdIterator::new(docs.clone())),
            Postings::Bits(bits) => Box::new(BitVectorIterator::new(bits.snapshot())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Change, CollectionType, Config};
    use crate::attribute::multi_enum::MultiValueStringAttribute;

    fn populated_attr() -> Arc<MultiValueStringAttribute> {
        let attr = Arc::new(MultiValueStringAttribute::new(Config::new(
            "tags",
            CollectionType::Array,
        )));
        attr.add_docs(6).unwrap();
        for (doc, values) in [
            vec!["red", "green"],
            vec!["blue"],
            vec!["red"],
            vec![],
            vec!["green", "blue"],
            vec!["red", "blue"],
        ]
        .into_iter()
        .enumerate()
        {
            for value in values {
                attr.append_change(Change::insert(doc as u32, value.to_string()))
                    .unwrap();
            }
        }
        attr.on_commit().unwrap();
        attr
    }

    #[test]
    fn test_absent_term_is_free() {
        let attr = populated_attr();
        let mut context = attr.search_context(&"purple".to_string());
        assert_eq!(context.approximate_hits(), 0);
        let mut it = context.create_posting_iterator(true).unwrap();
        assert!(it.is_exhausted());
    }

    #[test]
    fn test_term_context_finds_documents() {
        let attr = populated_attr();
        let mut context = attr.search_context(&"red".to_string());
        assert!(context.approximate_hits() > 0);
        context.fetch_postings(&ExecuteInfo::strict()).unwrap();
        assert!(!context.postings().unwrap().is_partial());

        let mut it = context.create_posting_iterator(true).unwrap();
        let mut docs = Vec::new();
        while !it.is_exhausted() {
            docs.push(it.doc_id());
            it.next().unwrap();
        }
        assert_eq!(docs, vec![0, 2, 5]);
    }

    #[test]
    fn test_range_context() {
        let attr = populated_attr();
        // "blue".."green" covers blue and green but not red.
        let mut context = attr.range_search_context(&"blue".to_string(), &"green".to_string());
        assert_eq!(context.matched_value_count(), 2);
        let mut it = context.create_posting_iterator(true).unwrap();
        let mut docs = Vec::new();
        while !it.is_exhausted() {
            docs.push(it.doc_id());
            it.next().unwrap();
        }
        assert_eq!(docs, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_expired_deadline_yields_partial_result() {
        let attr = populated_attr();
        let mut context = attr.search_context(&"red".to_string());
        let info = ExecuteInfo::strict().with_deadline(Instant::now());
        context.fetch_postings(&info).unwrap();
        let result = context.postings().unwrap();
        assert!(result.is_partial());
        assert_eq!(result.timed_out, attr.doc_count());
    }

    #[test]
    fn test_fetch_postings_is_idempotent() {
        let attr = populated_attr();
        let mut context = attr.search_context(&"red".to_string());
        context.fetch_postings(&ExecuteInfo::strict()).unwrap();
        // Second fetch with an expired deadline must not replace the
        // complete result.
        let info = ExecuteInfo::strict().with_deadline(Instant::now());
        context.fetch_postings(&info).unwrap();
        assert!(!context.postings().unwrap().is_partial());
    }

    #[test]
    fn test_dense_term_uses_bitmap() {
        let attr = Arc::new(MultiValueStringAttribute::new(Config::new(
            "dense",
            CollectionType::Array,
        )));
        attr.add_docs(64).unwrap();
        for doc in 0..64 {
            attr.append_change(Change::insert(doc, "common".to_string()))
                .unwrap();
        }
        attr.on_commit().unwrap();

        let mut context = attr.search_context(&"common".to_string());
        context.fetch_postings(&ExecuteInfo::strict()).unwrap();
        assert!(matches!(
            context.postings().unwrap().postings,
            Postings::Bits(_)
        ));
        let mut it = context.create_posting_iterator(true).unwrap();
        assert_eq!(it.cost(), 64);
        assert!(it.seek(63).unwrap());
        assert_eq!(it.doc_id(), 63);
    }
}
