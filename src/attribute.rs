//! Multi-value enumerated attributes.
//!
//! An attribute maps documents to sets (or weighted sets) of values,
//! stored as compact enum indices into a shared dictionary. Mutations
//! arrive as an ordered change feed and become visible atomically at
//! commit; readers run lock-free against the committed state under a
//! generation guard.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

pub mod loader;
pub mod multi_enum;
pub mod saver;

pub use multi_enum::MultiValueEnumAttribute;

/// Document identifier.
pub type DocId = u32;

/// Raw enum handle exposed through the read API.
pub type EnumHandle = u32;

/// How a document's values are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    /// Unweighted multi-value array.
    Array,
    /// Set of values with per-value weights.
    WeightedSet,
}

/// Attribute configuration, immutable for the attribute's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Attribute (field) name; also the persistence base name.
    pub name: String,
    /// Collection shape.
    pub collection: CollectionType,
}

impl Config {
    /// Create a new configuration.
    pub fn new<S: Into<String>>(name: S, collection: CollectionType) -> Self {
        Config {
            name: name.into(),
            collection,
        }
    }
}

/// Lifecycle state of an attribute instance.
///
/// Saving is not a distinct state: it runs concurrently with `Active`
/// under a generation guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeState {
    /// Being bulk-loaded; not yet readable.
    Loading = 0,
    /// Serving reads and accepting commits.
    Active = 1,
    /// Shut down; all mutations rejected.
    Closed = 2,
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: AttributeState) -> Self {
        StateCell(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> AttributeState {
        match self.0.load(Ordering::Acquire) {
            0 => AttributeState::Loading,
            1 => AttributeState::Active,
            _ => AttributeState::Closed,
        }
    }

    pub(crate) fn store(&self, state: AttributeState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// One operation of the change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOp<V> {
    /// Add one value to the document's set, overwriting the weight if
    /// the value is already present.
    Insert {
        /// Value to add.
        value: V,
        /// Weight (ignored for array collections).
        weight: i32,
    },
    /// Replace the document's whole set.
    Update {
        /// The new (value, weight) set.
        values: Vec<(V, i32)>,
    },
    /// Remove all values from the document.
    Clear,
}

/// A per-document change record.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<V> {
    /// Target document.
    pub doc: DocId,
    /// Operation to apply.
    pub op: ChangeOp<V>,
}

impl<V> Change<V> {
    /// Insert one value with weight 1.
    pub fn insert(doc: DocId, value: V) -> Self {
        Change {
            doc,
            op: ChangeOp::Insert { value, weight: 1 },
        }
    }

    /// Insert one value with an explicit weight.
    pub fn insert_weighted(doc: DocId, value: V, weight: i32) -> Self {
        Change {
            doc,
            op: ChangeOp::Insert { value, weight },
        }
    }

    /// Replace the document's whole set.
    pub fn update(doc: DocId, values: Vec<(V, i32)>) -> Self {
        Change {
            doc,
            op: ChangeOp::Update { values },
        }
    }

    /// Remove all values from the document.
    pub fn clear(doc: DocId) -> Self {
        Change {
            doc,
            op: ChangeOp::Clear,
        }
    }
}

/// A resolved (handle, weight) pair returned by the weighted read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightedEnum {
    /// Enum handle of the value.
    pub handle: EnumHandle,
    /// Weight of the value for this document.
    pub weight: i32,
}
