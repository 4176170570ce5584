//! Deduplicated value storage for enumerated attributes.
//!
//! Every unique attribute value is stored once and addressed through an
//! [`EnumIndex`]. The [`dictionary::EnumStoreDictionary`] keeps the values
//! ordered for range lookups and reference-counted for deferred
//! compaction.

use std::fmt::Debug;

use crate::error::{KontosError, Result};
use crate::storage::structured::{StructReader, StructWriter};

pub mod comparator;
pub mod dictionary;

pub use comparator::{CaseFoldComparator, EntryComparator, NaturalComparator};
pub use dictionary::{EnumStoreBatchUpdater, EnumStoreDictionary};

/// Opaque handle identifying one unique stored value.
///
/// Two documents holding equal values always share the same index; the
/// backing value is immutable once visible to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnumIndex(u32);

impl EnumIndex {
    /// Wrap a raw slot number.
    pub fn new(raw: u32) -> Self {
        EnumIndex(raw)
    }

    /// The raw slot number.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// A value type storable in an enum store.
///
/// Requires a total order (which defines dictionary and range-query
/// order) and a binary representation for attribute persistence.
pub trait AttributeValue: Clone + Ord + Debug + Send + Sync + 'static {
    /// Serialize this value.
    fn write_to(&self, writer: &mut StructWriter) -> Result<()>;

    /// Deserialize one value.
    fn read_from(reader: &mut StructReader) -> Result<Self>;
}

impl AttributeValue for i64 {
    fn write_to(&self, writer: &mut StructWriter) -> Result<()> {
        writer.write_vi64(*self)
    }

    fn read_from(reader: &mut StructReader) -> Result<Self> {
        reader.read_vi64()
    }
}

impl AttributeValue for String {
    fn write_to(&self, writer: &mut StructWriter) -> Result<()> {
        writer.write_string(self)
    }

    fn read_from(reader: &mut StructReader) -> Result<Self> {
        reader.read_string()
    }
}

/// Validate that a bulk-load buffer is strictly ascending.
pub(crate) fn check_sorted_unique<V, C>(values: &[V], comparator: &C) -> Result<()>
where
    V: AttributeValue,
    C: EntryComparator<V>,
{
    for pair in values.windows(2) {
        if comparator.compare(&pair[0], &pair[1]) != std::cmp::Ordering::Less {
            return Err(KontosError::corrupted(
                "enumerated value table is not sorted and unique",
            ));
        }
    }
    Ok(())
}
