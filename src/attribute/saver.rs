//! Attribute persistence, write side.
//!
//! A saver is captured on the writer thread as a snapshot (value table,
//! raw-index remap and the per-document arrays) and can then serialize
//! to storage in the background while commits continue. The generation
//! guard it holds keeps every snapshotted dictionary entry alive for the
//! saver's lifetime.
//!
//! File layout (one `.attr` file, checksummed by [`StructWriter`]):
//! header, the unique values in dictionary order, then per document a
//! slot count followed by (value ordinal, weight) pairs.

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::attribute::CollectionType;
use crate::enumstore::AttributeValue;
use crate::error::{KontosError, Result};
use crate::generation::GenerationGuard;
use crate::multivalue::{ArrayRef, MultiValue};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

const ATTRIBUTE_MAGIC: u32 = 0x4B_4E_54_53; // "KNTS"
const ATTRIBUTE_VERSION: u32 = 1;

/// Fixed-size header at the start of an attribute file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeHeader {
    /// Collection shape the data was saved with.
    pub collection: CollectionType,
    /// Number of documents.
    pub doc_count: u32,
    /// Number of unique values in the value table.
    pub unique_values: u32,
    /// Total number of slots across all documents.
    pub total_values: u64,
}

impl AttributeHeader {
    pub(crate) fn write(&self, writer: &mut StructWriter) -> Result<()> {
        writer.write_u32(ATTRIBUTE_MAGIC)?;
        writer.write_u32(ATTRIBUTE_VERSION)?;
        writer.write_u8(match self.collection {
            CollectionType::Array => 0,
            CollectionType::WeightedSet => 1,
        })?;
        writer.write_u32(self.doc_count)?;
        writer.write_u32(self.unique_values)?;
        writer.write_u64(self.total_values)?;
        Ok(())
    }

    pub(crate) fn read(reader: &mut StructReader) -> Result<Self> {
        let magic = reader.read_u32()?;
        if magic != ATTRIBUTE_MAGIC {
            return Err(KontosError::corrupted(format!(
                "bad attribute file magic {magic:#010x}"
            )));
        }
        let version = reader.read_u32()?;
        if version != ATTRIBUTE_VERSION {
            return Err(KontosError::corrupted(format!(
                "unsupported attribute file version {version}"
            )));
        }
        let collection = match reader.read_u8()? {
            0 => CollectionType::Array,
            1 => CollectionType::WeightedSet,
            other => {
                return Err(KontosError::corrupted(format!(
                    "unknown collection type byte {other}"
                )));
            }
        };
        Ok(AttributeHeader {
            collection,
            doc_count: reader.read_u32()?,
            unique_values: reader.read_u32()?,
            total_values: reader.read_u64()?,
        })
    }
}

/// Where an attribute persists: a storage backend plus a base name.
#[derive(Debug, Clone)]
pub struct AttributeSaveTarget {
    storage: Arc<dyn Storage>,
    base: String,
}

impl AttributeSaveTarget {
    /// Create a target; data lands in `{base}.attr` inside `storage`.
    pub fn new<S: Into<String>>(storage: Arc<dyn Storage>, base: S) -> Self {
        AttributeSaveTarget {
            storage,
            base: base.into(),
        }
    }

    /// The attribute file name.
    pub fn file_name(&self) -> String {
        format!("{}.attr", self.base)
    }

    /// Whether a previously saved attribute file exists.
    pub fn exists(&self) -> bool {
        self.storage.file_exists(&self.file_name())
    }

    pub(crate) fn create_writer(&self) -> Result<StructWriter> {
        Ok(StructWriter::new(
            self.storage.create_output(&self.file_name())?,
        ))
    }

    pub(crate) fn open_reader(&self) -> Result<StructReader> {
        Ok(StructReader::new(
            self.storage.open_input(&self.file_name())?,
        ))
    }
}

/// A snapshot-consistent saver for one multi-value attribute.
///
/// Created by `MultiValueEnumAttribute::on_init_save`.
#[derive(Debug)]
pub struct MultiValueAttributeSaver<V: AttributeValue, T: MultiValue> {
    _guard: GenerationGuard,
    header: AttributeHeader,
    values: Vec<V>,
    remap: AHashMap<u32, u32>,
    docs: Vec<ArrayRef<T>>,
}

impl<V: AttributeValue, T: MultiValue> MultiValueAttributeSaver<V, T> {
    pub(crate) fn new(
        guard: GenerationGuard,
        header: AttributeHeader,
        values: Vec<V>,
        remap: AHashMap<u32, u32>,
        docs: Vec<ArrayRef<T>>,
    ) -> Self {
        MultiValueAttributeSaver {
            _guard: guard,
            header,
            values,
            remap,
            docs,
        }
    }

    /// The header that will be written.
    pub fn header(&self) -> &AttributeHeader {
        &self.header
    }

    /// Serialize the snapshot to `target`.
    pub fn save(&self, target: &AttributeSaveTarget) -> Result<()> {
        let mut writer = target.create_writer()?;
        self.header.write(&mut writer)?;

        for value in &self.values {
            value.write_to(&mut writer)?;
        }

        for array in &self.docs {
            writer.write_vu32(array.len() as u32)?;
            for slot in array.iter() {
                let raw = slot.index().raw();
                // The snapshot is internally consistent: every stored
                // index was captured in the remap.
                let ordinal = *self
                    .remap
                    .get(&raw)
                    .unwrap_or_else(|| panic!("snapshot references unmapped enum index {raw}"));
                writer.write_vu32(ordinal)?;
                writer.write_vi64(slot.weight() as i64)?;
            }
        }

        let bytes = writer.position();
        writer.finish()?;
        debug!(
            "saved attribute file {} ({} docs, {} unique values, {bytes} bytes)",
            target.file_name(),
            self.header.doc_count,
            self.header.unique_values
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_header_round_trip() {
        let storage = MemoryStorage::new();
        let target = AttributeSaveTarget::new(Arc::new(storage), "tags");
        let header = AttributeHeader {
            collection: CollectionType::WeightedSet,
            doc_count: 7,
            unique_values: 3,
            total_values: 12,
        };
        let mut writer = target.create_writer().unwrap();
        header.write(&mut writer).unwrap();
        writer.finish().unwrap();

        let mut reader = target.open_reader().unwrap();
        assert_eq!(AttributeHeader::read(&mut reader).unwrap(), header);
        reader.verify_checksum().unwrap();
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let storage = MemoryStorage::new();
        let target = AttributeSaveTarget::new(Arc::new(storage), "tags");
        let mut writer = target.create_writer().unwrap();
        writer.write_u32(0x1234_5678).unwrap();
        writer.write_u32(ATTRIBUTE_VERSION).unwrap();
        writer.finish().unwrap();

        let mut reader = target.open_reader().unwrap();
        assert!(AttributeHeader::read(&mut reader).is_err());
    }

    #[test]
    fn test_target_file_name_and_exists() {
        let storage = MemoryStorage::new();
        let target = AttributeSaveTarget::new(Arc::new(storage), "tags");
        assert_eq!(target.file_name(), "tags.attr");
        assert!(!target.exists());
        target.create_writer().unwrap().finish().unwrap();
        assert!(target.exists());
    }
}
