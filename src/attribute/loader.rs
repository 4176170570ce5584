//! Attribute persistence, read side.
//!
//! [`AttributeReader::open`] reads and validates the header eagerly, so
//! the caller can check the collection shape before committing to the
//! full payload. [`read_payload`] consumes the rest of the file and
//! verifies the trailing checksum before returning anything, so corrupt
//! data never reaches the attribute.
//!
//! [`read_payload`]: AttributeReader::read_payload

use log::debug;

use crate::attribute::saver::{AttributeHeader, AttributeSaveTarget};
use crate::enumstore::AttributeValue;
use crate::error::{KontosError, Result};
use crate::storage::structured::StructReader;

/// Deserialized attribute file contents.
#[derive(Debug)]
pub struct LoadedAttribute<V> {
    /// Unique values in dictionary order.
    pub values: Vec<V>,
    /// Per document, the (value ordinal, weight) slots.
    pub docs: Vec<Vec<(u32, i32)>>,
}

/// Reader over a persisted attribute file.
#[derive(Debug)]
pub struct AttributeReader {
    reader: StructReader,
    header: AttributeHeader,
}

impl AttributeReader {
    /// Open the attribute file at `target` and read its header.
    pub fn open(target: &AttributeSaveTarget) -> Result<Self> {
        let mut reader = target.open_reader()?;
        let header = AttributeHeader::read(&mut reader)?;
        Ok(AttributeReader { reader, header })
    }

    /// The validated file header.
    pub fn header(&self) -> &AttributeHeader {
        &self.header
    }

    /// Read the value table and document arrays, then verify the file
    /// checksum. Consumes the reader.
    pub fn read_payload<V: AttributeValue>(mut self) -> Result<LoadedAttribute<V>> {
        let mut values = Vec::with_capacity(self.header.unique_values as usize);
        for _ in 0..self.header.unique_values {
            values.push(V::read_from(&mut self.reader)?);
        }

        let mut total = 0u64;
        let mut docs = Vec::with_capacity(self.header.doc_count as usize);
        for _ in 0..self.header.doc_count {
            let len = self.reader.read_vu32()? as usize;
            let mut slots = Vec::with_capacity(len);
            for _ in 0..len {
                let ordinal = self.reader.read_vu32()?;
                if ordinal >= self.header.unique_values {
                    return Err(KontosError::corrupted(format!(
                        "value ordinal {ordinal} out of range (table size {})",
                        self.header.unique_values
                    )));
                }
                let weight = self.reader.read_vi64()?;
                let weight = i32::try_from(weight).map_err(|_| {
                    KontosError::corrupted(format!("weight {weight} out of range"))
                })?;
                slots.push((ordinal, weight));
            }
            total += len as u64;
            docs.push(slots);
        }

        if total != self.header.total_values {
            return Err(KontosError::corrupted(format!(
                "slot count {total} does not match header total {}",
                self.header.total_values
            )));
        }
        self.reader.verify_checksum()?;
        debug!(
            "read attribute payload ({} docs, {} unique values)",
            docs.len(),
            values.len()
        );
        Ok(LoadedAttribute { values, docs })
    }
}
