//! Checksummed binary struct I/O.
//!
//! [`StructWriter`] and [`StructReader`] wrap storage streams with a
//! rolling crc32 over every byte written or read. The writer appends the
//! checksum on [`StructWriter::finish`]; the reader validates it in
//! [`StructReader::verify_checksum`] after consuming the payload.
//!
//! Both types implement `Write`/`Read`, so the varint helpers in
//! [`crate::util::varint`] stream through them directly.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{KontosError, Result};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint;

/// A structured writer with a rolling checksum.
#[derive(Debug)]
pub struct StructWriter {
    writer: Box<dyn StorageOutput>,
    hasher: Hasher,
    position: u64,
}

impl StructWriter {
    /// Wrap a storage output stream.
    pub fn new(writer: Box<dyn StorageOutput>) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Bytes written so far (checksum excluded).
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write a fixed-width u32 (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write a fixed-width u64 (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_all(&[value])?;
        Ok(())
    }

    /// Write a varint-encoded u32.
    pub fn write_vu32(&mut self, value: u32) -> Result<()> {
        varint::write_u32(self, value)?;
        Ok(())
    }

    /// Write a varint-encoded u64.
    pub fn write_vu64(&mut self, value: u64) -> Result<()> {
        varint::write_u64(self, value)?;
        Ok(())
    }

    /// Write a zigzag varint-encoded i64.
    pub fn write_vi64(&mut self, value: i64) -> Result<()> {
        varint::write_i64(self, value)?;
        Ok(())
    }

    /// Write a length-prefixed byte slice.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_vu64(bytes.len() as u64)?;
        self.write_all(bytes)?;
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Append the checksum, flush, and close the stream.
    pub fn finish(mut self) -> Result<()> {
        let checksum = self.hasher.clone().finalize();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.flush_and_sync()?;
        self.writer.close()
    }
}

impl Write for StructWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// A structured reader validating the trailing checksum.
#[derive(Debug)]
pub struct StructReader {
    reader: Box<dyn StorageInput>,
    hasher: Hasher,
    position: u64,
}

impl StructReader {
    /// Wrap a storage input stream.
    pub fn new(reader: Box<dyn StorageInput>) -> Self {
        StructReader {
            reader,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Bytes read so far (checksum excluded).
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read a fixed-width u32 (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a fixed-width u64 (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a varint-encoded u32.
    pub fn read_vu32(&mut self) -> Result<u32> {
        varint::read_u32(self)
    }

    /// Read a varint-encoded u64.
    pub fn read_vu64(&mut self) -> Result<u64> {
        varint::read_u64(self)
    }

    /// Read a zigzag varint-encoded i64.
    pub fn read_vi64(&mut self) -> Result<i64> {
        varint::read_i64(self)
    }

    /// Read a length-prefixed byte slice.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_vu64()? as usize;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| KontosError::corrupted("invalid UTF-8 string"))
    }

    /// Consume the trailing checksum and compare it against the rolling
    /// checksum of everything read so far.
    pub fn verify_checksum(mut self) -> Result<()> {
        let expected = self.hasher.clone().finalize();
        let stored = self.reader.read_u32::<LittleEndian>()?;
        if stored != expected {
            return Err(KontosError::corrupted(format!(
                "checksum mismatch: stored {stored:#010x}, computed {expected:#010x}"
            )));
        }
        Ok(())
    }
}

impl Read for StructReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.reader.read(buf)?;
        self.hasher.update(&buf[..read]);
        self.position += read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn round_trip_storage() -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut writer = StructWriter::new(storage.create_output("t").unwrap());
        writer.write_u32(0xDEAD_BEEF).unwrap();
        writer.write_vu64(1_000_000).unwrap();
        writer.write_vi64(-42).unwrap();
        writer.write_string("kontos").unwrap();
        writer.finish().unwrap();
        storage
    }

    #[test]
    fn test_struct_round_trip() {
        let storage = round_trip_storage();
        let mut reader = StructReader::new(storage.open_input("t").unwrap());
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_vu64().unwrap(), 1_000_000);
        assert_eq!(reader.read_vi64().unwrap(), -42);
        assert_eq!(reader.read_string().unwrap(), "kontos");
        reader.verify_checksum().unwrap();
    }

    #[test]
    fn test_corruption_detected() {
        let storage = round_trip_storage();
        // Flip a payload byte.
        let mut input = storage.open_input("t").unwrap();
        let mut data = Vec::new();
        input.read_to_end(&mut data).unwrap();
        data[2] ^= 0xFF;
        let mut output = storage.create_output("t").unwrap();
        output.write_all(&data).unwrap();
        output.close().unwrap();

        let mut reader = StructReader::new(storage.open_input("t").unwrap());
        let _ = reader.read_u32().unwrap();
        let _ = reader.read_vu64().unwrap();
        let _ = reader.read_vi64().unwrap();
        let _ = reader.read_string();
        assert!(reader.verify_checksum().is_err());
    }
}
