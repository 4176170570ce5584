//! Variable-length integer encoding over arbitrary readers and writers.
//!
//! Seven data bits per byte with a continuation bit, least significant
//! group first, as used by protocol buffers.

use std::io::{Read, Write};

use crate::error::{KontosError, Result};

/// Write a u64 using variable-length encoding. Returns the number of
/// bytes written.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let mut val = value;
    let mut written = 0;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;
        if val != 0 {
            byte |= 0x80;
        }
        writer.write_all(&[byte])?;
        written += 1;
        if val == 0 {
            return Ok(written);
        }
    }
}

/// Read a variable-length encoded u64.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    loop {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        let byte = buf[0];

        if shift >= 64 {
            return Err(KontosError::corrupted("varint overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        if (byte & 0x80) == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Write a u32 using variable-length encoding.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<usize> {
    write_u64(writer, value as u64)
}

/// Read a variable-length encoded u32.
pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let value = read_u64(reader)?;
    u32::try_from(value).map_err(|_| KontosError::corrupted("varint exceeds u32"))
}

/// Write an i64 using zigzag + variable-length encoding.
pub fn write_i64<W: Write>(writer: &mut W, value: i64) -> Result<usize> {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    write_u64(writer, zigzag)
}

/// Read a zigzag + variable-length encoded i64.
pub fn read_i64<R: Read>(reader: &mut R) -> Result<i64> {
    let zigzag = read_u64(reader)?;
    Ok(((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64))
}
