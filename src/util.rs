//! Small shared utilities.

pub mod varint;
