//! Storage abstraction used by attribute persistence.
//!
//! A small pluggable facade: attribute savers and loaders speak to
//! [`Storage`] and never to the filesystem directly, so tests run against
//! the in-memory backend and production uses files.

use std::fmt::Debug;
use std::io::{Read, Seek, Write};

use crate::error::Result;

pub mod file;
pub mod memory;
pub mod structured;

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + Debug {
    /// Get the total size of the input stream in bytes.
    fn size(&self) -> Result<u64>;

    /// Close the input stream.
    fn close(&mut self) -> Result<()>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + Debug {
    /// Flush buffered data and sync it to the backing store.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Close the output stream, committing its contents.
    fn close(&mut self) -> Result<()>;
}

/// A trait for storage backends that can store and retrieve named streams.
pub trait Storage: Send + Sync + Debug {
    /// Create (or overwrite) a named output stream.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Open an existing named input stream.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Check whether a named stream exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a named stream.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all stream names in this storage.
    fn list_files(&self) -> Result<Vec<String>>;
}
