//! # Kontos
//!
//! A concurrent multi-value enumerated attribute store for columnar
//! search engines.
//!
//! ## Features
//!
//! - Deduplicated value dictionary with reference counting
//! - Per-document variable-length arrays of (value, weight) pairs
//! - Single-writer / multi-reader discipline with generation-based
//!   memory reclamation (readers never block on the writer)
//! - Growable bit vectors with guard-bit scan termination
//! - Dictionary-hinted search contexts producing posting iterators
//! - Snapshot-consistent save and bulk load

pub mod attribute;
pub mod bitvector;
pub mod enumstore;
pub mod error;
pub mod generation;
pub mod multivalue;
pub mod search;
pub mod storage;
pub mod util;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
