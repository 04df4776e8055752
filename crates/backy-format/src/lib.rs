//! # Backy Container Format
//!
//! The `.backy` file format: a concatenation of length-prefixed,
//! feature-tagged chunks written and read lazily.
//!
//! On the wire each chunk is
//!
//! ```text
//! chunk := length(4 bytes, big-endian) metadata(length bytes) payload(metadata.size bytes)
//! metadata := UTF-8 JSON { "feature_name": <tag>, "size": <payload bytes> }
//! ```
//!
//! Readers never trust the file size; they follow length prefixes only.
//! Truncation at a chunk boundary is a clean end of stream, truncation
//! inside a declared region is corruption.

pub mod chunk;
pub mod convert;
pub mod error;

pub use chunk::{ChunkMetadata, ChunkReader, ChunkWriter, DEFAULT_FLUSH_THRESHOLD};
pub use convert::{bytes_to_str, str_to_bytes};
pub use error::{FormatError, Result};
