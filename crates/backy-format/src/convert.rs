//! Typed byte/text conversion at the container boundary.
//!
//! The extractor produces text and the container carries bytes; these
//! helpers keep the conversion strict in both directions.

use crate::error::Result;

/// UTF-8 encode a statement for the container.
pub fn str_to_bytes(data: &str) -> Vec<u8> {
    data.as_bytes().to_vec()
}

/// Strictly decode a chunk payload back into text.
pub fn bytes_to_str(data: Vec<u8>) -> Result<String> {
    Ok(String::from_utf8(data)?)
}
