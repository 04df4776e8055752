//! Chunk container writer and reader.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use backy_core::Feature;

use crate::error::{FormatError, Result};

/// Bytes written between durable flushes.
pub const DEFAULT_FLUSH_THRESHOLD: u64 = 4 * 1024 * 1024;

/// Ceiling on the JSON metadata of a single chunk.
const METADATA_CEILING: usize = 64 * 1024;

/// The JSON object preceding every payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub feature_name: String,
    pub size: usize,
}

/// Append-only writer of feature-tagged chunks.
///
/// The writer keeps a running byte counter and issues a flush + fsync each
/// time the counter crosses the threshold, so a crash loses at most one
/// window of chunks and never corrupts earlier ones.
pub struct ChunkWriter {
    file: File,
    threshold: u64,
    written_since_sync: u64,
}

impl ChunkWriter {
    /// Create (truncate) the container file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        Self::with_threshold(path, DEFAULT_FLUSH_THRESHOLD)
    }

    pub fn with_threshold(path: &Path, threshold: u64) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file,
            threshold,
            written_since_sync: 0,
        })
    }

    /// Append one chunk: length prefix + metadata in a single write call,
    /// then the payload.
    pub fn write(&mut self, feature: Feature, payload: &[u8]) -> Result<()> {
        let metadata = ChunkMetadata {
            feature_name: feature.as_str().to_string(),
            size: payload.len(),
        };
        let metadata_bytes = serde_json::to_vec(&metadata)?;
        if metadata_bytes.len() > METADATA_CEILING {
            return Err(FormatError::MetadataTooLarge {
                limit: METADATA_CEILING,
                actual: metadata_bytes.len(),
            });
        }

        let mut header = Vec::with_capacity(4 + metadata_bytes.len());
        header.extend_from_slice(&(metadata_bytes.len() as u32).to_be_bytes());
        header.extend_from_slice(&metadata_bytes);
        self.file.write_all(&header)?;
        self.file.write_all(payload)?;

        self.written_since_sync += (header.len() + payload.len()) as u64;
        if self.written_since_sync >= self.threshold {
            self.file.flush()?;
            self.file.sync_data()?;
            self.written_since_sync = 0;
            debug!(feature = %feature, "container synced to disk");
        }
        Ok(())
    }

    /// Flush and sync any buffered tail.
    pub fn finish(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Lazy reader over a container file.
///
/// Iteration yields `(feature, payload)` pairs in file order. A clean end of
/// file at a chunk boundary terminates the iterator; a short read inside a
/// declared region is an error. A sub-prefix tail after at least one
/// complete chunk is logged as trailing garbage and ends iteration without
/// failing.
pub struct ChunkReader {
    file: File,
    chunks_read: usize,
    done: bool,
}

impl ChunkReader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            chunks_read: 0,
            done: false,
        })
    }

    /// Read up to `buf.len()` bytes, tolerating EOF. Returns the number of
    /// bytes actually read.
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }

    fn read_chunk(&mut self) -> Result<Option<(Feature, Vec<u8>)>> {
        let mut prefix = [0u8; 4];
        let got = self.read_up_to(&mut prefix)?;
        if got == 0 {
            debug!("no more data to read from container");
            return Ok(None);
        }
        if got < 4 {
            if self.chunks_read > 0 {
                return Err(FormatError::TrailingGarbage(got));
            }
            return Err(FormatError::CorruptMetadata(format!(
                "length prefix is {got} bytes, expected 4"
            )));
        }

        let metadata_len = u32::from_be_bytes(prefix) as usize;
        if metadata_len > METADATA_CEILING {
            return Err(FormatError::MetadataTooLarge {
                limit: METADATA_CEILING,
                actual: metadata_len,
            });
        }

        let mut metadata_bytes = vec![0u8; metadata_len];
        let got = self.read_up_to(&mut metadata_bytes)?;
        if got < metadata_len {
            return Err(FormatError::CorruptMetadata(format!(
                "metadata truncated at {got} of {metadata_len} bytes"
            )));
        }
        let metadata: ChunkMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|err| FormatError::CorruptMetadata(err.to_string()))?;
        let feature: Feature = metadata
            .feature_name
            .parse()
            .map_err(|_| FormatError::UnknownFeature(metadata.feature_name.clone()))?;

        let mut payload = vec![0u8; metadata.size];
        let got = self.read_up_to(&mut payload)?;
        if got < metadata.size {
            return Err(FormatError::CorruptPayload {
                feature,
                expected: metadata.size,
                actual: got,
            });
        }

        self.chunks_read += 1;
        Ok(Some((feature, payload)))
    }
}

impl Iterator for ChunkReader {
    type Item = Result<(Feature, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            // Recoverable: the stream up to here is intact.
            Err(FormatError::TrailingGarbage(bytes)) => {
                self.done = true;
                warn!(bytes, "trailing garbage after the last complete chunk");
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn container_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("bundle.backy")
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = container_path(&dir);

        let mut writer = ChunkWriter::create(&path).unwrap();
        writer
            .write(Feature::Tables, b"CREATE TABLE t(id INT)")
            .unwrap();
        writer
            .write(Feature::Data, b"INSERT INTO t VALUES (1)")
            .unwrap();
        writer.finish().unwrap();

        let chunks: Vec<(Feature, Vec<u8>)> = ChunkReader::open(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            chunks,
            vec![
                (Feature::Tables, b"CREATE TABLE t(id INT)".to_vec()),
                (Feature::Data, b"INSERT INTO t VALUES (1)".to_vec()),
            ]
        );
    }

    #[test]
    fn empty_file_reads_as_empty_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = container_path(&dir);
        fs::write(&path, b"").unwrap();

        let chunks: Vec<_> = ChunkReader::open(&path).unwrap().collect();
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_length_prefix_is_corrupt_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = container_path(&dir);
        fs::write(&path, [0x01, 0x02, 0x03]).unwrap();

        let result = ChunkReader::open(&path).unwrap().next().unwrap();
        assert!(matches!(result, Err(FormatError::CorruptMetadata(_))));
    }

    #[test]
    fn truncated_metadata_is_corrupt_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = container_path(&dir);
        let metadata = serde_json::to_vec(&ChunkMetadata {
            feature_name: "tables".into(),
            size: 5,
        })
        .unwrap();
        let mut bytes = (metadata.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&metadata[..3]);
        fs::write(&path, bytes).unwrap();

        let result = ChunkReader::open(&path).unwrap().next().unwrap();
        assert!(matches!(result, Err(FormatError::CorruptMetadata(_))));
    }

    #[test]
    fn truncated_payload_is_corrupt_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = container_path(&dir);
        let metadata = serde_json::to_vec(&ChunkMetadata {
            feature_name: "data".into(),
            size: 10,
        })
        .unwrap();
        let mut bytes = (metadata.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&metadata);
        bytes.extend_from_slice(b"abc");
        fs::write(&path, bytes).unwrap();

        let result = ChunkReader::open(&path).unwrap().next().unwrap();
        match result {
            Err(FormatError::CorruptPayload {
                feature,
                expected,
                actual,
            }) => {
                assert_eq!(feature, Feature::Data);
                assert_eq!(expected, 10);
                assert_eq!(actual, 3);
            }
            other => panic!("expected CorruptPayload, got {other:?}"),
        }
    }

    #[test]
    fn sub_prefix_tail_after_complete_chunk_ends_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = container_path(&dir);

        let mut writer = ChunkWriter::create(&path).unwrap();
        writer.write(Feature::Views, b"CREATE VIEW v AS SELECT 1").unwrap();
        writer.finish().unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0xde, 0xad]);
        fs::write(&path, bytes).unwrap();

        let chunks: Vec<_> = ChunkReader::open(&path).unwrap().collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_ok());
    }

    #[test]
    fn unknown_feature_tag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = container_path(&dir);
        let metadata = br#"{"feature_name":"indexes","size":0}"#;
        let mut bytes = (metadata.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(metadata);
        fs::write(&path, bytes).unwrap();

        let result = ChunkReader::open(&path).unwrap().next().unwrap();
        assert!(matches!(result, Err(FormatError::UnknownFeature(_))));
    }

    #[test]
    fn threshold_crossing_resets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = container_path(&dir);

        let mut writer = ChunkWriter::with_threshold(&path, 16).unwrap();
        writer.write(Feature::Data, &[b'x'; 64]).unwrap();
        assert_eq!(writer.written_since_sync, 0);
        writer.write(Feature::Data, b"y").unwrap();
        assert!(writer.written_since_sync > 0);
        writer.finish().unwrap();
    }
}
