//! # Backy Compression
//!
//! Archive adapters behind one small contract: `compress` turns a directory
//! into an archive holding the directory's tree (and removes the
//! directory); `decompress` expands an archive adjacent to itself (and
//! removes the archive). Formats: zip, tar, tar+gzip.

pub mod error;
pub mod targz;
pub mod tarball;
pub mod zipfile;

use std::path::{Path, PathBuf};

use backy_core::{CompressionKind, CompressionLevel};

pub use error::{CompressionError, Result};
pub use targz::TarGzCompressor;
pub use tarball::TarCompressor;
pub use zipfile::ZipCompressor;

/// The compression adapter contract.
pub trait Compressor: Send + Sync {
    /// The format tag recorded in the metadata sidecar.
    fn kind(&self) -> CompressionKind;

    /// Archive the input directory's tree next to it and remove the input.
    /// Returns the archive path.
    fn compress(&self, input: &Path) -> Result<PathBuf>;

    /// Expand the archive adjacent to itself and remove the archive.
    /// Returns the expanded directory path.
    fn decompress(&self, archive: &Path) -> Result<PathBuf>;
}

/// Select an adapter for the configured format.
pub fn compressor_for(kind: CompressionKind, level: CompressionLevel) -> Box<dyn Compressor> {
    match kind {
        CompressionKind::Zip => Box::new(ZipCompressor::new(level)),
        CompressionKind::Tar => Box::new(TarCompressor::new()),
        CompressionKind::Targz => Box::new(TarGzCompressor::new(level)),
    }
}

/// Recursively collect the regular files under `root`, paths relative to
/// `root`, sorted for deterministic archives.
pub(crate) fn relative_files(root: &Path) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, root, out)?;
            } else if path.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .expect("walked path is under root")
                    .to_path_buf();
                out.push(relative);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

/// Numeric effort level shared by the deflate-based formats.
pub(crate) fn numeric_level(level: CompressionLevel) -> u32 {
    match level {
        CompressionLevel::Fast => 1,
        CompressionLevel::Balanced => 6,
        CompressionLevel::Best => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn seed_input(base: &Path) -> PathBuf {
        let input = base.join("backup");
        fs::create_dir_all(input.join("nested")).unwrap();
        fs::write(input.join("schema.sql"), b"CREATE TABLE t (id INT);").unwrap();
        fs::write(input.join("nested").join("data.sql"), b"INSERT INTO t VALUES (1);").unwrap();
        input
    }

    fn roundtrip(kind: CompressionKind) {
        let dir = tempfile::tempdir().unwrap();
        let input = seed_input(dir.path());
        let compressor = compressor_for(kind, CompressionLevel::Balanced);

        let archive = compressor.compress(&input).unwrap();
        assert!(archive.is_file());
        assert!(!input.exists(), "input directory must be removed");
        assert!(archive
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with(kind.extension()));

        let expanded = compressor.decompress(&archive).unwrap();
        assert!(!archive.exists(), "archive must be removed");
        assert_eq!(expanded, dir.path().join("backup"));
        assert_eq!(
            fs::read(expanded.join("schema.sql")).unwrap(),
            b"CREATE TABLE t (id INT);"
        );
        assert_eq!(
            fs::read(expanded.join("nested").join("data.sql")).unwrap(),
            b"INSERT INTO t VALUES (1);"
        );
    }

    #[test]
    fn zip_roundtrip() {
        roundtrip(CompressionKind::Zip);
    }

    #[test]
    fn tar_roundtrip() {
        roundtrip(CompressionKind::Tar);
    }

    #[test]
    fn targz_roundtrip() {
        roundtrip(CompressionKind::Targz);
    }

    #[test]
    fn relative_files_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let input = seed_input(dir.path());
        let files = relative_files(&input).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("nested/data.sql"),
                PathBuf::from("schema.sql"),
            ]
        );
    }
}
