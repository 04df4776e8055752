//! Gzip-compressed tar adapter.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

use backy_core::{CompressionKind, CompressionLevel};

use crate::error::{CompressionError, Result};
use crate::zipfile::{dir_name, parent_of, stem_of};
use crate::{numeric_level, Compressor};

pub struct TarGzCompressor {
    level: CompressionLevel,
}

impl TarGzCompressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }
}

impl Compressor for TarGzCompressor {
    fn kind(&self) -> CompressionKind {
        CompressionKind::Targz
    }

    fn compress(&self, input: &Path) -> Result<PathBuf> {
        let root_name = dir_name(input)?;
        let archive_path = input.with_extension("tar.gz");
        let encoder = GzEncoder::new(
            File::create(&archive_path)?,
            GzCompression::new(numeric_level(self.level)),
        );
        let mut builder = tar::Builder::new(encoder);
        builder
            .append_dir_all(&root_name, input)
            .map_err(|err| CompressionError::CompressionFailed(err.to_string()))?;
        let encoder = builder
            .into_inner()
            .map_err(|err| CompressionError::CompressionFailed(err.to_string()))?;
        encoder
            .finish()
            .map_err(|err| CompressionError::CompressionFailed(err.to_string()))?;

        fs::remove_dir_all(input)?;
        info!(archive = %archive_path.display(), "tar.gz archive created");
        Ok(archive_path)
    }

    fn decompress(&self, archive: &Path) -> Result<PathBuf> {
        let parent = parent_of(archive)?;
        let decoder = GzDecoder::new(File::open(archive)?);
        let mut tar = tar::Archive::new(decoder);
        tar.unpack(&parent)
            .map_err(|err| CompressionError::DecompressionFailed(err.to_string()))?;

        fs::remove_file(archive)?;
        let expanded = parent.join(stem_of(archive, "tar.gz")?);
        info!(dir = %expanded.display(), "tar.gz archive expanded");
        Ok(expanded)
    }
}
