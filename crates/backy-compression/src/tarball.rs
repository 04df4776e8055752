//! Plain tar adapter.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

use backy_core::CompressionKind;

use crate::error::{CompressionError, Result};
use crate::zipfile::{dir_name, parent_of, stem_of};
use crate::Compressor;

pub struct TarCompressor;

impl TarCompressor {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}

impl Compressor for TarCompressor {
    fn kind(&self) -> CompressionKind {
        CompressionKind::Tar
    }

    fn compress(&self, input: &Path) -> Result<PathBuf> {
        let root_name = dir_name(input)?;
        let archive_path = input.with_extension("tar");
        let file = File::create(&archive_path)?;
        let mut builder = tar::Builder::new(file);
        builder
            .append_dir_all(&root_name, input)
            .map_err(|err| CompressionError::CompressionFailed(err.to_string()))?;
        builder
            .finish()
            .map_err(|err| CompressionError::CompressionFailed(err.to_string()))?;

        fs::remove_dir_all(input)?;
        info!(archive = %archive_path.display(), "tar archive created");
        Ok(archive_path)
    }

    fn decompress(&self, archive: &Path) -> Result<PathBuf> {
        let parent = parent_of(archive)?;
        let mut tar = tar::Archive::new(File::open(archive)?);
        tar.unpack(&parent)
            .map_err(|err| CompressionError::DecompressionFailed(err.to_string()))?;

        fs::remove_file(archive)?;
        let expanded = parent.join(stem_of(archive, "tar")?);
        info!(dir = %expanded.display(), "tar archive expanded");
        Ok(expanded)
    }
}
