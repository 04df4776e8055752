//! Zip adapter.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use backy_core::{CompressionKind, CompressionLevel};

use crate::error::{CompressionError, Result};
use crate::{numeric_level, relative_files, Compressor};

pub struct ZipCompressor {
    level: CompressionLevel,
}

impl ZipCompressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }
}

impl Compressor for ZipCompressor {
    fn kind(&self) -> CompressionKind {
        CompressionKind::Zip
    }

    fn compress(&self, input: &Path) -> Result<PathBuf> {
        let root_name = dir_name(input)?;
        let archive_path = input.with_extension("zip");
        let file = File::create(&archive_path)?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(numeric_level(self.level) as i32));

        for relative in relative_files(input)? {
            let name = format!("{root_name}/{}", relative.to_string_lossy());
            zip.start_file(name, options)
                .map_err(|err| CompressionError::CompressionFailed(err.to_string()))?;
            let mut source = File::open(input.join(&relative))?;
            io::copy(&mut source, &mut zip)?;
        }
        zip.finish()
            .map_err(|err| CompressionError::CompressionFailed(err.to_string()))?;

        fs::remove_dir_all(input)?;
        info!(archive = %archive_path.display(), "zip archive created");
        Ok(archive_path)
    }

    fn decompress(&self, archive: &Path) -> Result<PathBuf> {
        let parent = parent_of(archive)?;
        let mut zip = ZipArchive::new(File::open(archive)?)
            .map_err(|err| CompressionError::DecompressionFailed(err.to_string()))?;
        zip.extract(&parent)
            .map_err(|err| CompressionError::DecompressionFailed(err.to_string()))?;

        fs::remove_file(archive)?;
        let expanded = parent.join(stem_of(archive, "zip")?);
        info!(dir = %expanded.display(), "zip archive expanded");
        Ok(expanded)
    }
}

pub(crate) fn dir_name(input: &Path) -> Result<String> {
    input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| CompressionError::InvalidPath(input.display().to_string()))
}

pub(crate) fn parent_of(archive: &Path) -> Result<PathBuf> {
    archive
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| CompressionError::InvalidPath(archive.display().to_string()))
}

/// The archive name with the format extension removed, i.e. the name of the
/// directory the archive holds.
pub(crate) fn stem_of(archive: &Path, extension: &str) -> Result<String> {
    let name = dir_name(archive)?;
    name.strip_suffix(&format!(".{extension}"))
        .map(str::to_string)
        .ok_or_else(|| CompressionError::InvalidPath(archive.display().to_string()))
}
