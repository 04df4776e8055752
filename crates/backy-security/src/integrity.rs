//! Integrity manifests: one line per bundle file, digest or keyed MAC.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, SecurityError};

/// Streaming buffer size for hashing file contents.
const HASH_BUF_SIZE: usize = 8192;

/// PBKDF2-HMAC-SHA256 iteration count for MAC key derivation.
const PBKDF2_ROUNDS: u32 = 100_000;

/// Salt length for keyed-MAC manifests.
const SALT_LEN: usize = 16;

/// Which proof the manifest carries.
#[derive(Debug, Clone)]
pub enum IntegritySpec {
    /// Plain SHA-256 digests; manifest file `integrity.sha256`.
    Sha256,
    /// HMAC-SHA256 under a key derived from (password, salt); manifest file
    /// `integrity.hmac` with a leading `salt:` line.
    Hmac { password: String },
}

impl IntegritySpec {
    pub fn manifest_name(&self) -> &'static str {
        match self {
            IntegritySpec::Sha256 => "integrity.sha256",
            IntegritySpec::Hmac { .. } => "integrity.hmac",
        }
    }
}

/// Builds and verifies the integrity manifest of a bundle directory.
pub struct IntegrityService {
    spec: IntegritySpec,
}

impl IntegrityService {
    pub fn new(spec: IntegritySpec) -> Self {
        Self { spec }
    }

    /// Write the manifest covering every regular file in `dir` (the
    /// manifest itself excluded), and return its path.
    pub fn build(&self, dir: &Path) -> Result<PathBuf> {
        let manifest_name = self.spec.manifest_name();
        let files = sorted_files(dir, manifest_name)?;
        if files.is_empty() {
            return Err(SecurityError::MissingFile(format!(
                "no files to protect in {}",
                dir.display()
            )));
        }

        let manifest_path = dir.join(manifest_name);
        let mut manifest = File::create(&manifest_path)?;

        match &self.spec {
            IntegritySpec::Sha256 => {
                for file in &files {
                    let digest = sha256_file(file)?;
                    writeln!(manifest, "{digest}  {}", file_name(file))?;
                }
            }
            IntegritySpec::Hmac { password } => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                let key = derive_key(password, &salt);
                writeln!(manifest, "salt: {}", hex::encode(salt))?;
                for file in &files {
                    let tag = hmac_file(file, &key)?;
                    writeln!(manifest, "{tag}  {}", file_name(file))?;
                }
            }
        }
        manifest.sync_all()?;
        info!(path = %manifest_path.display(), files = files.len(), "integrity manifest created");
        Ok(manifest_path)
    }

    /// Verify every file the manifest lists. Fails on the first mismatch or
    /// missing file.
    pub fn verify(&self, dir: &Path) -> Result<bool> {
        let manifest_name = self.spec.manifest_name();
        let manifest_path = dir.join(manifest_name);
        if !manifest_path.is_file() {
            return Err(SecurityError::MissingFile(manifest_name.to_string()));
        }
        let content = fs::read_to_string(&manifest_path)?;
        let mut lines = content.lines().peekable();

        let key = match &self.spec {
            IntegritySpec::Sha256 => None,
            IntegritySpec::Hmac { password } => {
                let salt_line = lines.next().ok_or_else(|| {
                    SecurityError::MalformedManifest("missing salt line".into())
                })?;
                let salt_hex = salt_line.strip_prefix("salt: ").ok_or_else(|| {
                    SecurityError::MalformedManifest(format!("bad salt line: {salt_line:?}"))
                })?;
                let salt = hex::decode(salt_hex).map_err(|err| {
                    SecurityError::MalformedManifest(format!("bad salt hex: {err}"))
                })?;
                Some(derive_key(password, &salt))
            }
        };

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let (expected, filename) = line.split_once("  ").ok_or_else(|| {
                SecurityError::MalformedManifest(format!("bad manifest line: {line:?}"))
            })?;
            if filename == manifest_name {
                continue;
            }
            let path = dir.join(filename);
            if !path.is_file() {
                return Err(SecurityError::MissingFile(filename.to_string()));
            }
            let actual = match &key {
                None => sha256_file(&path)?,
                Some(key) => hmac_file(&path, key)?,
            };
            if actual != expected {
                return Err(SecurityError::IntegrityMismatch(filename.to_string()));
            }
        }
        info!(path = %manifest_path.display(), "integrity check passed");
        Ok(true)
    }
}

fn sorted_files(dir: &Path, manifest_name: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| file_name(path) != manifest_name)
        .collect();
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hmac_file(path: &Path, key: &[u8; 32]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|err| SecurityError::InvalidKey(err.to_string()))?;
    let mut file = File::open(path)?;
    let mut buf = [0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        mac.update(&buf[..n]);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"hello").unwrap();
        fs::write(dir.path().join("b"), b"world").unwrap();
        dir
    }

    #[test]
    fn digest_manifest_builds_and_verifies() {
        let dir = seed_dir();
        let service = IntegrityService::new(IntegritySpec::Sha256);
        let manifest = service.build(dir.path()).unwrap();
        assert_eq!(file_name(&manifest), "integrity.sha256");

        let content = fs::read_to_string(&manifest).unwrap();
        assert!(!content.contains("integrity.sha256"));
        assert!(content.contains("  a"));
        assert!(content.contains("  b"));

        assert!(service.verify(dir.path()).unwrap());
    }

    #[test]
    fn flipping_a_byte_fails_with_the_right_file() {
        let dir = seed_dir();
        let service = IntegrityService::new(IntegritySpec::Sha256);
        service.build(dir.path()).unwrap();

        fs::write(dir.path().join("a"), b"hellp").unwrap();
        match service.verify(dir.path()) {
            Err(SecurityError::IntegrityMismatch(file)) => assert_eq!(file, "a"),
            other => panic!("expected IntegrityMismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_listed_file_is_reported() {
        let dir = seed_dir();
        let service = IntegrityService::new(IntegritySpec::Sha256);
        service.build(dir.path()).unwrap();

        fs::remove_file(dir.path().join("b")).unwrap();
        match service.verify(dir.path()) {
            Err(SecurityError::MissingFile(file)) => assert_eq!(file, "b"),
            other => panic!("expected MissingFile, got {other:?}"),
        }
    }

    #[test]
    fn hmac_manifest_has_salt_line_and_verifies() {
        let dir = seed_dir();
        let service = IntegrityService::new(IntegritySpec::Hmac {
            password: "testpassword".into(),
        });
        let manifest = service.build(dir.path()).unwrap();

        let content = fs::read_to_string(&manifest).unwrap();
        assert!(content.starts_with("salt: "));
        assert!(service.verify(dir.path()).unwrap());
    }

    #[test]
    fn hmac_verify_with_wrong_password_fails() {
        let dir = seed_dir();
        IntegrityService::new(IntegritySpec::Hmac {
            password: "right".into(),
        })
        .build(dir.path())
        .unwrap();

        let wrong = IntegrityService::new(IntegritySpec::Hmac {
            password: "wrong".into(),
        });
        assert!(matches!(
            wrong.verify(dir.path()),
            Err(SecurityError::IntegrityMismatch(_))
        ));
    }

    #[test]
    fn empty_directory_cannot_be_protected() {
        let dir = tempfile::tempdir().unwrap();
        let service = IntegrityService::new(IntegritySpec::Sha256);
        assert!(matches!(
            service.build(dir.path()),
            Err(SecurityError::MissingFile(_))
        ));
    }
}
