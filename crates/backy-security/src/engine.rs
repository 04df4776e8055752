//! The key engine: resolving key identity and moving the symmetric key in
//! and out of its envelope.

use tracing::info;
use zeroize::Zeroizing;

use crate::error::{Result, SecurityError};
use crate::keygen;
use crate::keystore::{key_id_for_version, version_of_key_id, KeyStore, AUTO_VERSION};
use crate::kms::Kms;

/// 256-bit AEAD key material, zeroed on drop.
pub type SymmetricKey = Zeroizing<Vec<u8>>;

/// Which backend holds the asymmetric half of the envelope.
pub enum KeyBackend {
    /// Private key material lives in a keystore; wrap and unwrap happen
    /// locally.
    Store(Box<dyn KeyStore>),
    /// Private key never leaves the provider; unwrap is a KMS call.
    Kms(Box<dyn Kms>),
}

/// Resolves key identity, generates or reuses key pairs, and wraps and
/// unwraps the per-backup symmetric key.
///
/// The engine never silently creates a new key version: a fresh version
/// only appears when no key exists at all (first use) or on an explicit
/// [`KeyEngine::rotate`] call.
pub struct KeyEngine {
    backend: KeyBackend,
    key_size: u32,
}

impl KeyEngine {
    pub fn new(backend: KeyBackend, key_size: u32) -> Self {
        Self { backend, key_size }
    }

    /// Resolve the configured version (`auto` or a concrete integer string)
    /// to an existing key identity, generating `backy_secret_key_1` only if
    /// the backend holds no key at all.
    pub async fn resolve(&self, requested_version: &str) -> Result<String> {
        if requested_version == AUTO_VERSION {
            if let Some(key_id) = self.validate(AUTO_VERSION).await? {
                return Ok(key_id);
            }
            info!("no key present in backend, generating version 1");
            return self.generate(1).await;
        }

        let version: u32 = requested_version.parse().map_err(|_| {
            SecurityError::InvalidKey(format!(
                "requested version {requested_version:?} is neither auto nor an integer"
            ))
        })?;
        let key_id = key_id_for_version(version);
        match self.validate(&key_id).await? {
            Some(resolved) => Ok(resolved),
            None => Err(SecurityError::KeyNotFound(key_id)),
        }
    }

    /// Create the next key version after the current latest. Explicit
    /// rotation is the only path that grows the version number.
    pub async fn rotate(&self) -> Result<String> {
        let next = match self.validate(AUTO_VERSION).await? {
            Some(latest) => {
                version_of_key_id(&latest).ok_or_else(|| {
                    SecurityError::InvalidKey(format!("unversioned key id {latest:?}"))
                })? + 1
            }
            None => 1,
        };
        self.generate(next).await
    }

    /// Generate a fresh 256-bit symmetric key and wrap it with the active
    /// public key.
    pub async fn wrap_fresh_key(&self, key_id: &str) -> Result<(SymmetricKey, Vec<u8>)> {
        let symmetric = keygen::generate_symmetric_key();
        let public_key = match &self.backend {
            KeyBackend::Store(store) => {
                let pem = Zeroizing::new(store.load(key_id).await?);
                let pem = std::str::from_utf8(&pem)
                    .map_err(|_| SecurityError::InvalidKey("key file is not PEM text".into()))?;
                keygen::public_key_of(&keygen::private_key_from_pem(pem)?)
            }
            KeyBackend::Kms(kms) => {
                let der = kms.get_public_key(key_id).await?;
                keygen::public_key_from_der(&der)?
            }
        };
        let wrapped = keygen::wrap_key(&public_key, &symmetric)?;
        Ok((symmetric, wrapped))
    }

    /// Recover a symmetric key from a previously written wrapped blob.
    pub async fn unwrap_key(&self, key_id: &str, wrapped: &[u8]) -> Result<SymmetricKey> {
        if wrapped.is_empty() {
            return Err(SecurityError::EmptyInput("wrapped key is empty".into()));
        }
        match &self.backend {
            KeyBackend::Store(store) => {
                let pem = Zeroizing::new(store.load(key_id).await?);
                let pem = std::str::from_utf8(&pem)
                    .map_err(|_| SecurityError::InvalidKey("key file is not PEM text".into()))?;
                keygen::unwrap_key(&keygen::private_key_from_pem(pem)?, wrapped)
            }
            KeyBackend::Kms(kms) => Ok(Zeroizing::new(
                kms.decrypt_symmetric_key(key_id, wrapped).await?,
            )),
        }
    }

    async fn validate(&self, key_id: &str) -> Result<Option<String>> {
        match &self.backend {
            KeyBackend::Store(store) => store.validate(key_id).await,
            KeyBackend::Kms(kms) => kms.validate(key_id).await,
        }
    }

    async fn generate(&self, version: u32) -> Result<String> {
        let key_id = key_id_for_version(version);
        match &self.backend {
            KeyBackend::Store(store) => {
                let pem = keygen::generate_rsa_private_key_pem(self.key_size as usize)?;
                store.save(&key_id, pem.as_bytes()).await?;
            }
            KeyBackend::Kms(kms) => {
                kms.generate_key(&key_id).await?;
            }
        }
        info!(key_id, "asymmetric key generated");
        Ok(key_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::LocalKeyStore;

    // Small modulus keeps the engine tests quick.
    fn engine(dir: &std::path::Path) -> KeyEngine {
        KeyEngine::new(
            KeyBackend::Store(Box::new(LocalKeyStore::new(dir))),
            2048,
        )
    }

    #[tokio::test]
    async fn first_resolve_generates_version_one() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        assert_eq!(engine.resolve("auto").await.unwrap(), "backy_secret_key_1");
        // Resolving again reuses the same version instead of minting one.
        assert_eq!(engine.resolve("auto").await.unwrap(), "backy_secret_key_1");
    }

    #[tokio::test]
    async fn concrete_missing_version_is_key_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        assert!(matches!(
            engine.resolve("5").await,
            Err(SecurityError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rotation_is_explicit_and_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        assert_eq!(engine.rotate().await.unwrap(), "backy_secret_key_1");
        assert_eq!(engine.rotate().await.unwrap(), "backy_secret_key_2");
        assert_eq!(engine.resolve("auto").await.unwrap(), "backy_secret_key_2");
        assert_eq!(engine.resolve("1").await.unwrap(), "backy_secret_key_1");
    }

    #[tokio::test]
    async fn wrap_then_unwrap_roundtrips_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let key_id = engine.resolve("auto").await.unwrap();

        let (symmetric, wrapped) = engine.wrap_fresh_key(&key_id).await.unwrap();
        assert_eq!(symmetric.len(), 32);
        let unwrapped = engine.unwrap_key(&key_id, &wrapped).await.unwrap();
        assert_eq!(*unwrapped, *symmetric);
    }

    #[tokio::test]
    async fn empty_wrapped_blob_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let key_id = engine.resolve("auto").await.unwrap();
        assert!(matches!(
            engine.unwrap_key(&key_id, b"").await,
            Err(SecurityError::EmptyInput(_))
        ));
    }
}
