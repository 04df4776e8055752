//! Keystore abstraction: where private key material lives.

pub mod local;

use async_trait::async_trait;

use crate::error::Result;

pub use local::LocalKeyStore;

/// Prefix of every versioned key identity.
pub const KEY_ID_PREFIX: &str = "backy_secret_key_";

/// Sentinel meaning "latest available version".
pub const AUTO_VERSION: &str = "auto";

/// `backy_secret_key_<N>` for a concrete version.
pub fn key_id_for_version(version: u32) -> String {
    format!("{KEY_ID_PREFIX}{version}")
}

/// Parse the `<N>` out of a key identity, if it has the canonical shape.
pub fn version_of_key_id(key_id: &str) -> Option<u32> {
    key_id.strip_prefix(KEY_ID_PREFIX)?.parse().ok()
}

/// Storage for private key material, addressed by versioned key identity.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Persist key material under a key identity.
    async fn save(&self, key_id: &str, data: &[u8]) -> Result<()>;

    /// Load the material for a key identity.
    async fn load(&self, key_id: &str) -> Result<Vec<u8>>;

    /// Remove a key.
    async fn delete(&self, key_id: &str) -> Result<()>;

    /// Resolve a key identity to a live key, or `None` when no such key
    /// exists. The [`AUTO_VERSION`] sentinel resolves to the
    /// highest-versioned key present.
    async fn validate(&self, key_id: &str) -> Result<Option<String>>;
}
