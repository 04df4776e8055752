//! Cloud KMS abstraction: asymmetric keys whose private half never leaves
//! the provider.

pub mod aws;

use async_trait::async_trait;

use crate::error::Result;

pub use aws::AwsKms;

/// Operations the key engine needs from a KMS provider. Aliases use the
/// same `backy_secret_key_<N>` identities as the keystore; the provider
/// adapter maps them to its own naming scheme.
#[async_trait]
pub trait Kms: Send + Sync {
    /// Create an asymmetric ENCRYPT_DECRYPT key under the given alias and
    /// return the resolved alias.
    async fn generate_key(&self, alias: &str) -> Result<String>;

    /// Fetch the public half, DER (SubjectPublicKeyInfo) encoded.
    async fn get_public_key(&self, alias: &str) -> Result<Vec<u8>>;

    /// Decrypt a wrapped symmetric key with the provider-held private half.
    async fn decrypt_symmetric_key(&self, alias: &str, wrapped: &[u8]) -> Result<Vec<u8>>;

    /// Resolve an alias (or the `auto` sentinel) to a live key alias.
    async fn validate(&self, alias: &str) -> Result<Option<String>>;

    /// Schedule the key for deletion and remove its alias.
    async fn delete_key(&self, alias: &str) -> Result<()>;
}
