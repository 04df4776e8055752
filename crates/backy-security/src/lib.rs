//! # Backy Security
//!
//! The cryptographic half of the engine: envelope encryption of bundle
//! payloads with AES-256-GCM, a key engine that keeps the symmetric key
//! wrapped by an RSA key living in a keystore or cloud KMS, and integrity
//! manifests over the finished bundle (plain digest or salted keyed MAC).
//!
//! Key identity is versioned and explicit: keys are named
//! `backy_secret_key_<N>` and a new version is only ever created on explicit
//! rotation, never implicitly.

pub mod aead;
pub mod engine;
pub mod error;
pub mod integrity;
pub mod keygen;
pub mod keystore;
pub mod kms;

pub use aead::{decrypt, encrypt};
pub use engine::{KeyBackend, KeyEngine, SymmetricKey};
pub use error::{Result, SecurityError};
pub use integrity::{IntegritySpec, IntegrityService};
pub use keystore::{key_id_for_version, version_of_key_id, KeyStore, LocalKeyStore, KEY_ID_PREFIX};
pub use kms::{AwsKms, Kms};
