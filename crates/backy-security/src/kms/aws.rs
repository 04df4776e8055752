//! AWS Key Management Service adapter.

use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{EncryptionAlgorithmSpec, KeySpec, KeyUsageType};
use aws_sdk_kms::Client as KmsClient;
use tracing::{info, warn};

use crate::error::{Result, SecurityError};
use crate::keystore::{version_of_key_id, AUTO_VERSION, KEY_ID_PREFIX};
use crate::kms::Kms;

/// AWS KMS client wrapper. Backy aliases map to `alias/backy_secret_key_<N>`.
pub struct AwsKms {
    client: KmsClient,
}

impl AwsKms {
    /// Build a client from the ambient AWS environment (profile, env vars,
    /// instance role).
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: KmsClient::new(&config),
        }
    }

    pub fn with_client(client: KmsClient) -> Self {
        Self { client }
    }

    fn aws_alias(alias: &str) -> String {
        format!("alias/{alias}")
    }

    /// Highest-versioned backy alias known to the account, if any.
    async fn latest_alias(&self) -> Result<Option<String>> {
        let response = self
            .client
            .list_aliases()
            .send()
            .await
            .map_err(|err| SecurityError::Kms(format!("failed to list aliases: {err}")))?;

        let mut latest: Option<(u32, String)> = None;
        for entry in response.aliases() {
            let Some(name) = entry.alias_name() else {
                continue;
            };
            let Some(stem) = name.strip_prefix("alias/") else {
                continue;
            };
            if !stem.starts_with(KEY_ID_PREFIX) {
                continue;
            }
            if let Some(version) = version_of_key_id(stem) {
                if latest.as_ref().is_none_or(|(v, _)| version > *v) {
                    latest = Some((version, stem.to_string()));
                }
            }
        }
        Ok(latest.map(|(_, alias)| alias))
    }
}

#[async_trait]
impl Kms for AwsKms {
    async fn generate_key(&self, alias: &str) -> Result<String> {
        let created = self
            .client
            .create_key()
            .description("Asymmetric key for Backy hybrid encryption")
            .key_usage(KeyUsageType::EncryptDecrypt)
            .key_spec(KeySpec::Rsa4096)
            .send()
            .await
            .map_err(|err| SecurityError::Kms(format!("failed to create KMS key: {err}")))?;

        let key_id = created
            .key_metadata()
            .map(|metadata| metadata.key_id().to_string())
            .ok_or_else(|| SecurityError::Kms("create_key returned no metadata".into()))?;

        self.client
            .create_alias()
            .alias_name(Self::aws_alias(alias))
            .target_key_id(&key_id)
            .send()
            .await
            .map_err(|err| SecurityError::Kms(format!("failed to create alias: {err}")))?;

        info!(alias, key_id, "KMS key created");
        Ok(alias.to_string())
    }

    async fn get_public_key(&self, alias: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_public_key()
            .key_id(Self::aws_alias(alias))
            .send()
            .await
            .map_err(|err| SecurityError::Kms(format!("failed to retrieve public key: {err}")))?;

        response
            .public_key()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| SecurityError::Kms("get_public_key returned no key".into()))
    }

    async fn decrypt_symmetric_key(&self, alias: &str, wrapped: &[u8]) -> Result<Vec<u8>> {
        if wrapped.is_empty() {
            return Err(SecurityError::EmptyInput("wrapped key is empty".into()));
        }
        let response = self
            .client
            .decrypt()
            .key_id(Self::aws_alias(alias))
            .ciphertext_blob(Blob::new(wrapped))
            .encryption_algorithm(EncryptionAlgorithmSpec::RsaesOaepSha256)
            .send()
            .await
            .map_err(|err| {
                SecurityError::KeyUnwrapFailed(format!("failed to decrypt symmetric key: {err}"))
            })?;

        response
            .plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| SecurityError::KeyUnwrapFailed("decrypt returned no plaintext".into()))
    }

    async fn validate(&self, alias: &str) -> Result<Option<String>> {
        if alias == AUTO_VERSION {
            return self.latest_alias().await;
        }
        match self
            .client
            .describe_key()
            .key_id(Self::aws_alias(alias))
            .send()
            .await
        {
            Ok(described) => {
                let enabled = described
                    .key_metadata()
                    .map(|metadata| metadata.enabled())
                    .unwrap_or(false);
                Ok(enabled.then(|| alias.to_string()))
            }
            Err(err) => {
                warn!(alias, error = %err, "KMS key lookup failed");
                Ok(None)
            }
        }
    }

    async fn delete_key(&self, alias: &str) -> Result<()> {
        let described = self
            .client
            .describe_key()
            .key_id(Self::aws_alias(alias))
            .send()
            .await
            .map_err(|err| SecurityError::Kms(format!("failed to describe key: {err}")))?;
        let key_id = described
            .key_metadata()
            .map(|metadata| metadata.key_id().to_string())
            .ok_or_else(|| SecurityError::Kms("describe_key returned no metadata".into()))?;

        self.client
            .delete_alias()
            .alias_name(Self::aws_alias(alias))
            .send()
            .await
            .map_err(|err| SecurityError::Kms(format!("failed to delete alias: {err}")))?;
        self.client
            .schedule_key_deletion()
            .key_id(&key_id)
            .pending_window_in_days(7)
            .send()
            .await
            .map_err(|err| SecurityError::Kms(format!("failed to schedule deletion: {err}")))?;

        info!(alias, key_id, "KMS key scheduled for deletion");
        Ok(())
    }
}
