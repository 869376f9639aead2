//! Crypto collaborator boundary.
//!
//! The engine never touches key material directly. Providers, validators and
//! renewers sign, verify and encrypt through a [`Crypto`] implementation that
//! resolves keys by alias.

mod keystore;
pub mod psha1;

pub use keystore::SymmetricKeyStore;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::encoding;
use crate::error::StsResult;

/// The parts of an X.509 certificate the engine reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509Certificate {
    pub subject_dn: String,
    pub issuer_dn: String,
    pub serial_number: String,
    #[serde(with = "encoding::base64_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
}

impl X509Certificate {
    /// A certificate issued by its own subject, valid for a year from now.
    #[must_use]
    pub fn self_issued(subject_dn: impl Into<String>, public_key: Vec<u8>) -> Self {
        let subject_dn = subject_dn.into();
        let now = OffsetDateTime::now_utc();
        Self {
            issuer_dn: subject_dn.clone(),
            subject_dn,
            serial_number: uuid::Uuid::new_v4().simple().to_string(),
            public_key,
            not_before: now - Duration::minutes(1),
            not_after: now + Duration::days(365),
        }
    }

    /// Hex SHA-256 over subject and public key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.subject_dn.as_bytes());
        hasher.update([0u8]);
        hasher.update(&self.public_key);
        hex::encode(hasher.finalize())
    }

    #[must_use]
    pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant < self.not_after
    }
}

/// Output of [`Crypto::encrypt`]: content encrypted under a fresh key that is
/// itself wrapped for the recipient alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub algorithm: String,
    pub key_wrap_algorithm: String,
    pub recipient_alias: String,
    #[serde(with = "encoding::base64_bytes")]
    pub wrapped_key: Vec<u8>,
    #[serde(with = "encoding::base64_bytes")]
    pub wrap_nonce: Vec<u8>,
    #[serde(with = "encoding::base64_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "encoding::base64_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Alias-based key and certificate service.
pub trait Crypto: Send + Sync {
    fn default_alias(&self) -> Option<&str>;

    fn certificate(&self, alias: &str) -> Option<X509Certificate>;

    fn alias_for_certificate(&self, certificate: &X509Certificate) -> Option<String>;

    /// Returns `true` if `certificate` chains to a trusted entry.
    fn is_trusted(&self, certificate: &X509Certificate) -> bool;

    fn sign(&self, alias: &str, data: &[u8]) -> StsResult<Vec<u8>>;

    fn verify(&self, alias: &str, data: &[u8], signature: &[u8]) -> StsResult<bool>;

    /// Returns `true` if the content `algorithm` can be produced.
    fn supports_encryption_algorithm(&self, algorithm: &str) -> bool;

    fn encrypt(
        &self,
        alias: &str,
        algorithm: &str,
        key_wrap_algorithm: &str,
        plaintext: &[u8],
    ) -> StsResult<EncryptedPayload>;

    fn decrypt(&self, payload: &EncryptedPayload) -> StsResult<Vec<u8>>;
}
