use std::collections::HashMap;

use aes_gcm::{
    Aes128Gcm, Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use trustgate_config::{KeystoreSettings, decode_secret};

use super::{Crypto, EncryptedPayload, X509Certificate};
use crate::constants::algorithms;
use crate::error::{StsError, StsResult};

type HmacSha256 = Hmac<Sha256>;

/// Nonce size for AES-GCM (96 bits)
const NONCE_SIZE: usize = 12;

struct KeyEntry {
    secret: Vec<u8>,
    certificate: X509Certificate,
    trusted: bool,
}

impl KeyEntry {
    /// 256-bit key encryption key derived from the entry secret.
    fn kek(&self) -> [u8; 32] {
        Sha256::digest(&self.secret).into()
    }
}

/// In-process key store holding one symmetric secret per alias.
///
/// Signatures are HMAC-SHA256 under the alias secret. Encryption generates a
/// random AES-GCM content key per call and wraps it with a key derived from
/// the recipient alias secret.
#[derive(Default)]
pub struct SymmetricKeyStore {
    entries: HashMap<String, KeyEntry>,
    default_alias: Option<String>,
}

impl SymmetricKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry whose certificate is issued to `subject_dn`.
    ///
    /// The first entry added becomes the default alias unless one is set.
    pub fn add_entry(
        &mut self,
        alias: impl Into<String>,
        secret: Vec<u8>,
        subject_dn: impl Into<String>,
        trusted: bool,
    ) -> StsResult<()> {
        let alias = alias.into();
        if secret.len() < 16 {
            return Err(StsError::configuration(format!(
                "secret for alias {alias} is shorter than 128 bits"
            )));
        }
        let public_key = Sha256::digest(&secret).to_vec();
        let certificate = X509Certificate::self_issued(subject_dn, public_key);
        if self.default_alias.is_none() {
            self.default_alias = Some(alias.clone());
        }
        self.entries.insert(
            alias,
            KeyEntry {
                secret,
                certificate,
                trusted,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn with_entry(mut self, alias: &str, secret: Vec<u8>, subject_dn: &str) -> Self {
        if let Err(e) = self.add_entry(alias, secret, subject_dn, true) {
            tracing::warn!(alias, error = %e, "Key store entry rejected");
        }
        self
    }

    pub fn set_default_alias(&mut self, alias: impl Into<String>) -> StsResult<()> {
        let alias = alias.into();
        if !self.entries.contains_key(&alias) {
            return Err(StsError::configuration(format!("unknown alias {alias}")));
        }
        self.default_alias = Some(alias);
        Ok(())
    }

    /// Builds the store from the `keystore` configuration section.
    pub fn from_settings(settings: &KeystoreSettings) -> StsResult<Self> {
        let mut store = Self::new();
        let now = OffsetDateTime::now_utc();
        for entry in &settings.entries {
            let (secret, _) = decode_secret(&entry.secret)?;
            let subject = entry
                .subject_dn
                .clone()
                .unwrap_or_else(|| format!("CN={}", entry.alias));
            store.add_entry(entry.alias.clone(), secret, subject, entry.trusted)?;
            if let Some(stored) = store.entries.get_mut(&entry.alias) {
                let valid_for = Duration::try_from(entry.valid_for)
                    .map_err(|e| StsError::configuration(e.to_string()))?;
                stored.certificate.not_after = now + valid_for;
            }
        }
        if let Some(alias) = &settings.default_alias {
            store.set_default_alias(alias.clone())?;
        }
        Ok(store)
    }

    fn entry(&self, alias: &str) -> StsResult<&KeyEntry> {
        self.entries
            .get(alias)
            .ok_or_else(|| StsError::crypto(format!("no key for alias {alias}")))
    }

    fn content_key_len(algorithm: &str) -> Option<usize> {
        match algorithm {
            algorithms::AES128_GCM => Some(16),
            algorithms::AES256_GCM => Some(32),
            _ => None,
        }
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> StsResult<Vec<u8>> {
    let nonce = Nonce::from_slice(nonce);
    let result = match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|e| StsError::crypto(e.to_string()))?
            .encrypt(nonce, plaintext),
        32 => Aes256Gcm::new_from_slice(key)
            .map_err(|e| StsError::crypto(e.to_string()))?
            .encrypt(nonce, plaintext),
        n => return Err(StsError::crypto(format!("unsupported AES key length {n}"))),
    };
    result.map_err(|e| StsError::crypto(format!("encryption failed: {e}")))
}

fn open(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> StsResult<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(StsError::crypto("invalid nonce length"));
    }
    let nonce = Nonce::from_slice(nonce);
    let result = match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|e| StsError::crypto(e.to_string()))?
            .decrypt(nonce, ciphertext),
        32 => Aes256Gcm::new_from_slice(key)
            .map_err(|e| StsError::crypto(e.to_string()))?
            .decrypt(nonce, ciphertext),
        n => return Err(StsError::crypto(format!("unsupported AES key length {n}"))),
    };
    result.map_err(|e| StsError::crypto(format!("decryption failed: {e}")))
}

impl Crypto for SymmetricKeyStore {
    fn default_alias(&self) -> Option<&str> {
        self.default_alias.as_deref()
    }

    fn certificate(&self, alias: &str) -> Option<X509Certificate> {
        self.entries.get(alias).map(|e| e.certificate.clone())
    }

    fn alias_for_certificate(&self, certificate: &X509Certificate) -> Option<String> {
        let fingerprint = certificate.fingerprint();
        self.entries
            .iter()
            .find(|(_, e)| e.certificate.fingerprint() == fingerprint)
            .map(|(alias, _)| alias.clone())
    }

    fn is_trusted(&self, certificate: &X509Certificate) -> bool {
        self.alias_for_certificate(certificate)
            .and_then(|alias| self.entries.get(&alias))
            .is_some_and(|e| e.trusted)
    }

    fn sign(&self, alias: &str, data: &[u8]) -> StsResult<Vec<u8>> {
        let entry = self.entry(alias)?;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&entry.secret)
            .map_err(|e| StsError::crypto(e.to_string()))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify(&self, alias: &str, data: &[u8], signature: &[u8]) -> StsResult<bool> {
        let entry = self.entry(alias)?;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&entry.secret)
            .map_err(|e| StsError::crypto(e.to_string()))?;
        mac.update(data);
        Ok(mac.verify_slice(signature).is_ok())
    }

    fn supports_encryption_algorithm(&self, algorithm: &str) -> bool {
        Self::content_key_len(algorithm).is_some()
    }

    fn encrypt(
        &self,
        alias: &str,
        algorithm: &str,
        key_wrap_algorithm: &str,
        plaintext: &[u8],
    ) -> StsResult<EncryptedPayload> {
        let entry = self.entry(alias)?;
        let key_len = Self::content_key_len(algorithm).ok_or_else(|| {
            StsError::crypto(format!("encryption algorithm {algorithm} is not supported"))
        })?;

        let content_key = random_bytes(key_len);
        let nonce = random_bytes(NONCE_SIZE);
        let ciphertext = seal(&content_key, &nonce, plaintext)?;

        let wrap_nonce = random_bytes(NONCE_SIZE);
        let wrapped_key = seal(&entry.kek(), &wrap_nonce, &content_key)?;

        Ok(EncryptedPayload {
            algorithm: algorithm.to_string(),
            key_wrap_algorithm: key_wrap_algorithm.to_string(),
            recipient_alias: alias.to_string(),
            wrapped_key,
            wrap_nonce,
            nonce,
            ciphertext,
        })
    }

    fn decrypt(&self, payload: &EncryptedPayload) -> StsResult<Vec<u8>> {
        let entry = self.entry(&payload.recipient_alias)?;
        let content_key = open(&entry.kek(), &payload.wrap_nonce, &payload.wrapped_key)?;
        open(&content_key, &payload.nonce, &payload.ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SymmetricKeyStore {
        SymmetricKeyStore::new()
            .with_entry("sts", vec![1u8; 32], "CN=sts")
            .with_entry("service", vec![2u8; 32], "CN=service")
    }

    #[test]
    fn test_first_entry_is_default_alias() {
        assert_eq!(store().default_alias(), Some("sts"));
    }

    #[test]
    fn test_sign_and_verify() {
        let store = store();
        let sig = store.sign("sts", b"payload").unwrap();
        assert!(store.verify("sts", b"payload", &sig).unwrap());
        assert!(!store.verify("sts", b"tampered", &sig).unwrap());
        assert!(!store.verify("service", b"payload", &sig).unwrap());
    }

    #[test]
    fn test_unknown_alias_is_error() {
        assert!(store().sign("nobody", b"x").is_err());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let store = store();
        let payload = store
            .encrypt(
                "service",
                algorithms::AES256_GCM,
                algorithms::RSA_OAEP_MGF1P,
                b"<Assertion>alice</Assertion>",
            )
            .unwrap();
        assert_eq!(payload.recipient_alias, "service");
        assert!(!payload.ciphertext.windows(5).any(|w| w == b"alice"));
        assert_eq!(store.decrypt(&payload).unwrap(), b"<Assertion>alice</Assertion>");
    }

    #[test]
    fn test_aes128_supported_cbc_not() {
        let store = store();
        assert!(store.supports_encryption_algorithm(algorithms::AES128_GCM));
        assert!(!store.supports_encryption_algorithm("http://www.w3.org/2001/04/xmlenc#aes128-cbc"));
        let payload = store
            .encrypt("sts", algorithms::AES128_GCM, algorithms::KW_AES256, b"x")
            .unwrap();
        assert_eq!(store.decrypt(&payload).unwrap(), b"x");
    }

    #[test]
    fn test_trust_lookup() {
        let mut store = store();
        store
            .add_entry("untrusted", vec![3u8; 32], "CN=mallory", false)
            .unwrap();
        let trusted = store.certificate("sts").unwrap();
        let untrusted = store.certificate("untrusted").unwrap();
        assert!(store.is_trusted(&trusted));
        assert!(!store.is_trusted(&untrusted));
        assert_eq!(store.alias_for_certificate(&trusted).as_deref(), Some("sts"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut store = SymmetricKeyStore::new();
        assert!(store.add_entry("a", vec![1; 8], "CN=a", true).is_err());
    }
}
