use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::encoding;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordType {
    #[default]
    Text,
    Digest,
}

/// WS-Security UsernameToken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameToken {
    pub username: String,
    pub password: Option<String>,
    #[serde(default)]
    pub password_type: PasswordType,
    #[serde(default, with = "encoding::base64_option", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl UsernameToken {
    #[must_use]
    pub fn with_text_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            password_type: PasswordType::Text,
            nonce: None,
            created: None,
        }
    }

    /// Builds a digest token for `password`.
    #[must_use]
    pub fn with_digest_password(
        username: impl Into<String>,
        password: &str,
        nonce: Vec<u8>,
        created: impl Into<String>,
    ) -> Self {
        let created = created.into();
        let digest = password_digest(&nonce, &created, password);
        Self {
            username: username.into(),
            password: Some(digest),
            password_type: PasswordType::Digest,
            nonce: Some(nonce),
            created: Some(created),
        }
    }

    /// Checks the presented password against the stored cleartext one.
    #[must_use]
    pub fn verify_password(&self, expected: &str) -> bool {
        let Some(presented) = &self.password else {
            return false;
        };
        match self.password_type {
            PasswordType::Text => same_secret(presented, expected),
            PasswordType::Digest => {
                let nonce = self.nonce.as_deref().unwrap_or_default();
                let created = self.created.as_deref().unwrap_or_default();
                same_secret(presented, &password_digest(nonce, created, expected))
            }
        }
    }
}

/// Compares fixed-length digests so the time taken does not follow the
/// matching prefix of the secret.
fn same_secret(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// `Base64(SHA-1(nonce + created + password))`.
#[must_use]
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    encoding::encode(&hasher.finalize())
}

/// Derives the realm a UsernameToken belongs to.
pub trait UsernameTokenRealmCodec: Send + Sync {
    fn realm_for(&self, token: &UsernameToken) -> Option<String>;
}

/// Reads the realm from a `user@realm` username.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuffixRealmCodec;

impl UsernameTokenRealmCodec for SuffixRealmCodec {
    fn realm_for(&self, token: &UsernameToken) -> Option<String> {
        token
            .username
            .rsplit_once('@')
            .map(|(_, realm)| realm)
            .filter(|realm| !realm.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_password() {
        let token = UsernameToken::with_text_password("alice", "secret");
        assert!(token.verify_password("secret"));
        assert!(!token.verify_password("other"));
    }

    #[test]
    fn test_digest_password() {
        let token = UsernameToken::with_digest_password(
            "alice",
            "secret",
            vec![1, 2, 3, 4],
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(token.password_type, PasswordType::Digest);
        assert_ne!(token.password.as_deref(), Some("secret"));
        assert!(token.verify_password("secret"));
        assert!(!token.verify_password("wrong"));
    }

    #[test]
    fn test_same_secret_compares_whole_value() {
        assert!(same_secret("secret", "secret"));
        assert!(!same_secret("secret", "secret2"));
        assert!(!same_secret("secre", "secret"));
        assert!(!same_secret("", "secret"));
    }

    #[test]
    fn test_missing_password_never_verifies() {
        let mut token = UsernameToken::with_text_password("alice", "");
        token.password = None;
        assert!(!token.verify_password(""));
    }

    #[test]
    fn test_suffix_realm_codec() {
        let codec = SuffixRealmCodec;
        assert_eq!(
            codec.realm_for(&UsernameToken::with_text_password("alice@B", "pw")).as_deref(),
            Some("B")
        );
        assert!(codec.realm_for(&UsernameToken::with_text_password("alice", "pw")).is_none());
        assert!(codec.realm_for(&UsernameToken::with_text_password("alice@", "pw")).is_none());
    }
}
