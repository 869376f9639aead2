//! Proof key material for holder-of-key tokens.

use rand::RngCore;

use crate::constants::binary_secrets;
use crate::context::InvocationContext;
use crate::crypto::X509Certificate;
use crate::crypto::psha1::p_sha1;
use crate::error::{StsError, StsResult};
use crate::request::KeyRequirements;

/// Bits.
pub const DEFAULT_KEY_SIZE: u32 = 256;
pub const MIN_KEY_SIZE: u32 = 128;
pub const MAX_KEY_SIZE: u32 = 512;

/// How the requester learns the proof key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofKey {
    /// The STS chose the key and returns it.
    Secret(Vec<u8>),
    /// The requester computes the key from both entropies.
    Computed {
        server_entropy: Vec<u8>,
        algorithm: String,
    },
    /// The requester supplied the key as entropy, nothing is returned.
    ClientEntropy,
}

/// A symmetric proof key and how it was arrived at.
#[derive(Debug, Clone)]
pub struct SymmetricKey {
    pub secret: Vec<u8>,
    pub key_size: u32,
    pub proof: ProofKey,
}

impl SymmetricKey {
    pub fn resolve(key: &KeyRequirements) -> StsResult<Self> {
        let key_size = key.key_size.unwrap_or(DEFAULT_KEY_SIZE);
        if !(MIN_KEY_SIZE..=MAX_KEY_SIZE).contains(&key_size) || key_size % 8 != 0 {
            tracing::warn!(key_size, "Requested key size not accepted");
            return Err(StsError::invalid_request(format!(
                "KeySize {key_size} is outside {MIN_KEY_SIZE}..={MAX_KEY_SIZE} bits"
            )));
        }
        let length = (key_size / 8) as usize;

        if let Some(algorithm) = key.computed_key_algorithm.as_deref() {
            if algorithm != binary_secrets::COMPUTED_KEY_PSHA1 {
                return Err(StsError::invalid_request(format!(
                    "computed key algorithm {algorithm} is not supported"
                )));
            }
        }

        match (&key.entropy, key.computed_key_algorithm.as_deref()) {
            (Some(client), Some(algorithm)) => {
                let server_entropy = random_bytes(length);
                let secret = p_sha1(&client.secret, &server_entropy, length)?;
                Ok(Self {
                    secret,
                    key_size,
                    proof: ProofKey::Computed {
                        server_entropy,
                        algorithm: algorithm.to_string(),
                    },
                })
            }
            (Some(client), None) => Ok(Self {
                key_size: u32::try_from(client.secret.len() * 8).unwrap_or(key_size),
                secret: client.secret.clone(),
                proof: ProofKey::ClientEntropy,
            }),
            (None, _) => {
                let secret = random_bytes(length);
                Ok(Self {
                    proof: ProofKey::Secret(secret.clone()),
                    secret,
                    key_size,
                })
            }
        }
    }
}

/// Certificate a PublicKey token is bound to: the `UseKey` certificate,
/// else the caller's TLS certificate.
pub fn resolve_public_key(
    key: &KeyRequirements,
    context: &InvocationContext,
) -> StsResult<X509Certificate> {
    key.use_key_certificate
        .clone()
        .or_else(|| context.tls_certificates().first().cloned())
        .ok_or_else(|| {
            tracing::warn!("PublicKey requested without a UseKey or client certificate");
            StsError::invalid_request("a PublicKey token requires a UseKey certificate")
        })
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Entropy;

    fn entropy(secret: Vec<u8>) -> Option<Entropy> {
        Some(Entropy {
            secret,
            secret_type: Some(binary_secrets::NONCE.to_string()),
        })
    }

    #[test]
    fn test_random_secret_by_default() {
        let key = SymmetricKey::resolve(&KeyRequirements::default()).unwrap();
        assert_eq!(key.secret.len(), 32);
        assert_eq!(key.proof, ProofKey::Secret(key.secret.clone()));
    }

    #[test]
    fn test_computed_key() {
        let requirements = KeyRequirements {
            entropy: entropy(vec![1; 32]),
            computed_key_algorithm: Some(binary_secrets::COMPUTED_KEY_PSHA1.to_string()),
            ..Default::default()
        };
        let key = SymmetricKey::resolve(&requirements).unwrap();
        let ProofKey::Computed { server_entropy, .. } = &key.proof else {
            panic!("expected computed key");
        };
        assert_eq!(key.secret, p_sha1(&[1; 32], server_entropy, 32).unwrap());
    }

    #[test]
    fn test_client_entropy_used_as_is() {
        let requirements = KeyRequirements {
            entropy: entropy(vec![9; 16]),
            ..Default::default()
        };
        let key = SymmetricKey::resolve(&requirements).unwrap();
        assert_eq!(key.secret, vec![9; 16]);
        assert_eq!(key.key_size, 128);
        assert_eq!(key.proof, ProofKey::ClientEntropy);
    }

    #[test]
    fn test_key_size_bounds() {
        for size in [64, 1024, 130] {
            let requirements = KeyRequirements {
                key_size: Some(size),
                ..Default::default()
            };
            assert!(matches!(
                SymmetricKey::resolve(&requirements),
                Err(StsError::InvalidRequest { .. })
            ));
        }
        let requirements = KeyRequirements {
            key_size: Some(128),
            ..Default::default()
        };
        assert_eq!(SymmetricKey::resolve(&requirements).unwrap().secret.len(), 16);
    }

    #[test]
    fn test_unsupported_computed_key_algorithm() {
        let requirements = KeyRequirements {
            computed_key_algorithm: Some("urn:other".to_string()),
            ..Default::default()
        };
        assert!(SymmetricKey::resolve(&requirements).is_err());
    }

    #[test]
    fn test_public_key_falls_back_to_tls_certificate() {
        let cert = X509Certificate::self_issued("CN=client", vec![7; 32]);
        let context = InvocationContext::new().with_tls_certificate(cert.clone());
        assert_eq!(
            resolve_public_key(&KeyRequirements::default(), &context).unwrap(),
            cert
        );
        assert!(resolve_public_key(&KeyRequirements::default(), &InvocationContext::new()).is_err());
    }
}
