//! JWT token encoding and validation.
//!
//! Supports RS256, RS384 and ES384 signing keys. Issued tokens carry the
//! registered claims plus the requested claims flattened into the payload.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::{DecodePrivateKey as EcDecodePrivateKey, EncodePrivateKey as EcEncodePrivateKey};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::claims::{ProcessedClaim, ProcessedClaimCollection};
use crate::error::StsError;

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {message}")]
    EncodingError { message: String },

    #[error("Failed to decode token: {message}")]
    DecodingError { message: String },

    #[error("Token expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid claims: {message}")]
    InvalidClaims { message: String },

    #[error("Key generation error: {message}")]
    KeyGenerationError { message: String },

    #[error("Invalid key: {message}")]
    InvalidKey { message: String },
}

impl JwtError {
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the token itself is bad (expired, forged, wrong
    /// issuer) rather than the keys or the encoder.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired
                | Self::InvalidSignature
                | Self::InvalidClaims { .. }
                | Self::DecodingError { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for StsError {
    fn from(err: JwtError) -> Self {
        if err.is_validation_error() {
            StsError::invalid_security_token(err.to_string())
        } else {
            StsError::crypto(err.to_string())
        }
    }
}

/// Supported signing algorithms for JWT tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    RS256,
    RS384,
    ES384,
}

impl SigningAlgorithm {
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(JwtError::invalid_key(format!(
                "unsupported signing algorithm {other}"
            ))),
        }
    }
}

/// Claims of a token issued by the STS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtClaims {
    pub iss: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub jti: String,
    /// Requested claims, keyed by claim type.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl JwtClaims {
    #[must_use]
    pub fn builder(issuer: impl Into<String>, subject: impl Into<String>) -> JwtClaimsBuilder {
        JwtClaimsBuilder::new(issuer, subject)
    }

    /// Private claims as processed claims issued by `iss`. Array values become
    /// multi-valued claims; scalars are stringified.
    #[must_use]
    pub fn claims(&self) -> ProcessedClaimCollection {
        self.extra
            .iter()
            .map(|(claim_type, value)| {
                let values = match value {
                    serde_json::Value::Array(items) => items.iter().map(value_text).collect(),
                    other => vec![value_text(other)],
                };
                ProcessedClaim::new(claim_type.clone(), values).with_issuer(&self.iss)
            })
            .collect()
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.exp).ok()
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builder for [`JwtClaims`].
pub struct JwtClaimsBuilder {
    claims: JwtClaims,
}

impl JwtClaimsBuilder {
    fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            claims: JwtClaims {
                iss: issuer.into(),
                sub: subject.into(),
                aud: Vec::new(),
                exp: now + 300,
                iat: now,
                nbf: None,
                jti: uuid::Uuid::new_v4().to_string(),
                extra: BTreeMap::new(),
            },
        }
    }

    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.claims.aud.push(audience.into());
        self
    }

    #[must_use]
    pub fn lifetime(mut self, not_before: OffsetDateTime, expires: OffsetDateTime) -> Self {
        self.claims.nbf = Some(not_before.unix_timestamp());
        self.claims.exp = expires.unix_timestamp();
        self
    }

    #[must_use]
    pub fn jti(mut self, jti: impl Into<String>) -> Self {
        self.claims.jti = jti.into();
        self
    }

    /// Flattens resolved claims into the payload.
    #[must_use]
    pub fn claims(mut self, claims: &ProcessedClaimCollection) -> Self {
        for claim in claims.iter() {
            let value = match claim.values.as_slice() {
                [single] => serde_json::Value::String(single.clone()),
                many => serde_json::Value::Array(
                    many.iter().cloned().map(serde_json::Value::String).collect(),
                ),
            };
            self.claims.extra.insert(claim.claim_type.clone(), value);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> JwtClaims {
        self.claims
    }
}

/// A signing key pair for JWT operations.
pub struct SigningKeyPair {
    pub kid: String,
    pub algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub created_at: OffsetDateTime,
}

impl SigningKeyPair {
    /// Generates a new RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                algorithm
            )));
        }

        let bits = 2048;
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let private_pem = rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(&private_key, LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Generates a new EC key pair using the P-384 curve.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let decoding_key = ec_decoding_key(&secret_key).map_err(|e| match e {
            JwtError::InvalidKey { message } => JwtError::key_generation_error(message),
            other => other,
        })?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Loads a key pair from PEM strings. EC private keys are PKCS#8.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let (encoding_key, decoding_key) = if algorithm.is_rsa() {
            let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            (encoding_key, decoding_key)
        } else {
            let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            (encoding_key, ec_decoding_key(&secret_key)?)
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

fn ec_decoding_key(secret_key: &EcSecretKey) -> Result<DecodingKey, JwtError> {
    let signing_key = EcSigningKey::from(secret_key);
    let point = signing_key.verifying_key().to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
    let y = point
        .y()
        .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

    let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
    let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
    DecodingKey::from_ec_components(&x_b64, &y_b64).map_err(|e| JwtError::invalid_key(e.to_string()))
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Encodes and decodes the STS's JWTs.
///
/// Thread-safe (`Send + Sync`); providers and validators share one instance.
#[derive(Debug)]
pub struct JwtService {
    signing_key: SigningKeyPair,
    issuer: String,
    /// Realm issuers accepted on decode besides `issuer`.
    realm_issuers: Vec<String>,
}

impl JwtService {
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
            realm_issuers: Vec::new(),
        }
    }

    /// Also accepts tokens naming `issuer`, the issuer of a realm this key
    /// signs for.
    #[must_use]
    pub fn with_realm_issuer(mut self, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        if issuer != self.issuer && !self.realm_issuers.contains(&issuer) {
            self.realm_issuers.push(issuer);
        }
        self
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT string.
    ///
    /// # Errors
    /// Returns an error if decoding or validation fails.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        decode(token, &self.signing_key.decoding_key, &self.validation(true))
            .map_err(JwtError::from)
    }

    /// Decodes a JWT without validating expiration. The signature is still
    /// checked.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    pub fn decode_allow_expired<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<TokenData<T>, JwtError> {
        decode(token, &self.signing_key.decoding_key, &self.validation(false))
            .map_err(JwtError::from)
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        let issuers: Vec<&str> = std::iter::once(self.issuer.as_str())
            .chain(self.realm_issuers.iter().map(String::as_str))
            .collect();
        validation.set_issuer(&issuers);
        validation.validate_exp = validate_exp;
        // audience is checked against AppliesTo by the operations
        validation.validate_aud = false;
        validation.leeway = 0;
        validation
    }

    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.signing_key.kid
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

/// Reads the `aud` claim without verifying the token. Used only to compare a
/// delegated token's audience with AppliesTo after the token was validated.
#[must_use]
pub fn peek_audiences(token: &str) -> Vec<String> {
    let Some(payload) = token.split('.').nth(1) else {
        return Vec::new();
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return Vec::new();
    };
    match value.get("aud") {
        Some(serde_json::Value::String(aud)) => vec![aud.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(SigningKeyPair::generate_ec().unwrap(), "https://sts.example.com")
    }

    #[test]
    fn test_es384_encode_decode() {
        let service = service();
        let claims = JwtClaims::builder("https://sts.example.com", "alice")
            .audience("https://service.example.com")
            .build();

        let token = service.encode(&claims).unwrap();
        let decoded = service.decode::<JwtClaims>(&token).unwrap();
        assert_eq!(decoded.claims.sub, "alice");
        assert_eq!(decoded.claims.aud, vec!["https://service.example.com".to_string()]);
        assert_eq!(decoded.header.kid.as_deref(), Some(service.current_kid()));
    }

    #[test]
    fn test_rs256_encode_decode() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let service = JwtService::new(key_pair, "sts");
        let token = service.encode(&JwtClaims::builder("sts", "bob").build()).unwrap();
        assert_eq!(service.decode::<JwtClaims>(&token).unwrap().claims.sub, "bob");
    }

    #[test]
    fn test_rsa_generation_rejects_ec_algorithm() {
        assert!(matches!(
            SigningKeyPair::generate_rsa(SigningAlgorithm::ES384),
            Err(JwtError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_flattened_claims_round_trip() {
        let service = service();
        let mut requested = ProcessedClaimCollection::new();
        requested.push(ProcessedClaim::new("role", vec!["a".into(), "b".into()]));
        requested.push(ProcessedClaim::new("surname", vec!["doe".into()]));
        let claims = JwtClaims::builder("https://sts.example.com", "alice")
            .claims(&requested)
            .build();

        let token = service.encode(&claims).unwrap();
        let decoded = service.decode::<JwtClaims>(&token).unwrap().claims;
        let embedded = decoded.claims();
        assert_eq!(embedded.get("role").unwrap().values, vec!["a", "b"]);
        assert_eq!(embedded.value("surname"), Some("doe"));
        assert_eq!(
            embedded.get("surname").unwrap().issuer.as_deref(),
            Some("https://sts.example.com")
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = service();
        let now = OffsetDateTime::now_utc();
        let claims = JwtClaims::builder("https://sts.example.com", "alice")
            .lifetime(now - time::Duration::hours(2), now - time::Duration::hours(1))
            .build();
        let token = service.encode(&claims).unwrap();

        assert!(matches!(
            service.decode::<JwtClaims>(&token),
            Err(JwtError::Expired)
        ));
        assert!(service.decode_allow_expired::<JwtClaims>(&token).is_ok());
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let token = service()
            .encode(&JwtClaims::builder("https://sts.example.com", "alice").build())
            .unwrap();
        let err = service().decode::<JwtClaims>(&token).unwrap_err();
        assert!(matches!(err, JwtError::InvalidSignature));
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let service = service();
        let token = service
            .encode(&JwtClaims::builder("https://other.example.com", "alice").build())
            .unwrap();
        assert!(matches!(
            service.decode::<JwtClaims>(&token),
            Err(JwtError::InvalidClaims { .. })
        ));
    }

    #[test]
    fn test_realm_issuer_accepted() {
        let service = service().with_realm_issuer("issuer-a");
        let token = service
            .encode(&JwtClaims::builder("issuer-a", "alice").build())
            .unwrap();
        assert_eq!(service.decode::<JwtClaims>(&token).unwrap().claims.iss, "issuer-a");

        let token = service
            .encode(&JwtClaims::builder("issuer-b", "alice").build())
            .unwrap();
        assert!(service.decode::<JwtClaims>(&token).is_err());
    }

    #[test]
    fn test_peek_audiences() {
        let service = service();
        let token = service
            .encode(
                &JwtClaims::builder("https://sts.example.com", "alice")
                    .audience("urn:a")
                    .audience("urn:b")
                    .build(),
            )
            .unwrap();
        assert_eq!(peek_audiences(&token), vec!["urn:a", "urn:b"]);
        assert!(peek_audiences("not-a-jwt").is_empty());
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("rs384".parse::<SigningAlgorithm>().unwrap(), SigningAlgorithm::RS384);
        assert!("HS256".parse::<SigningAlgorithm>().is_err());
    }
}
