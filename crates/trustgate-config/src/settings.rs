//! Configuration sections.
//!
//! Every section carries `#[serde(default)]` so a deployment file only needs
//! the values it changes.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, decode_secret};

/// Root configuration value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StsConfig {
    pub sts: StsSettings,
    pub lifetime: LifetimeSettings,
    pub signature: SignatureSettings,
    pub encryption: EncryptionSettings,
    pub keystore: KeystoreSettings,
    pub jwt: JwtSettings,
    pub realm_parser: RealmParserSettings,
    pub realms: BTreeMap<String, RealmSettings>,
    pub relationships: Vec<RelationshipSettings>,
    /// Mapper applied to realm pairs without a relationship-level override.
    pub identity_mapper: Option<IdentityMapperSettings>,
    pub claims_mapper: Option<ClaimsMapperSettings>,
    pub services: Vec<ServiceSettings>,
    pub renewal: RenewalSettings,
    pub cancellation: CancellationSettings,
    pub delegation: DelegationSettings,
    pub store: StoreSettings,
    pub users: Vec<UserSettings>,
    pub claims: ClaimsSettings,
    pub logging: LoggingSettings,
}

/// Issuer identity and issuance switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StsSettings {
    /// Issuer name written into tokens when no realm overrides it.
    pub issuer: String,
    pub encrypt_issued_token: bool,
    pub return_references: bool,
    pub include_lifetime: bool,
    /// Persist SAML and JWT tokens in the token store. SCTs are always stored.
    pub cache_issued_tokens: bool,
}

impl Default for StsSettings {
    fn default() -> Self {
        Self {
            issuer: "trustgate".to_string(),
            encrypt_issued_token: false,
            return_references: true,
            include_lifetime: true,
            cache_issued_tokens: true,
        }
    }
}

/// Token lifetime policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeSettings {
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    pub accept_client_lifetime: bool,
    pub fail_lifetime_exceedance: bool,
    /// How far in the future a client-supplied `Created` may lie.
    #[serde(with = "humantime_serde")]
    pub future_time_to_live: Duration,
}

impl Default for LifetimeSettings {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(300),
            max: Duration::from_secs(12 * 60 * 60),
            accept_client_lifetime: false,
            fail_lifetime_exceedance: true,
            future_time_to_live: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureSettings {
    /// Key store alias used to sign issued tokens. Falls back to the key
    /// store's default alias.
    pub alias: Option<String>,
    pub sign_tokens: bool,
}

impl Default for SignatureSettings {
    fn default() -> Self {
        Self {
            alias: None,
            sign_tokens: true,
        }
    }
}

/// Encryption overrides. Unset fields keep the engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    pub alias: Option<String>,
    pub algorithm: Option<String>,
    pub accepted_algorithms: Vec<String>,
    pub key_wrap_algorithm: Option<String>,
    pub accepted_key_wrap_algorithms: Vec<String>,
    pub key_identifier_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreSettings {
    pub default_alias: Option<String>,
    pub entries: Vec<KeyEntrySettings>,
}

impl KeystoreSettings {
    fn contains(&self, alias: &str) -> bool {
        self.entries.iter().any(|e| e.alias == alias)
    }
}

/// One symmetric key store entry and the certificate describing its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyEntrySettings {
    pub alias: String,
    /// Hex or base64 encoded secret.
    pub secret: String,
    pub subject_dn: Option<String>,
    pub trusted: bool,
    #[serde(with = "humantime_serde")]
    pub valid_for: Duration,
}

impl Default for KeyEntrySettings {
    fn default() -> Self {
        Self {
            alias: String::new(),
            secret: String::new(),
            subject_dn: None,
            trusted: true,
            valid_for: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// `RS256`, `RS384` or `ES384`.
    pub algorithm: String,
    pub key_id: Option<String>,
    pub private_key_pem: Option<PathBuf>,
    pub public_key_pem: Option<PathBuf>,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            algorithm: "ES384".to_string(),
            key_id: None,
            private_key_pem: None,
            public_key_pem: None,
        }
    }
}

/// Maps the request URL of an invocation to a realm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmParserSettings {
    pub default_realm: Option<String>,
    /// Path segment to realm.
    pub segments: BTreeMap<String, String>,
    /// Host name to realm.
    pub hosts: BTreeMap<String, String>,
}

impl RealmParserSettings {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.default_realm.is_some() || !self.segments.is_empty() || !self.hosts.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmSettings {
    pub issuer: String,
    pub signature_alias: Option<String>,
    pub encryption_alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    FederateIdentity,
    FederateClaims,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSettings {
    pub source_realm: String,
    pub target_realm: String,
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    #[serde(default)]
    pub identity_mapper: Option<IdentityMapperSettings>,
    #[serde(default)]
    pub claims_mapper: Option<ClaimsMapperSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IdentityMapperSettings {
    Uppercase,
    Lowercase,
    /// Explicit principal name translation.
    Table { entries: BTreeMap<String, String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClaimsMapperSettings {
    Uppercase,
    Lowercase,
    /// Claim type translation, values pass through.
    Rename { types: BTreeMap<String, String> },
}

/// A relying party the STS issues tokens for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Exact addresses, `prefix.*` wildcards or `regex:` patterns.
    pub endpoints: Vec<String>,
    pub token_type: Option<String>,
    pub key_type: Option<String>,
    pub encrypt_issued_token: bool,
    pub encryption: Option<EncryptionSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalSettings {
    pub allow_renewal_after_expiry: bool,
    /// Longest time a token may have been expired and still be renewed.
    #[serde(with = "humantime_serde")]
    pub max_expiry: Duration,
    pub verify_proof_of_possession: bool,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            allow_renewal_after_expiry: false,
            max_expiry: Duration::from_secs(30 * 60),
            verify_proof_of_possession: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationSettings {
    pub verify_proof_of_possession: bool,
}

impl Default for CancellationSettings {
    fn default() -> Self {
        Self {
            verify_proof_of_possession: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationHandlerKind {
    Saml,
    Hok,
    Username,
    Jwt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationSettings {
    /// Registration order of delegation handlers. Empty keeps the bearer
    /// SAML handler only.
    pub handlers: Vec<DelegationHandlerKind>,
    /// Callers allowed to present holder-of-key tokens without proving
    /// possession of the key.
    pub trusted_delegators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub enable_sweeper: bool,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            enable_sweeper: false,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// A UsernameToken credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub username: String,
    pub password: String,
    pub realm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimsSettings {
    pub stop_processing_on_error: bool,
    #[serde(rename = "static")]
    pub static_claims: Vec<StaticClaimSettings>,
}

impl Default for ClaimsSettings {
    fn default() -> Self {
        Self {
            stop_processing_on_error: true,
            static_claims: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticClaimSettings {
    pub principal: String,
    pub claim_type: String,
    pub values: Vec<String>,
    /// Realms the values apply to. Empty means every realm.
    pub realms: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

const JWT_ALGORITHMS: &[&str] = &["RS256", "RS384", "ES384"];
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl StsConfig {
    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sts.issuer.trim().is_empty() {
            return Err(ConfigError::missing("sts.issuer"));
        }

        self.validate_lifetime()?;
        self.validate_keystore()?;

        if !JWT_ALGORITHMS.contains(&self.jwt.algorithm.as_str()) {
            return Err(ConfigError::invalid_value(format!(
                "jwt.algorithm must be one of {JWT_ALGORITHMS:?}, got {}",
                self.jwt.algorithm
            )));
        }
        if self.jwt.private_key_pem.is_some() != self.jwt.public_key_pem.is_some() {
            return Err(ConfigError::invalid_value(
                "jwt.private_key_pem and jwt.public_key_pem must be set together",
            ));
        }

        for (name, realm) in &self.realms {
            if realm.issuer.trim().is_empty() {
                return Err(ConfigError::missing(format!("realms.{name}.issuer")));
            }
            for alias in [&realm.signature_alias, &realm.encryption_alias]
                .into_iter()
                .flatten()
            {
                self.require_alias(alias, &format!("realms.{name}"))?;
            }
        }

        let mut pairs = HashSet::new();
        for rel in &self.relationships {
            if rel.source_realm.is_empty() || rel.target_realm.is_empty() {
                return Err(ConfigError::missing("relationships[].source_realm/target_realm"));
            }
            if !pairs.insert((rel.source_realm.as_str(), rel.target_realm.as_str())) {
                return Err(ConfigError::invalid_value(format!(
                    "duplicate relationship {} -> {}",
                    rel.source_realm, rel.target_realm
                )));
            }
        }

        for (idx, service) in self.services.iter().enumerate() {
            if service.endpoints.is_empty() || service.endpoints.iter().any(|e| e.trim().is_empty())
            {
                return Err(ConfigError::invalid_value(format!(
                    "services[{idx}] needs at least one non-empty endpoint"
                )));
            }
            if let Some(alias) = service.encryption.as_ref().and_then(|e| e.alias.as_ref()) {
                self.require_alias(alias, &format!("services[{idx}].encryption"))?;
            }
        }

        if self.users.iter().any(|u| u.username.trim().is_empty()) {
            return Err(ConfigError::missing("users[].username"));
        }

        if self.store.enable_sweeper && self.store.sweep_interval.is_zero() {
            return Err(ConfigError::invalid_value(
                "store.sweep_interval must be greater than zero",
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(format!(
                "logging.level must be one of {LOG_LEVELS:?}, got {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    fn validate_lifetime(&self) -> Result<(), ConfigError> {
        let lifetime = &self.lifetime;
        if lifetime.default.is_zero() {
            return Err(ConfigError::invalid_value("lifetime.default must be greater than zero"));
        }
        if lifetime.default > lifetime.max {
            return Err(ConfigError::invalid_value(
                "lifetime.default must not exceed lifetime.max",
            ));
        }
        Ok(())
    }

    fn validate_keystore(&self) -> Result<(), ConfigError> {
        let mut aliases = HashSet::new();
        for entry in &self.keystore.entries {
            if entry.alias.trim().is_empty() {
                return Err(ConfigError::missing("keystore.entries[].alias"));
            }
            if !aliases.insert(entry.alias.as_str()) {
                return Err(ConfigError::invalid_value(format!(
                    "duplicate keystore alias {}",
                    entry.alias
                )));
            }
            decode_secret(&entry.secret).map_err(|e| {
                ConfigError::invalid_value(format!("keystore alias {}: {e}", entry.alias))
            })?;
        }

        if let Some(alias) = &self.keystore.default_alias {
            self.require_alias(alias, "keystore.default_alias")?;
        }
        if let Some(alias) = &self.signature.alias {
            self.require_alias(alias, "signature.alias")?;
        }
        if let Some(alias) = &self.encryption.alias {
            self.require_alias(alias, "encryption.alias")?;
        }
        Ok(())
    }

    fn require_alias(&self, alias: &str, field: &str) -> Result<(), ConfigError> {
        if self.keystore.contains(alias) {
            Ok(())
        } else {
            Err(ConfigError::invalid_value(format!(
                "{field} refers to unknown keystore alias {alias}"
            )))
        }
    }
}
