//! Relying-party services: endpoint address patterns, default token and key
//! types, and the encryption policy issued tokens follow.

use regex::Regex;
use trustgate_config::{EncryptionSettings, ServiceSettings};

use crate::constants::{algorithms, token_types};
use crate::error::{StsError, StsResult};

const REGEX_PREFIX: &str = "regex:";
const WILDCARD_SUFFIX: &str = ".*";

/// An AppliesTo address pattern.
#[derive(Debug, Clone)]
pub enum EndpointPattern {
    Exact(String),
    /// `prefix.*` matches every address starting with `prefix`.
    Prefix(String),
    /// `regex:<expr>`, matched against the whole address.
    Regex(Regex),
}

impl EndpointPattern {
    pub fn parse(pattern: &str) -> StsResult<Self> {
        if let Some(expr) = pattern.strip_prefix(REGEX_PREFIX) {
            let anchored = format!("^(?:{expr})$");
            return Regex::new(&anchored).map(Self::Regex).map_err(|e| {
                StsError::configuration(format!("invalid endpoint pattern {pattern}: {e}"))
            });
        }
        if let Some(prefix) = pattern.strip_suffix(WILDCARD_SUFFIX) {
            return Ok(Self::Prefix(prefix.to_string()));
        }
        Ok(Self::Exact(pattern.to_string()))
    }

    #[must_use]
    pub fn matches(&self, address: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == address,
            Self::Prefix(prefix) => address.starts_with(prefix.as_str()),
            Self::Regex(regex) => regex.is_match(address),
        }
    }
}

/// Encryption policy for tokens issued to a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionProperties {
    /// Recipient key alias. No alias means tokens stay unencrypted.
    pub alias: Option<String>,
    pub algorithm: String,
    pub accepted_algorithms: Vec<String>,
    pub key_wrap_algorithm: String,
    pub accepted_key_wrap_algorithms: Vec<String>,
    pub key_identifier_type: Option<String>,
}

impl Default for EncryptionProperties {
    fn default() -> Self {
        Self {
            alias: None,
            algorithm: algorithms::AES256_GCM.to_string(),
            accepted_algorithms: vec![
                algorithms::AES128_GCM.to_string(),
                algorithms::AES256_GCM.to_string(),
            ],
            key_wrap_algorithm: algorithms::RSA_OAEP_MGF1P.to_string(),
            accepted_key_wrap_algorithms: vec![
                algorithms::RSA_OAEP_MGF1P.to_string(),
                algorithms::KW_AES256.to_string(),
            ],
            key_identifier_type: None,
        }
    }
}

impl EncryptionProperties {
    /// Applies the set values of `settings` on top of `self`.
    #[must_use]
    pub fn overlay(&self, settings: &EncryptionSettings) -> Self {
        let mut props = self.clone();
        if let Some(alias) = &settings.alias {
            props.alias = Some(alias.clone());
        }
        if let Some(algorithm) = &settings.algorithm {
            props.algorithm = algorithm.clone();
        }
        if !settings.accepted_algorithms.is_empty() {
            props.accepted_algorithms = settings.accepted_algorithms.clone();
        }
        if let Some(algorithm) = &settings.key_wrap_algorithm {
            props.key_wrap_algorithm = algorithm.clone();
        }
        if !settings.accepted_key_wrap_algorithms.is_empty() {
            props.accepted_key_wrap_algorithms = settings.accepted_key_wrap_algorithms.clone();
        }
        if let Some(kind) = &settings.key_identifier_type {
            props.key_identifier_type = Some(kind.clone());
        }
        props
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_accepted_algorithms(mut self, algorithms: Vec<String>) -> Self {
        self.accepted_algorithms = algorithms;
        self
    }

    /// Content algorithm to use: the requested one if accepted, else the
    /// default.
    pub fn resolve_algorithm(&self, requested: Option<&str>) -> StsResult<String> {
        match requested {
            Some(algorithm) if !self.accepted_algorithms.iter().any(|a| a == algorithm) => {
                tracing::warn!(algorithm, "Requested encryption algorithm not accepted");
                Err(StsError::encryption_algorithm_not_accepted(algorithm))
            }
            Some(algorithm) => Ok(algorithm.to_string()),
            None => Ok(self.algorithm.clone()),
        }
    }

    pub fn resolve_key_wrap_algorithm(&self, requested: Option<&str>) -> StsResult<String> {
        match requested {
            Some(algorithm)
                if !self.accepted_key_wrap_algorithms.iter().any(|a| a == algorithm) =>
            {
                tracing::warn!(algorithm, "Requested key wrap algorithm not accepted");
                Err(StsError::encryption_algorithm_not_accepted(algorithm))
            }
            Some(algorithm) => Ok(algorithm.to_string()),
            None => Ok(self.key_wrap_algorithm.clone()),
        }
    }
}

/// A relying party the STS issues tokens for.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub endpoints: Vec<EndpointPattern>,
    pub token_type: Option<String>,
    pub key_type: Option<String>,
    pub encrypt_issued_token: bool,
    pub encryption: EncryptionProperties,
}

impl ServiceDescriptor {
    pub fn new<I, S>(endpoints: I) -> StsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = endpoints
            .into_iter()
            .map(|e| EndpointPattern::parse(e.as_ref()))
            .collect::<StsResult<Vec<_>>>()?;
        Ok(Self {
            endpoints,
            token_type: None,
            key_type: None,
            encrypt_issued_token: false,
            encryption: EncryptionProperties::default(),
        })
    }

    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    #[must_use]
    pub fn with_key_type(mut self, key_type: impl Into<String>) -> Self {
        self.key_type = Some(key_type.into());
        self
    }

    #[must_use]
    pub fn with_encryption(mut self, encryption: EncryptionProperties) -> Self {
        self.encrypt_issued_token = true;
        self.encryption = encryption;
        self
    }

    /// Builds a descriptor, layering its encryption overrides on `defaults`.
    pub fn from_settings(
        settings: &ServiceSettings,
        defaults: &EncryptionProperties,
    ) -> StsResult<Self> {
        let mut service = Self::new(&settings.endpoints)?;
        service.token_type = settings
            .token_type
            .as_deref()
            .map(|t| token_types::resolve_alias(t).to_string());
        service.key_type = settings.key_type.clone();
        service.encrypt_issued_token = settings.encrypt_issued_token;
        service.encryption = match &settings.encryption {
            Some(overrides) => defaults.overlay(overrides),
            None => defaults.clone(),
        };
        Ok(service)
    }

    #[must_use]
    pub fn matches(&self, address: &str) -> bool {
        self.endpoints.iter().any(|e| e.matches(address))
    }
}

/// Registered services in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<ServiceDescriptor>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self { services }
    }

    /// First service with an endpoint matching `address`.
    #[must_use]
    pub fn find(&self, address: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.matches(address))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_pattern() {
        let pattern = EndpointPattern::parse("http://x/dummy.*").unwrap();
        assert!(pattern.matches("http://x/dummy"));
        assert!(pattern.matches("http://x/dummy2"));
        assert!(!pattern.matches("http://x/other"));
    }

    #[test]
    fn test_exact_pattern() {
        let pattern = EndpointPattern::parse("http://x/dummy").unwrap();
        assert!(pattern.matches("http://x/dummy"));
        assert!(!pattern.matches("http://x/dummy2"));
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = EndpointPattern::parse(r"regex:https://[a-z]+\.example\.com/sts").unwrap();
        assert!(pattern.matches("https://alpha.example.com/sts"));
        assert!(!pattern.matches("https://alpha.example.com/sts/extra"));
        assert!(EndpointPattern::parse("regex:(").is_err());
    }

    #[test]
    fn test_registry_first_match() {
        let registry = ServiceRegistry::new(vec![
            ServiceDescriptor::new(["http://x/a.*"])
                .unwrap()
                .with_token_type(token_types::JWT),
            ServiceDescriptor::new(["http://x/a1"])
                .unwrap()
                .with_token_type(token_types::SAML_2_0),
        ]);
        let found = registry.find("http://x/a1").unwrap();
        assert_eq!(found.token_type.as_deref(), Some(token_types::JWT));
        assert!(registry.find("http://y").is_none());
    }

    #[test]
    fn test_algorithm_resolution() {
        let props = EncryptionProperties::default()
            .with_accepted_algorithms(vec![algorithms::AES128_GCM.to_string()]);
        assert_eq!(
            props.resolve_algorithm(Some(algorithms::AES128_GCM)).unwrap(),
            algorithms::AES128_GCM
        );
        let err = props.resolve_algorithm(Some(algorithms::AES256_GCM)).unwrap_err();
        assert!(matches!(err, StsError::EncryptionAlgorithmNotAccepted { .. }));
        assert_eq!(props.resolve_algorithm(None).unwrap(), algorithms::AES256_GCM);
        assert!(props.resolve_key_wrap_algorithm(Some("urn:unknown")).is_err());
    }

    #[test]
    fn test_settings_overlay() {
        let settings = ServiceSettings {
            endpoints: vec!["http://x/svc".to_string()],
            token_type: Some("saml2.0".to_string()),
            key_type: None,
            encrypt_issued_token: true,
            encryption: Some(EncryptionSettings {
                alias: Some("svc".to_string()),
                ..Default::default()
            }),
        };
        let service = ServiceDescriptor::from_settings(&settings, &EncryptionProperties::default())
            .unwrap();
        assert_eq!(service.token_type.as_deref(), Some(token_types::SAML_2_0));
        assert_eq!(service.encryption.alias.as_deref(), Some("svc"));
        assert_eq!(service.encryption.algorithm, algorithms::AES256_GCM);
        assert!(service.encrypt_issued_token);
    }
}
