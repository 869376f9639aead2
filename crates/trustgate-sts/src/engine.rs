//! Engine wiring.
//!
//! [`EngineBuilder`] collects plugins, realms and services once at startup
//! and freezes them into an [`EngineConfig`]. The config is shared behind an
//! `Arc` by every operation and is never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use trustgate_config::{JwtSettings, StsConfig};

use crate::canceller::{SctTokenCanceller, TokenCanceller};
use crate::claims::{ClaimsManager, StaticClaimsHandler};
use crate::crypto::SymmetricKeyStore;
use crate::delegation::{DelegationHandler, SamlDelegationHandler, delegation_handlers_from_settings};
use crate::error::{StsError, StsResult};
use crate::events::{EventPublisher, LoggingEventListener, StsEventListener};
use crate::federation::{
    Federation, IssuerRealmCodec, RealmParser, RealmProperties, Relationship, RelationshipResolver,
    SamlRealmCodec, UrlRealmParser, claims_mapper_from_settings, identity_mapper_from_settings,
};
use crate::lifetime::LifetimePolicy;
use crate::properties::StsProperties;
use crate::provider::{JwtTokenProvider, SamlTokenProvider, SctTokenProvider, TokenProvider};
use crate::registry::PluginRegistry;
use crate::renewer::{RenewalPolicy, SamlTokenRenewer, SctTokenRenewer, TokenRenewer};
use crate::service::{EncryptionProperties, ServiceDescriptor, ServiceRegistry};
use crate::store::{InMemoryTokenStore, TokenStore};
use crate::sts::SecurityTokenService;
use crate::token::jwt::{JwtService, SigningAlgorithm, SigningKeyPair};
use crate::validator::{
    JwtTokenValidator, SamlTokenValidator, SctTokenValidator, TokenValidator,
    UsernameTokenValidator, X509TokenValidator,
};

/// Background eviction of expired store entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperSettings {
    pub interval: Duration,
    /// How long expired tokens stay around for renewal after expiry.
    pub retention: time::Duration,
}

/// Immutable state shared by all operations.
pub struct EngineConfig {
    pub properties: StsProperties,
    pub store: Arc<dyn TokenStore>,
    pub claims_manager: ClaimsManager,
    pub federation: Federation,
    pub realm_parser: Option<Arc<dyn RealmParser>>,
    /// Source realm of a SAML assertion carried in the message header.
    pub message_realm_codec: Option<Arc<dyn SamlRealmCodec>>,
    pub services: ServiceRegistry,
    pub providers: PluginRegistry<dyn TokenProvider>,
    pub validators: PluginRegistry<dyn TokenValidator>,
    pub renewers: PluginRegistry<dyn TokenRenewer>,
    pub cancellers: PluginRegistry<dyn TokenCanceller>,
    pub delegation_handlers: PluginRegistry<dyn DelegationHandler>,
    pub events: EventPublisher,
    pub sweeper: Option<SweeperSettings>,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("properties", &self.properties)
            .field("federation", &self.federation)
            .field("realm_parser", &self.realm_parser.is_some())
            .field("services", &self.services)
            .field("providers", &self.providers)
            .field("validators", &self.validators)
            .field("renewers", &self.renewers)
            .field("cancellers", &self.cancellers)
            .field("delegation_handlers", &self.delegation_handlers)
            .field("events", &self.events)
            .field("sweeper", &self.sweeper)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EngineConfig`].
///
/// Plugins are consulted in the order they were added.
pub struct EngineBuilder {
    properties: StsProperties,
    store: Option<Arc<dyn TokenStore>>,
    claims_manager: ClaimsManager,
    federation: Federation,
    realm_parser: Option<Arc<dyn RealmParser>>,
    message_realm_codec: Option<Arc<dyn SamlRealmCodec>>,
    services: Vec<ServiceDescriptor>,
    providers: PluginRegistry<dyn TokenProvider>,
    validators: PluginRegistry<dyn TokenValidator>,
    renewers: PluginRegistry<dyn TokenRenewer>,
    cancellers: PluginRegistry<dyn TokenCanceller>,
    delegation_handlers: Option<PluginRegistry<dyn DelegationHandler>>,
    events: EventPublisher,
    sweeper: Option<SweeperSettings>,
}

impl EngineBuilder {
    #[must_use]
    pub fn new(properties: StsProperties) -> Self {
        Self {
            properties,
            store: None,
            claims_manager: ClaimsManager::new(),
            federation: Federation::default(),
            realm_parser: None,
            message_realm_codec: None,
            services: Vec::new(),
            providers: PluginRegistry::new(),
            validators: PluginRegistry::new(),
            renewers: PluginRegistry::new(),
            cancellers: PluginRegistry::new(),
            delegation_handlers: None,
            events: EventPublisher::new(),
            sweeper: None,
        }
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn claims_manager(mut self, claims_manager: ClaimsManager) -> Self {
        self.claims_manager = claims_manager;
        self
    }

    #[must_use]
    pub fn federation(mut self, federation: Federation) -> Self {
        self.federation = federation;
        self
    }

    #[must_use]
    pub fn realm_parser(mut self, parser: Arc<dyn RealmParser>) -> Self {
        self.realm_parser = Some(parser);
        self
    }

    #[must_use]
    pub fn message_realm_codec(mut self, codec: Arc<dyn SamlRealmCodec>) -> Self {
        self.message_realm_codec = Some(codec);
        self
    }

    #[must_use]
    pub fn service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.providers.register(provider);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validators.register(validator);
        self
    }

    #[must_use]
    pub fn renewer(mut self, renewer: Arc<dyn TokenRenewer>) -> Self {
        self.renewers.register(renewer);
        self
    }

    #[must_use]
    pub fn canceller(mut self, canceller: Arc<dyn TokenCanceller>) -> Self {
        self.cancellers.register(canceller);
        self
    }

    /// Adds a delegation handler. Without any, only bearer SAML may be
    /// delegated.
    #[must_use]
    pub fn delegation_handler(mut self, handler: Arc<dyn DelegationHandler>) -> Self {
        self.delegation_handlers
            .get_or_insert_with(PluginRegistry::new)
            .register(handler);
        self
    }

    #[must_use]
    pub fn delegation_handlers(mut self, handlers: PluginRegistry<dyn DelegationHandler>) -> Self {
        self.delegation_handlers = Some(handlers);
        self
    }

    #[must_use]
    pub fn event_listener(mut self, listener: Arc<dyn StsEventListener>) -> Self {
        self.events = self.events.with_listener(listener);
        self
    }

    #[must_use]
    pub fn sweeper(mut self, settings: SweeperSettings) -> Self {
        self.sweeper = Some(settings);
        self
    }

    /// Wires the bundled plugins from deployment configuration.
    pub fn from_config(config: &StsConfig) -> StsResult<Self> {
        let crypto = Arc::new(SymmetricKeyStore::from_settings(&config.keystore)?);

        let mut properties = StsProperties::new(&config.sts.issuer, crypto);
        properties.signature_alias = config.signature.alias.clone();
        properties.sign_tokens = config.signature.sign_tokens;
        properties.encrypt_issued_token = config.sts.encrypt_issued_token;
        properties.return_references = config.sts.return_references;
        properties.include_lifetime = config.sts.include_lifetime;
        properties.cache_issued_tokens = config.sts.cache_issued_tokens;
        properties.encryption = EncryptionProperties::default().overlay(&config.encryption);
        properties.lifetime = LifetimePolicy::from_settings(&config.lifetime)?;
        for (name, realm) in &config.realms {
            properties.realms.insert(
                name.clone(),
                RealmProperties {
                    issuer: Some(realm.issuer.clone()),
                    signature_alias: realm.signature_alias.clone(),
                    signature_crypto: None,
                    encryption_alias: realm.encryption_alias.clone(),
                },
            );
        }

        let issuer_realms: HashMap<String, String> = config
            .realms
            .iter()
            .map(|(name, realm)| (realm.issuer.clone(), name.clone()))
            .collect();
        // realm JWTs carry the realm issuer and are signed with the one JWT key
        let mut jwt = JwtService::new(jwt_signing_key(&config.jwt)?, &config.sts.issuer);
        for issuer in issuer_realms.keys() {
            jwt = jwt.with_realm_issuer(issuer);
        }
        let jwt = Arc::new(jwt);
        let jwt_validator = issuer_realms
            .iter()
            .fold(JwtTokenValidator::new(Arc::clone(&jwt)), |validator, (issuer, realm)| {
                validator.with_issuer_realm(issuer, realm)
            });
        let realm_codec: Arc<dyn SamlRealmCodec> = Arc::new(IssuerRealmCodec::new(issuer_realms));

        let renewal = RenewalPolicy::from_settings(&config.renewal)?;

        let mut builder = Self::new(properties)
            .store(Arc::new(InMemoryTokenStore::new()))
            .claims_manager(claims_manager_from_config(config))
            .federation(federation_from_config(config)?)
            .message_realm_codec(Arc::clone(&realm_codec))
            .provider(Arc::new(SamlTokenProvider::new()))
            .provider(Arc::new(JwtTokenProvider::new(Arc::clone(&jwt))))
            .provider(Arc::new(SctTokenProvider::new()))
            .validator(Arc::new(SamlTokenValidator::new().with_realm_codec(realm_codec)))
            .validator(Arc::new(jwt_validator))
            .validator(Arc::new(SctTokenValidator::new()))
            .validator(Arc::new(UsernameTokenValidator::from_settings(&config.users)))
            .validator(Arc::new(X509TokenValidator::new()))
            .renewer(Arc::new(SamlTokenRenewer::new(renewal)))
            .renewer(Arc::new(SctTokenRenewer::new(renewal)))
            .canceller(Arc::new(SctTokenCanceller::new(
                config.cancellation.verify_proof_of_possession,
            )))
            .delegation_handlers(delegation_handlers_from_settings(&config.delegation))
            .event_listener(Arc::new(LoggingEventListener));

        if config.realm_parser.is_enabled() {
            builder = builder.realm_parser(Arc::new(UrlRealmParser::from_settings(&config.realm_parser)));
        }
        for settings in &config.services {
            let service = ServiceDescriptor::from_settings(settings, &builder.properties.encryption)?;
            builder = builder.service(service);
        }
        if config.store.enable_sweeper {
            builder = builder.sweeper(SweeperSettings {
                interval: config.store.sweep_interval,
                retention: renewal.max_expiry,
            });
        }

        tracing::debug!(
            issuer = %config.sts.issuer,
            realms = config.realms.len(),
            services = config.services.len(),
            relationships = config.relationships.len(),
            "Engine wired from configuration"
        );
        Ok(builder)
    }

    #[must_use]
    pub fn build_config(self) -> EngineConfig {
        if self.providers.is_empty() {
            tracing::warn!("No token providers registered, every Issue will fail");
        }
        EngineConfig {
            properties: self.properties,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryTokenStore::new())),
            claims_manager: self.claims_manager,
            federation: self.federation,
            realm_parser: self.realm_parser,
            message_realm_codec: self.message_realm_codec,
            services: ServiceRegistry::new(self.services),
            providers: self.providers,
            validators: self.validators,
            renewers: self.renewers,
            cancellers: self.cancellers,
            delegation_handlers: self.delegation_handlers.unwrap_or_else(|| {
                PluginRegistry::new().with(Arc::new(SamlDelegationHandler) as Arc<dyn DelegationHandler>)
            }),
            events: self.events,
            sweeper: self.sweeper,
        }
    }

    #[must_use]
    pub fn build(self) -> SecurityTokenService {
        SecurityTokenService::new(self.build_config())
    }
}

fn claims_manager_from_config(config: &StsConfig) -> ClaimsManager {
    let mut manager =
        ClaimsManager::new().stop_processing_on_error(config.claims.stop_processing_on_error);
    if !config.claims.static_claims.is_empty() {
        manager = manager.with_handler(Arc::new(StaticClaimsHandler::from_settings(
            &config.claims.static_claims,
        )));
    }
    if let Some(mapper) = &config.identity_mapper {
        manager = manager.with_identity_mapper(identity_mapper_from_settings(mapper));
    }
    manager
}

fn federation_from_config(config: &StsConfig) -> StsResult<Federation> {
    let relationships = config.relationships.iter().map(|settings| {
        let mut relationship = Relationship::new(
            &settings.source_realm,
            &settings.target_realm,
            settings.kind.into(),
        );
        if let Some(mapper) = &settings.identity_mapper {
            relationship = relationship.with_identity_mapper(identity_mapper_from_settings(mapper));
        }
        if let Some(mapper) = &settings.claims_mapper {
            relationship = relationship.with_claims_mapper(claims_mapper_from_settings(mapper));
        }
        relationship
    });

    let mut federation = Federation::new(RelationshipResolver::new(relationships)?);
    if let Some(mapper) = &config.identity_mapper {
        federation = federation.with_identity_mapper(identity_mapper_from_settings(mapper));
    }
    if let Some(mapper) = &config.claims_mapper {
        federation = federation.with_claims_mapper(claims_mapper_from_settings(mapper));
    }
    Ok(federation)
}

/// Loads the PEM pair when both files are configured, otherwise generates
/// an ephemeral key.
fn jwt_signing_key(settings: &JwtSettings) -> StsResult<SigningKeyPair> {
    let algorithm: SigningAlgorithm = settings.algorithm.parse()?;
    match (&settings.private_key_pem, &settings.public_key_pem) {
        (Some(private_path), Some(public_path)) => {
            let read = |path: &std::path::Path| {
                std::fs::read_to_string(path).map_err(|e| {
                    StsError::configuration(format!("cannot read {}: {e}", path.display()))
                })
            };
            let kid = settings
                .key_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let key = SigningKeyPair::from_pem(kid, algorithm, &read(private_path)?, &read(public_path)?)?;
            tracing::info!(kid = %key.kid, algorithm = %algorithm, "JWT signing key loaded");
            Ok(key)
        }
        (None, None) => {
            let key = if algorithm.is_rsa() {
                SigningKeyPair::generate_rsa(algorithm)?
            } else {
                SigningKeyPair::generate_ec()?
            };
            tracing::warn!(
                kid = %key.kid,
                algorithm = %algorithm,
                "No JWT key files configured, using an ephemeral signing key"
            );
            Ok(key)
        }
        _ => Err(StsError::configuration(
            "jwt.private_key_pem and jwt.public_key_pem must be set together",
        )),
    }
}

#[cfg(test)]
mod tests {
    use trustgate_config::{
        DelegationHandlerKind, KeyEntrySettings, RealmSettings, RelationshipKind,
        RelationshipSettings,
    };

    use super::*;

    fn config() -> StsConfig {
        let mut config = StsConfig::default();
        config.sts.issuer = "https://sts.example.com".to_string();
        config.keystore.entries.push(KeyEntrySettings {
            alias: "sts".to_string(),
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            subject_dn: Some("CN=sts".to_string()),
            trusted: true,
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_from_config_registers_bundled_plugins() {
        let engine = EngineBuilder::from_config(&config()).unwrap().build_config();
        assert_eq!(engine.providers.len(), 3);
        assert_eq!(engine.validators.len(), 5);
        assert_eq!(engine.renewers.len(), 2);
        assert_eq!(engine.cancellers.len(), 1);
        assert_eq!(engine.delegation_handlers.len(), 1);
        assert_eq!(engine.events.len(), 1);
        assert!(engine.realm_parser.is_none());
        assert!(engine.sweeper.is_none());
    }

    #[test]
    fn test_from_config_realms_and_relationships() {
        let mut config = config();
        config.realms.insert(
            "A".to_string(),
            RealmSettings {
                issuer: "issuer-a".to_string(),
                signature_alias: None,
                encryption_alias: None,
            },
        );
        config.realm_parser.default_realm = Some("A".to_string());
        config.relationships.push(RelationshipSettings {
            source_realm: "A".to_string(),
            target_realm: "B".to_string(),
            kind: RelationshipKind::FederateIdentity,
            identity_mapper: None,
            claims_mapper: None,
        });
        config.delegation.handlers = vec![DelegationHandlerKind::Saml, DelegationHandlerKind::Jwt];

        let engine = EngineBuilder::from_config(&config).unwrap().build_config();
        assert_eq!(engine.properties.issuer_for(Some("A")), "issuer-a");
        assert!(engine.realm_parser.is_some());
        assert!(engine.federation.resolver().resolve("A", "B").is_some());
        assert_eq!(engine.delegation_handlers.len(), 2);
    }

    #[test]
    fn test_duplicate_relationship_rejected() {
        let mut config = config();
        let relationship = RelationshipSettings {
            source_realm: "A".to_string(),
            target_realm: "B".to_string(),
            kind: RelationshipKind::FederateClaims,
            identity_mapper: None,
            claims_mapper: None,
        };
        config.relationships = vec![relationship.clone(), relationship];
        assert!(matches!(
            EngineBuilder::from_config(&config),
            Err(StsError::Configuration { .. })
        ));
    }

    #[test]
    fn test_half_configured_jwt_keys_rejected() {
        let settings = JwtSettings {
            private_key_pem: Some("/tmp/private.pem".into()),
            ..Default::default()
        };
        assert!(jwt_signing_key(&settings).is_err());
    }

    #[test]
    fn test_default_delegation_handler() {
        let crypto = Arc::new(SymmetricKeyStore::new().with_entry("sts", vec![1; 32], "CN=sts"));
        let engine = EngineBuilder::new(StsProperties::new("issuer", crypto)).build_config();
        assert_eq!(engine.delegation_handlers.len(), 1);
        assert_eq!(engine.delegation_handlers.iter().next().unwrap().name(), "saml");
    }
}
