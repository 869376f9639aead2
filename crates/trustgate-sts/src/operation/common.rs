//! Steps shared by the four operations.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::claims::{ClaimCollection, ClaimsManager, ClaimsParameters, ProcessedClaimCollection};
use crate::context::{InvocationContext, Principal};
use crate::delegation::DelegationParameters;
use crate::encoding;
use crate::engine::EngineConfig;
use crate::error::{StsError, StsResult};
use crate::events::StsEvent;
use crate::federation::RelationshipType;
use crate::provider::{ProofKey, TokenProvider, TokenProviderResponse};
use crate::request::{
    AppliesToElement, EntropyElement, KeyRequirements, KeyType, RequestParser, RequestRequirements,
    RequestSecurityToken, RequestType,
};
use crate::response::{RequestSecurityTokenResponse, RequestedProofToken};
use crate::service::{EncryptionProperties, ServiceDescriptor};
use crate::token::{EncryptedData, ReceivedToken, TokenElement, TokenReference, TokenState};
use crate::validator::{TokenValidatorParameters, TokenValidatorResponse};

/// What one operation publishes when it finishes.
pub(crate) struct OperationTrace {
    operation: RequestType,
    started: Instant,
    pub realm: Option<String>,
    pub principal: Option<String>,
    pub token_type: Option<String>,
    pub applies_to: Option<String>,
}

impl OperationTrace {
    pub(crate) fn start(operation: RequestType) -> Self {
        Self {
            operation,
            started: Instant::now(),
            realm: None,
            principal: None,
            token_type: None,
            applies_to: None,
        }
    }

    pub(crate) fn finish<T>(self, config: &EngineConfig, result: &StsResult<T>) {
        let mut event = StsEvent::new(self.operation, self.started.elapsed());
        event.realm = self.realm;
        event.principal = self.principal;
        event.token_type = self.token_type;
        event.applies_to = self.applies_to;
        if let Err(e) = result {
            event = event.failed(e);
        }
        config.events.publish(&event);
    }
}

/// Parses `request` for `operation`. A RequestType naming another operation
/// is rejected.
pub(crate) fn parse_request(
    config: &EngineConfig,
    request: &RequestSecurityToken,
    operation: RequestType,
) -> StsResult<RequestRequirements> {
    let requirements = RequestParser::new(&config.claims_manager).parse(request)?;
    if let Some(requested) = requirements.token.request_type {
        if requested != operation {
            warn!(%operation, request_type = %requested, "RequestType does not match operation");
            return Err(StsError::invalid_request(format!(
                "RequestType {} cannot be handled by the {operation} operation",
                requested.uri()
            )));
        }
    }
    Ok(requirements)
}

/// The service `applies_to` addresses. With no services registered every
/// address is accepted.
pub(crate) fn find_service<'a>(
    config: &'a EngineConfig,
    applies_to: Option<&str>,
) -> StsResult<Option<&'a ServiceDescriptor>> {
    let Some(address) = applies_to else {
        return Ok(None);
    };
    if config.services.is_empty() {
        debug!(applies_to = address, "No services registered, AppliesTo accepted");
        return Ok(None);
    }
    match config.services.find(address) {
        Some(service) => Ok(Some(service)),
        None => {
            warn!(applies_to = address, "AppliesTo matches no registered service");
            Err(StsError::invalid_request(format!(
                "AppliesTo {address} is not a registered service"
            )))
        }
    }
}

pub(crate) fn parse_realm(
    config: &EngineConfig,
    context: &InvocationContext,
) -> StsResult<Option<String>> {
    let realm = match &config.realm_parser {
        Some(parser) => parser.parse_realm(context)?,
        None => None,
    };
    debug!(realm = ?realm, "Realm resolved");
    Ok(realm)
}

/// Token type to issue: the requested one when a provider can build it,
/// else the service default.
pub(crate) fn resolve_token_type(
    config: &EngineConfig,
    requested: Option<&str>,
    service: Option<&ServiceDescriptor>,
    realm: Option<&str>,
) -> StsResult<String> {
    if let Some(token_type) = requested {
        if config
            .providers
            .iter()
            .any(|p| p.can_handle_token(token_type, realm))
        {
            return Ok(token_type.to_string());
        }
        debug!(token_type, "No provider for requested token type");
    }
    if let Some(default) = service.and_then(|s| s.token_type.as_deref()) {
        debug!(token_type = default, "Using service default token type");
        return Ok(default.to_string());
    }
    warn!(token_type = ?requested, realm = ?realm, "No token type can be issued");
    Err(StsError::unknown_token_type(requested))
}

pub(crate) fn resolve_key_type(
    requested: Option<KeyType>,
    service: Option<&ServiceDescriptor>,
) -> StsResult<KeyType> {
    if let Some(key_type) = requested {
        return Ok(key_type);
    }
    match service.and_then(|s| s.key_type.as_deref()) {
        Some(uri) => KeyType::from_uri(uri).ok_or_else(|| {
            StsError::configuration(format!("service key type {uri} is not a KeyType URI"))
        }),
        None => Ok(KeyType::Bearer),
    }
}

/// Runs the first validator that handles `token` and records its verdict on
/// the token.
pub(crate) fn validate_received(
    config: &EngineConfig,
    context: &InvocationContext,
    token: &mut ReceivedToken,
    realm: Option<&str>,
) -> StsResult<TokenValidatorResponse> {
    let validator = config
        .validators
        .find(|v| v.can_handle_token(token.token(), realm))
        .ok_or_else(|| {
            warn!(kind = ?token.kind(), "No validator for presented token");
            StsError::request_failed(format!("no validator for a {:?} token", token.kind()))
        })?;

    let response = validator.validate_token(&TokenValidatorParameters {
        properties: &config.properties,
        store: config.store.as_ref(),
        context,
        token,
        realm,
    })?;
    debug!(
        validator = validator.name(),
        state = ?response.state,
        principal = ?response.principal,
        "Token validated"
    );
    response.apply_to(token);
    Ok(response)
}

/// Validates an OnBehalfOf or ActAs token and asks the delegation handlers
/// whether the caller may use it.
pub(crate) fn authorize_delegation(
    config: &EngineConfig,
    context: &InvocationContext,
    token: &mut ReceivedToken,
    key_type: KeyType,
    applies_to: Option<&str>,
    realm: Option<&str>,
) -> StsResult<()> {
    let validation = validate_received(config, context, token, realm)?;
    if token.state() != TokenState::Valid {
        warn!(state = ?token.state(), reason = ?validation.reason, "Delegated token rejected");
        return Err(StsError::request_failed(format!(
            "delegated token is {:?}",
            token.state()
        )));
    }
    let token: &ReceivedToken = token;

    let Some(handler) = config.delegation_handlers.find(|h| h.can_handle_token(token)) else {
        warn!(kind = ?token.kind(), key_type = ?key_type, "No delegation handler for token");
        return Err(StsError::delegation_not_allowed(format!(
            "a {:?} token cannot be used for delegation",
            token.kind()
        )));
    };
    let response = handler.is_delegation_allowed(&DelegationParameters {
        store: config.store.as_ref(),
        context,
        token,
        key_type,
        applies_to,
    });
    if !response.allowed {
        let reason = response
            .reason
            .unwrap_or_else(|| "delegation refused".to_string());
        warn!(handler = handler.name(), reason = %reason, "Delegation refused");
        return Err(StsError::delegation_not_allowed(reason));
    }
    debug!(handler = handler.name(), "Delegation allowed");
    Ok(())
}

/// A delegated token restricted to audiences may only be exchanged for one
/// of them.
pub(crate) fn check_audience(token: &ReceivedToken, applies_to: Option<&str>) -> StsResult<()> {
    let Some(applies_to) = applies_to else {
        return Ok(());
    };
    let audiences = token.token().audiences();
    if audiences.is_empty() || audiences.iter().any(|a| a == applies_to) {
        return Ok(());
    }
    warn!(applies_to, audiences = ?audiences, "AppliesTo outside delegated token audience");
    Err(StsError::audience_mismatch(applies_to))
}

/// The identity a token is issued for, before federation.
#[derive(Debug, Clone, Default)]
pub(crate) struct Subject {
    pub principal: Option<Principal>,
    pub roles: Vec<String>,
    pub source_realm: Option<String>,
    /// Claims the identity arrived with.
    pub claims: ProcessedClaimCollection,
}

impl Subject {
    pub(crate) fn from_token(token: &ReceivedToken) -> Self {
        Self {
            principal: token.principal().cloned(),
            roles: token.roles().to_vec(),
            source_realm: token.realm().map(str::to_string),
            claims: token.claims().clone(),
        }
    }

    /// The caller itself. A SAML assertion in the message header supplies
    /// the source realm and claims.
    pub(crate) fn from_context(config: &EngineConfig, context: &InvocationContext) -> Self {
        let mut subject = Self {
            principal: context.principal().cloned(),
            roles: context.roles().to_vec(),
            ..Self::default()
        };
        if let Some(assertion) = context.message_assertion() {
            subject.source_realm = config
                .message_realm_codec
                .as_ref()
                .and_then(|codec| codec.realm_for(assertion));
            subject.claims = assertion.claims();
        }
        subject
    }

    pub(crate) fn principal_name(&self) -> Option<String> {
        self.principal.as_ref().map(|p| p.name().to_string())
    }
}

/// Principal and claims after federation into `realm`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedIdentity {
    pub principal: Option<Principal>,
    pub claims: ProcessedClaimCollection,
}

/// Federates `subject` into `realm` and resolves the requested claims there.
pub(crate) fn resolve_identity(
    config: &EngineConfig,
    subject: &Subject,
    realm: Option<&str>,
    requested: Option<&ClaimCollection>,
    applies_to: Option<&str>,
    token_type: &str,
) -> StsResult<ResolvedIdentity> {
    let mut parameters = ClaimsParameters {
        principal: subject.principal.clone(),
        roles: subject.roles.clone(),
        realm: realm.map(str::to_string),
        applies_to: applies_to.map(str::to_string),
        token_type: Some(token_type.to_string()),
    };

    let Some(principal) = &subject.principal else {
        let claims = match requested {
            Some(requested) => config
                .claims_manager
                .retrieve_claim_values(requested, &parameters)?,
            None => ProcessedClaimCollection::default(),
        };
        return Ok(ResolvedIdentity {
            principal: None,
            claims,
        });
    };

    let identity = config
        .federation
        .federate_principal(subject.source_realm.as_deref(), realm, principal)?;
    parameters.principal = Some(identity.principal.clone());

    let Some(requested) = requested else {
        return Ok(ResolvedIdentity {
            principal: Some(identity.principal),
            claims: ProcessedClaimCollection::default(),
        });
    };

    let claims = match &identity.relationship {
        Some(relationship) if relationship.relationship_type == RelationshipType::FederateClaims => {
            let source = if subject.claims.is_empty() {
                let source_parameters = ClaimsParameters {
                    principal: Some(principal.clone()),
                    realm: Some(relationship.source_realm.clone()),
                    ..parameters.clone()
                };
                config
                    .claims_manager
                    .retrieve_claim_values(requested, &source_parameters)?
            } else {
                subject.claims.clone()
            };
            let mapped = config
                .federation
                .federate_claims(relationship, &source, &parameters)?
                .restricted_to(requested);
            ClaimsManager::validate_claim_values(requested, &mapped)?;
            debug!(
                source = %relationship.source_realm,
                target = %relationship.target_realm,
                claims = mapped.len(),
                "Claims federated"
            );
            mapped
        }
        _ => config
            .claims_manager
            .retrieve_claim_values(requested, &parameters)?,
    };

    Ok(ResolvedIdentity {
        principal: Some(identity.principal),
        claims,
    })
}

/// Provider for `token_type`. When several can build it, the only one
/// owning `realm` wins; two owners are a configuration error.
pub(crate) fn select_provider<'a>(
    config: &'a EngineConfig,
    token_type: &str,
    realm: Option<&str>,
) -> StsResult<&'a Arc<dyn TokenProvider>> {
    let candidates: Vec<&'a Arc<dyn TokenProvider>> = config
        .providers
        .iter()
        .filter(|p| p.can_handle_token(token_type, realm))
        .collect();
    let Some(first) = candidates.first().copied() else {
        warn!(token_type, realm = ?realm, "No provider for token type");
        return Err(StsError::unknown_token_type(Some(token_type)));
    };

    if let Some(realm) = realm {
        let owners: Vec<&'a Arc<dyn TokenProvider>> = candidates
            .iter()
            .copied()
            .filter(|p| p.has_realm(realm))
            .collect();
        match owners.as_slice() {
            [] => {}
            [owner] => return Ok(*owner),
            _ => {
                let names: Vec<&str> = owners.iter().map(|p| p.name()).collect();
                warn!(token_type, realm, providers = ?names, "Several providers own the realm");
                return Err(StsError::configuration(format!(
                    "providers {names:?} all claim realm {realm} for {token_type}"
                )));
            }
        }
    }
    Ok(first)
}

/// Encryption policy for a token issued to `service` in `realm`.
pub(crate) fn encryption_for(
    config: &EngineConfig,
    service: Option<&ServiceDescriptor>,
    realm: Option<&str>,
) -> EncryptionProperties {
    let mut encryption = service.map_or_else(
        || config.properties.encryption.clone(),
        |s| s.encryption.clone(),
    );
    if encryption.alias.is_none() {
        encryption.alias = config
            .properties
            .realm(realm)
            .and_then(|r| r.encryption_alias.clone());
    }
    encryption
}

/// Encrypts `token` when the engine or the service asks for it and a
/// recipient alias is known.
pub(crate) fn encrypt_token(
    config: &EngineConfig,
    token: TokenElement,
    service: Option<&ServiceDescriptor>,
    encryption: &EncryptionProperties,
    key: &KeyRequirements,
) -> StsResult<TokenElement> {
    let required = config.properties.encrypt_issued_token
        || service.is_some_and(|s| s.encrypt_issued_token);
    if !required {
        return Ok(token);
    }

    let algorithm = encryption.resolve_algorithm(key.encryption_algorithm.as_deref())?;
    let key_wrap_algorithm =
        encryption.resolve_key_wrap_algorithm(key.key_wrap_algorithm.as_deref())?;
    let Some(alias) = encryption.alias.as_deref() else {
        debug!("No encryption alias configured, issued token left unencrypted");
        return Ok(token);
    };

    let encrypted = EncryptedData::encrypt(
        config.properties.crypto.as_ref(),
        &token,
        alias,
        &algorithm,
        &key_wrap_algorithm,
        encryption.key_identifier_type.as_deref(),
    )?;
    debug!(alias, algorithm = %algorithm, "Issued token encrypted");
    Ok(TokenElement::Encrypted(encrypted))
}

fn proof_token(proof: Option<&ProofKey>) -> (Option<RequestedProofToken>, Option<EntropyElement>) {
    match proof {
        Some(ProofKey::Secret(secret)) => (
            Some(RequestedProofToken::BinarySecret(encoding::encode(secret))),
            None,
        ),
        Some(ProofKey::Computed {
            server_entropy,
            algorithm,
        }) => (
            Some(RequestedProofToken::ComputedKey(algorithm.clone())),
            Some(EntropyElement::nonce(server_entropy)),
        ),
        Some(ProofKey::ClientEntropy) | None => (None, None),
    }
}

/// Sets the token, its references and the lifetime on `response`.
pub(crate) fn attach_token(
    config: &EngineConfig,
    response: &mut RequestSecurityTokenResponse,
    token_type: &str,
    token: TokenElement,
    token_id: &str,
    attached_id: &str,
) {
    response.token_type = Some(token_type.to_string());
    response.requested_security_token = Some(token);
    if config.properties.return_references {
        response.requested_attached_reference =
            Some(TokenReference::for_token(token_type, attached_id, true));
        response.requested_unattached_reference =
            Some(TokenReference::for_token(token_type, token_id, false));
    }
}

/// Response for a freshly issued token.
pub(crate) fn issued_response(
    config: &EngineConfig,
    context: Option<String>,
    token_type: &str,
    applies_to: Option<&str>,
    token: TokenElement,
    provided: &TokenProviderResponse,
) -> RequestSecurityTokenResponse {
    let mut response = RequestSecurityTokenResponse::new(context);
    attach_token(
        config,
        &mut response,
        token_type,
        token,
        &provided.token_id,
        provided.attached_id(),
    );
    response.applies_to = applies_to.map(AppliesToElement::address);
    if config.properties.include_lifetime {
        response.lifetime = provided.lifetime.clone();
    }
    let (proof, entropy) = proof_token(provided.proof.as_ref());
    response.requested_proof_token = proof;
    response.entropy = entropy;
    response.key_size = provided.key_size;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::token_types;
    use crate::context::Principal;
    use crate::crypto::SymmetricKeyStore;
    use crate::engine::EngineBuilder;
    use crate::properties::StsProperties;
    use crate::provider::{SamlTokenProvider, TokenProviderParameters};
    use crate::token::PresentedToken;

    /// Provider that owns a fixed set of realms.
    struct RealmProvider(&'static str, Vec<&'static str>);

    impl TokenProvider for RealmProvider {
        fn name(&self) -> &str {
            self.0
        }

        fn can_handle_token(&self, token_type: &str, _realm: Option<&str>) -> bool {
            token_type == token_types::JWT
        }

        fn has_realm(&self, realm: &str) -> bool {
            self.1.iter().any(|r| *r == realm)
        }

        fn create_token(&self, _: &TokenProviderParameters<'_>) -> StsResult<TokenProviderResponse> {
            Err(StsError::request_failed("not used"))
        }
    }

    fn engine(builder: impl FnOnce(EngineBuilder) -> EngineBuilder) -> EngineConfig {
        let crypto = SymmetricKeyStore::new().with_entry("sts", vec![1; 32], "CN=sts");
        let properties = StsProperties::new("https://sts.example.com", Arc::new(crypto));
        builder(EngineBuilder::new(properties)).build_config()
    }

    #[test]
    fn test_provider_owning_realm_preferred() {
        let config = engine(|b| {
            b.provider(Arc::new(RealmProvider("first", vec!["A"])))
                .provider(Arc::new(RealmProvider("second", vec!["B"])))
        });
        let chosen = select_provider(&config, token_types::JWT, Some("B")).unwrap();
        assert_eq!(chosen.name(), "second");
        let chosen = select_provider(&config, token_types::JWT, Some("C")).unwrap();
        assert_eq!(chosen.name(), "first");
        let chosen = select_provider(&config, token_types::JWT, None).unwrap();
        assert_eq!(chosen.name(), "first");
    }

    #[test]
    fn test_ambiguous_realm_owners_rejected() {
        let config = engine(|b| {
            b.provider(Arc::new(RealmProvider("first", vec!["A"])))
                .provider(Arc::new(RealmProvider("second", vec!["A"])))
        });
        let err = select_provider(&config, token_types::JWT, Some("A")).err().unwrap();
        assert!(matches!(err, StsError::Configuration { .. }));
    }

    #[test]
    fn test_token_type_falls_back_to_service_default() {
        let config = engine(|b| b.provider(Arc::new(SamlTokenProvider::new())));
        let service = ServiceDescriptor::new(["http://x/svc"])
            .unwrap()
            .with_token_type(token_types::SAML_2_0);

        let resolved =
            resolve_token_type(&config, Some("urn:unknown"), Some(&service), None).unwrap();
        assert_eq!(resolved, token_types::SAML_2_0);

        let err = resolve_token_type(&config, Some("urn:unknown"), None, None).unwrap_err();
        assert_eq!(err.fault_code().as_str(), "InvalidRequest");
    }

    #[test]
    fn test_key_type_from_service() {
        let service = ServiceDescriptor::new(["http://x/svc"])
            .unwrap()
            .with_key_type(crate::constants::key_types::SYMMETRIC_KEY);
        assert_eq!(resolve_key_type(None, Some(&service)).unwrap(), KeyType::SymmetricKey);
        assert_eq!(
            resolve_key_type(Some(KeyType::PublicKey), Some(&service)).unwrap(),
            KeyType::PublicKey
        );
        assert_eq!(resolve_key_type(None, None).unwrap(), KeyType::Bearer);
    }

    #[test]
    fn test_services_restrict_applies_to() {
        let open = engine(|b| b);
        assert!(find_service(&open, Some("http://anything")).unwrap().is_none());

        let closed = engine(|b| b.service(ServiceDescriptor::new(["http://x/dummy.*"]).unwrap()));
        assert!(find_service(&closed, Some("http://x/dummy2")).unwrap().is_some());
        let err = find_service(&closed, Some("http://y")).unwrap_err();
        assert_eq!(err.fault_code().as_str(), "InvalidRequest");
        assert!(find_service(&closed, None).unwrap().is_none());
    }

    #[test]
    fn test_audience_checked_only_with_applies_to() {
        let jwt = PresentedToken::Jwt("a.b.c".to_string());
        let token = ReceivedToken::new(jwt);
        assert!(check_audience(&token, None).is_ok());
        assert!(check_audience(&token, Some("http://x")).is_ok());
    }

    #[test]
    fn test_parse_request_rejects_other_operation() {
        let config = engine(|b| b);
        let request = RequestSecurityToken::validate(PresentedToken::Jwt("a.b.c".to_string()));
        let err = parse_request(&config, &request, RequestType::Issue).unwrap_err();
        assert_eq!(err.fault_code().as_str(), "InvalidRequest");
        assert!(parse_request(&config, &request, RequestType::Validate).is_ok());
    }

    #[test]
    fn test_subject_from_context() {
        let config = engine(|b| b);
        let context = InvocationContext::new()
            .with_principal(Principal::new("alice"))
            .with_role("admin");
        let subject = Subject::from_context(&config, &context);
        assert_eq!(subject.principal_name().as_deref(), Some("alice"));
        assert_eq!(subject.roles, vec!["admin"]);
        assert!(subject.source_realm.is_none());
    }
}
