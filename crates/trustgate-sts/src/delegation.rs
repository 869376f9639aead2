//! OnBehalfOf / ActAs authorization.
//!
//! The first registered handler that can handle the delegated token decides.
//! A token no handler accepts cannot be used for delegation.

use std::collections::HashSet;
use std::sync::Arc;

use trustgate_config::{DelegationHandlerKind, DelegationSettings};

use crate::context::InvocationContext;
use crate::registry::PluginRegistry;
use crate::request::KeyType;
use crate::store::TokenStore;
use crate::token::saml::KeyInfo;
use crate::token::{PresentedToken, ReceivedToken, TokenState};

pub struct DelegationParameters<'a> {
    pub store: &'a dyn TokenStore,
    pub context: &'a InvocationContext,
    /// The validated OnBehalfOf or ActAs token.
    pub token: &'a ReceivedToken,
    pub key_type: KeyType,
    pub applies_to: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationResponse {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl DelegationResponse {
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

pub trait DelegationHandler: Send + Sync {
    fn name(&self) -> &str;

    fn can_handle_token(&self, token: &ReceivedToken) -> bool;

    fn is_delegation_allowed(&self, parameters: &DelegationParameters<'_>) -> DelegationResponse;
}

fn require_valid(token: &ReceivedToken) -> Option<DelegationResponse> {
    (token.state() != TokenState::Valid)
        .then(|| DelegationResponse::denied("delegated token is not valid"))
}

/// Allows bearer SAML assertions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamlDelegationHandler;

impl DelegationHandler for SamlDelegationHandler {
    fn name(&self) -> &str {
        "saml"
    }

    fn can_handle_token(&self, token: &ReceivedToken) -> bool {
        matches!(token.token(), PresentedToken::Saml(a) if !a.is_holder_of_key())
    }

    fn is_delegation_allowed(&self, parameters: &DelegationParameters<'_>) -> DelegationResponse {
        require_valid(parameters.token).unwrap_or_else(DelegationResponse::allowed)
    }
}

/// Allows holder-of-key SAML assertions when the caller proves possession of
/// the confirmation key, or is a trusted delegator.
#[derive(Debug, Clone, Default)]
pub struct HokDelegationHandler {
    trusted_delegators: HashSet<String>,
}

impl HokDelegationHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_trusted_delegators<I, S>(mut self, delegators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_delegators
            .extend(delegators.into_iter().map(Into::into));
        self
    }
}

impl DelegationHandler for HokDelegationHandler {
    fn name(&self) -> &str {
        "hok"
    }

    fn can_handle_token(&self, token: &ReceivedToken) -> bool {
        matches!(token.token(), PresentedToken::Saml(a) if a.is_holder_of_key())
    }

    fn is_delegation_allowed(&self, parameters: &DelegationParameters<'_>) -> DelegationResponse {
        if let Some(denied) = require_valid(parameters.token) {
            return denied;
        }
        let PresentedToken::Saml(assertion) = parameters.token.token() else {
            return DelegationResponse::denied("not a SAML assertion");
        };

        let context = parameters.context;
        if context
            .principal()
            .is_some_and(|p| self.trusted_delegators.contains(p.name()))
        {
            return DelegationResponse::allowed();
        }
        let proven = match &assertion.subject.confirmation.key_info {
            Some(KeyInfo::Certificate(certificate)) => context.proves_certificate(certificate),
            Some(KeyInfo::Symmetric { .. }) => parameters
                .store
                .get(&assertion.id)
                .and_then(|cached| cached.secret)
                .is_some_and(|secret| context.proves_secret(&secret)),
            None => false,
        };
        if proven {
            DelegationResponse::allowed()
        } else {
            DelegationResponse::denied("caller did not prove possession of the delegated key")
        }
    }
}

/// Allows validated UsernameTokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsernameTokenDelegationHandler;

impl DelegationHandler for UsernameTokenDelegationHandler {
    fn name(&self) -> &str {
        "username"
    }

    fn can_handle_token(&self, token: &ReceivedToken) -> bool {
        matches!(token.token(), PresentedToken::UsernameToken(_))
    }

    fn is_delegation_allowed(&self, parameters: &DelegationParameters<'_>) -> DelegationResponse {
        require_valid(parameters.token).unwrap_or_else(DelegationResponse::allowed)
    }
}

/// Allows validated JWTs.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtDelegationHandler;

impl DelegationHandler for JwtDelegationHandler {
    fn name(&self) -> &str {
        "jwt"
    }

    fn can_handle_token(&self, token: &ReceivedToken) -> bool {
        matches!(token.token(), PresentedToken::Jwt(_))
    }

    fn is_delegation_allowed(&self, parameters: &DelegationParameters<'_>) -> DelegationResponse {
        require_valid(parameters.token).unwrap_or_else(DelegationResponse::allowed)
    }
}

/// Builds the handler registry in configured order. No configured handlers
/// means bearer SAML only.
#[must_use]
pub fn delegation_handlers_from_settings(
    settings: &DelegationSettings,
) -> PluginRegistry<dyn DelegationHandler> {
    let mut registry: PluginRegistry<dyn DelegationHandler> = PluginRegistry::new();
    if settings.handlers.is_empty() {
        registry.register(Arc::new(SamlDelegationHandler));
        return registry;
    }
    for kind in &settings.handlers {
        let handler: Arc<dyn DelegationHandler> = match kind {
            DelegationHandlerKind::Saml => Arc::new(SamlDelegationHandler),
            DelegationHandlerKind::Hok => Arc::new(
                HokDelegationHandler::new()
                    .with_trusted_delegators(settings.trusted_delegators.iter().cloned()),
            ),
            DelegationHandlerKind::Username => Arc::new(UsernameTokenDelegationHandler),
            DelegationHandlerKind::Jwt => Arc::new(JwtDelegationHandler),
        };
        registry.register(handler);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Principal, ProofCredential};
    use crate::crypto::X509Certificate;
    use crate::store::InMemoryTokenStore;
    use crate::token::saml::SubjectConfirmation;
    use crate::token::{SamlAssertion, SamlVersion, UsernameToken};

    fn valid(token: PresentedToken) -> ReceivedToken {
        let mut token = ReceivedToken::new(token);
        token.state = TokenState::Valid;
        token
    }

    fn check(
        handler: &dyn DelegationHandler,
        token: &ReceivedToken,
        context: &InvocationContext,
    ) -> DelegationResponse {
        let store = InMemoryTokenStore::new();
        handler.is_delegation_allowed(&DelegationParameters {
            store: &store,
            context,
            token,
            key_type: KeyType::Bearer,
            applies_to: None,
        })
    }

    fn hok_assertion(certificate: &X509Certificate) -> ReceivedToken {
        valid(PresentedToken::Saml(
            SamlAssertion::builder(SamlVersion::V2_0, "issuer", "alice")
                .confirmation(SubjectConfirmation::holder_of_key(KeyInfo::Certificate(
                    certificate.clone(),
                )))
                .build(),
        ))
    }

    #[test]
    fn test_default_registry_is_bearer_saml_only() {
        let registry = delegation_handlers_from_settings(&DelegationSettings::default());
        assert_eq!(registry.len(), 1);

        let bearer = valid(PresentedToken::Saml(
            SamlAssertion::builder(SamlVersion::V2_0, "issuer", "alice").build(),
        ));
        assert!(registry.find(|h| h.can_handle_token(&bearer)).is_some());

        let username = valid(PresentedToken::UsernameToken(UsernameToken::with_text_password(
            "alice", "secret",
        )));
        assert!(registry.find(|h| h.can_handle_token(&username)).is_none());

        let hok = hok_assertion(&X509Certificate::self_issued("CN=alice", vec![1; 16]));
        assert!(registry.find(|h| h.can_handle_token(&hok)).is_none());
    }

    #[test]
    fn test_invalid_token_denied() {
        let token = ReceivedToken::new(PresentedToken::Jwt("a.b.c".to_string()));
        let response = check(&JwtDelegationHandler, &token, &InvocationContext::new());
        assert!(!response.allowed);
    }

    #[test]
    fn test_hok_requires_proof_or_trust() {
        let certificate = X509Certificate::self_issued("CN=alice", vec![1; 16]);
        let token = hok_assertion(&certificate);
        let handler = HokDelegationHandler::new().with_trusted_delegators(["gateway"]);

        assert!(!check(&handler, &token, &InvocationContext::new()).allowed);

        let prover = InvocationContext::new()
            .with_proof_credential(ProofCredential::Certificate(certificate));
        assert!(check(&handler, &token, &prover).allowed);

        let trusted = InvocationContext::new().with_principal(Principal::new("gateway"));
        assert!(check(&handler, &token, &trusted).allowed);
    }

    #[test]
    fn test_configured_order() {
        let settings = DelegationSettings {
            handlers: vec![DelegationHandlerKind::Username, DelegationHandlerKind::Jwt],
            trusted_delegators: Vec::new(),
        };
        let registry = delegation_handlers_from_settings(&settings);
        let names: Vec<_> = registry.iter().map(|h| h.name().to_string()).collect();
        assert_eq!(names, vec!["username", "jwt"]);
    }
}
