use time::OffsetDateTime;

use super::{RenewalPolicy, TokenRenewer, TokenRenewerParameters, TokenRenewerResponse};
use crate::context::InvocationContext;
use crate::error::{StsError, StsResult};
use crate::store::CachedToken;
use crate::token::saml::KeyInfo;
use crate::token::{PresentedToken, ReceivedToken, SamlAssertion, TokenElement};

/// Renews SAML assertions the STS issued and cached.
///
/// The renewed assertion keeps subject, attributes, audience and
/// confirmation, gets a fresh id and validity window, and replaces the old
/// cache entry.
#[derive(Debug, Clone, Default)]
pub struct SamlTokenRenewer {
    policy: RenewalPolicy,
}

impl SamlTokenRenewer {
    #[must_use]
    pub fn new(policy: RenewalPolicy) -> Self {
        Self { policy }
    }

    fn check_proof_of_possession(
        assertion: &SamlAssertion,
        cached: &CachedToken,
        context: &InvocationContext,
    ) -> StsResult<()> {
        let proven = match &assertion.subject.confirmation.key_info {
            Some(KeyInfo::Certificate(certificate)) => context.proves_certificate(certificate),
            Some(KeyInfo::Symmetric { .. }) => cached
                .secret
                .as_deref()
                .is_some_and(|secret| context.proves_secret(secret)),
            None => false,
        };
        if proven {
            Ok(())
        } else {
            Err(StsError::request_failed(format!(
                "caller did not prove possession of the key of {}",
                assertion.id
            )))
        }
    }
}

impl TokenRenewer for SamlTokenRenewer {
    fn name(&self) -> &str {
        "saml"
    }

    fn can_handle_token(&self, token: &ReceivedToken, _realm: Option<&str>) -> bool {
        matches!(token.token(), PresentedToken::Saml(_))
    }

    fn allow_renewal_after_expiry(&self) -> bool {
        self.policy.allow_renewal_after_expiry
    }

    fn renew_token(&self, parameters: &TokenRenewerParameters<'_>) -> StsResult<TokenRenewerResponse> {
        let PresentedToken::Saml(assertion) = parameters.token.token() else {
            return Err(StsError::invalid_request("renew target is not a SAML assertion"));
        };
        let cached = self
            .policy
            .eligible(parameters.store, &assertion.id, parameters.token.state())?;

        if self.policy.verify_proof_of_possession && assertion.is_holder_of_key() {
            Self::check_proof_of_possession(assertion, &cached, parameters.context)?;
        }
        if let Some(applies_to) = &parameters.token_requirements.applies_to {
            let audiences = &assertion.conditions.audiences;
            if !audiences.is_empty() && !audiences.contains(applies_to) {
                return Err(StsError::invalid_request(format!(
                    "AppliesTo {applies_to} does not match the assertion audience"
                )));
            }
        }

        let lifetime = parameters.resolve_lifetime()?;
        let new_id = format!("_{}", uuid::Uuid::new_v4().simple());
        let mut renewed = assertion.clone();
        renewed.id = new_id.clone();
        renewed.issue_instant = OffsetDateTime::now_utc();
        renewed.conditions.not_before = lifetime.created;
        renewed.conditions.not_on_or_after = lifetime.expires;
        renewed.signature = None;
        if assertion.is_signed() || parameters.properties.sign_tokens {
            let (crypto, alias) = parameters
                .properties
                .signing_key_for(cached.realm.as_deref())?;
            renewed.sign(crypto.as_ref(), &alias)?;
        }

        let token = TokenElement::Saml(renewed);
        let old_id = assertion.id.as_str();
        let mut entry = cached;
        entry.id = new_id.clone();
        entry.payload = token.clone();
        entry.created = lifetime.created;
        entry.expires = Some(lifetime.expires);
        parameters.store.remove(old_id);
        parameters.store.put(entry)?;

        tracing::debug!(old_id = %old_id, new_id = %new_id, "SAML assertion renewed");
        Ok(TokenRenewerResponse {
            token,
            token_id: new_id,
            attached_id: None,
            lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::Duration;

    use super::*;
    use crate::constants::token_types;
    use crate::context::{Principal, ProofCredential};
    use crate::crypto::SymmetricKeyStore;
    use crate::properties::StsProperties;
    use crate::request::{KeyRequirements, TokenRequirements};
    use crate::store::{InMemoryTokenStore, TokenStore};
    use crate::token::saml::SubjectConfirmation;
    use crate::token::{SamlVersion, TokenState};

    struct Fixture {
        properties: StsProperties,
        store: InMemoryTokenStore,
        token: TokenRequirements,
        key: KeyRequirements,
    }

    impl Fixture {
        fn new() -> Self {
            let crypto = SymmetricKeyStore::new().with_entry("sts", vec![3u8; 32], "CN=sts");
            Self {
                properties: StsProperties::new("https://sts.example.com", Arc::new(crypto)),
                store: InMemoryTokenStore::new(),
                token: TokenRequirements::default(),
                key: KeyRequirements::default(),
            }
        }

        fn issue(&self, expires: OffsetDateTime, secret: Option<Vec<u8>>) -> ReceivedToken {
            let mut builder = SamlAssertion::builder(SamlVersion::V2_0, "https://sts.example.com", "alice")
                .lifetime(expires - Duration::minutes(10), expires)
                .audience("http://x/service");
            if let Some(secret) = &secret {
                builder = builder.confirmation(SubjectConfirmation::holder_of_key(KeyInfo::symmetric(
                    secret, None,
                )));
            }
            let mut assertion = builder.build();
            assertion.sign(self.properties.crypto.as_ref(), "sts").unwrap();

            let mut entry = CachedToken::new(
                &assertion.id,
                token_types::SAML_2_0,
                TokenElement::Saml(assertion.clone()),
            );
            entry.principal = Some(Principal::new("alice"));
            entry.expires = Some(expires);
            entry.secret = secret;
            entry.properties.allow_renewing_after_expiry = true;
            self.store.put(entry).unwrap();

            let mut token = ReceivedToken::new(PresentedToken::Saml(assertion));
            token.state = if expires <= OffsetDateTime::now_utc() {
                TokenState::Expired
            } else {
                TokenState::Valid
            };
            token
        }

        fn renew(
            &self,
            renewer: &SamlTokenRenewer,
            token: &ReceivedToken,
            context: &InvocationContext,
        ) -> StsResult<TokenRenewerResponse> {
            renewer.renew_token(&TokenRenewerParameters {
                properties: &self.properties,
                store: &self.store,
                context,
                token_requirements: &self.token,
                key_requirements: &self.key,
                token,
                realm: None,
            })
        }
    }

    #[test]
    fn test_renew_replaces_cache_entry() {
        let fixture = Fixture::new();
        let token = fixture.issue(OffsetDateTime::now_utc() + Duration::minutes(1), None);
        let response = fixture
            .renew(&SamlTokenRenewer::default(), &token, &InvocationContext::new())
            .unwrap();

        let PresentedToken::Saml(old) = token.token() else {
            unreachable!();
        };
        let renewed = response.token.as_saml().unwrap();
        assert_ne!(renewed.id, old.id);
        assert_eq!(renewed.subject.name_id, "alice");
        assert_eq!(renewed.conditions.audiences, old.conditions.audiences);
        assert!(renewed.conditions.not_on_or_after > old.conditions.not_on_or_after);
        assert!(renewed.verify_signature(fixture.properties.crypto.as_ref()).unwrap());
        assert!(fixture.store.get(&old.id).is_none());
        assert!(fixture.store.get(&response.token_id).is_some());
    }

    #[test]
    fn test_expired_assertion_needs_permission() {
        let fixture = Fixture::new();
        let token = fixture.issue(OffsetDateTime::now_utc() - Duration::minutes(1), None);
        let context = InvocationContext::new();
        let err = fixture
            .renew(&SamlTokenRenewer::default(), &token, &context)
            .unwrap_err();
        assert!(matches!(err, StsError::RenewalNotAllowed { .. }));

        let lenient = SamlTokenRenewer::new(RenewalPolicy {
            allow_renewal_after_expiry: true,
            ..RenewalPolicy::default()
        });
        let response = fixture.renew(&lenient, &token, &context).unwrap();
        assert!(response.lifetime.expires > OffsetDateTime::now_utc());
    }

    #[test]
    fn test_holder_of_key_requires_proof() {
        let fixture = Fixture::new();
        let secret = vec![9u8; 32];
        let token = fixture.issue(OffsetDateTime::now_utc() + Duration::minutes(1), Some(secret.clone()));
        let renewer = SamlTokenRenewer::default();
        assert!(fixture.renew(&renewer, &token, &InvocationContext::new()).is_err());

        let context =
            InvocationContext::new().with_proof_credential(ProofCredential::SymmetricKey(secret));
        assert!(fixture.renew(&renewer, &token, &context).is_ok());
    }

    #[test]
    fn test_applies_to_must_match_audience() {
        let mut fixture = Fixture::new();
        fixture.token.applies_to = Some("http://x/other".to_string());
        let token = fixture.issue(OffsetDateTime::now_utc() + Duration::minutes(1), None);
        let err = fixture
            .renew(&SamlTokenRenewer::default(), &token, &InvocationContext::new())
            .unwrap_err();
        assert!(matches!(err, StsError::InvalidRequest { .. }));
    }
}
