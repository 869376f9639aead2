use super::{RenewalPolicy, TokenRenewer, TokenRenewerParameters, TokenRenewerResponse};
use crate::error::{StsError, StsResult};
use crate::token::{PresentedToken, ReceivedToken, TokenElement};

/// Renews a security context in place: same identifier, new expiry.
#[derive(Debug, Clone, Default)]
pub struct SctTokenRenewer {
    policy: RenewalPolicy,
}

impl SctTokenRenewer {
    #[must_use]
    pub fn new(policy: RenewalPolicy) -> Self {
        Self { policy }
    }
}

impl TokenRenewer for SctTokenRenewer {
    fn name(&self) -> &str {
        "sct"
    }

    fn can_handle_token(&self, token: &ReceivedToken, _realm: Option<&str>) -> bool {
        matches!(token.token(), PresentedToken::SecurityContext(_))
    }

    fn allow_renewal_after_expiry(&self) -> bool {
        self.policy.allow_renewal_after_expiry
    }

    fn renew_token(&self, parameters: &TokenRenewerParameters<'_>) -> StsResult<TokenRenewerResponse> {
        let PresentedToken::SecurityContext(sct) = parameters.token.token() else {
            return Err(StsError::invalid_request("renew target is not a security context token"));
        };
        let mut cached = self
            .policy
            .eligible(parameters.store, &sct.identifier, parameters.token.state())?;

        if self.policy.verify_proof_of_possession {
            if let Some(secret) = cached.secret.as_deref() {
                if !parameters.context.proves_secret(secret) {
                    return Err(StsError::request_failed(format!(
                        "caller did not prove possession of the secret of {}",
                        sct.identifier
                    )));
                }
            }
        }

        let lifetime = parameters.resolve_lifetime()?;
        cached.expires = Some(lifetime.expires);
        parameters.store.update(cached)?;
        tracing::debug!(id = %sct.identifier, expires = %lifetime.expires, "Security context renewed");

        Ok(TokenRenewerResponse {
            token: TokenElement::SecurityContext(sct.clone()),
            token_id: sct.identifier.clone(),
            attached_id: Some(sct.wsu_id.clone()),
            lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::constants::token_types;
    use crate::context::{InvocationContext, ProofCredential};
    use crate::crypto::SymmetricKeyStore;
    use crate::properties::StsProperties;
    use crate::request::{KeyRequirements, TokenRequirements};
    use crate::store::{CachedToken, InMemoryTokenStore, TokenStore};
    use crate::token::{SecurityContextToken, TokenState};

    const SECRET: [u8; 32] = [6u8; 32];

    fn setup(store: &InMemoryTokenStore, expires: OffsetDateTime) -> ReceivedToken {
        let sct = SecurityContextToken::new();
        let mut entry = CachedToken::new(
            &sct.identifier,
            token_types::SCT,
            TokenElement::SecurityContext(sct.clone()),
        );
        entry.expires = Some(expires);
        entry.secret = Some(SECRET.to_vec());
        store.put(entry).unwrap();
        let mut token = ReceivedToken::new(PresentedToken::SecurityContext(sct));
        token.state = TokenState::Valid;
        token
    }

    #[test]
    fn test_renew_keeps_identifier() {
        let crypto = SymmetricKeyStore::new().with_entry("sts", vec![3u8; 32], "CN=sts");
        let properties = StsProperties::new("https://sts.example.com", Arc::new(crypto));
        let store = InMemoryTokenStore::new();
        let expires = OffsetDateTime::now_utc() + Duration::seconds(30);
        let token = setup(&store, expires);
        let context =
            InvocationContext::new().with_proof_credential(ProofCredential::SymmetricKey(SECRET.to_vec()));
        let requirements = TokenRequirements::default();
        let key = KeyRequirements::default();
        let parameters = TokenRenewerParameters {
            properties: &properties,
            store: &store,
            context: &context,
            token_requirements: &requirements,
            key_requirements: &key,
            token: &token,
            realm: None,
        };

        let response = SctTokenRenewer::default().renew_token(&parameters).unwrap();
        let PresentedToken::SecurityContext(sct) = token.token() else {
            unreachable!();
        };
        assert_eq!(response.token_id, sct.identifier);
        let cached = store.get(&sct.identifier).unwrap();
        assert!(cached.expires.unwrap() > expires);

        let stranger = InvocationContext::new();
        let parameters = TokenRenewerParameters {
            context: &stranger,
            ..parameters
        };
        assert!(SctTokenRenewer::default().renew_token(&parameters).is_err());
    }
}
