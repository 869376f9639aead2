use super::{TokenCanceller, TokenCancellerParameters, TokenCancellerResponse};
use crate::error::{StsError, StsResult};
use crate::token::{PresentedToken, ReceivedToken};

/// Cancels security contexts.
#[derive(Debug, Clone, Copy)]
pub struct SctTokenCanceller {
    verify_proof_of_possession: bool,
}

impl SctTokenCanceller {
    #[must_use]
    pub fn new(verify_proof_of_possession: bool) -> Self {
        Self {
            verify_proof_of_possession,
        }
    }
}

impl Default for SctTokenCanceller {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TokenCanceller for SctTokenCanceller {
    fn name(&self) -> &str {
        "sct"
    }

    fn can_handle_token(&self, token: &ReceivedToken) -> bool {
        matches!(token.token(), PresentedToken::SecurityContext(_))
    }

    fn cancel_token(&self, parameters: &TokenCancellerParameters<'_>) -> StsResult<TokenCancellerResponse> {
        let PresentedToken::SecurityContext(sct) = parameters.token.token() else {
            return Err(StsError::invalid_request("cancel target is not a security context token"));
        };
        let id = sct.identifier.as_str();

        if self.verify_proof_of_possession {
            let cached = parameters
                .store
                .get(id)
                .ok_or_else(|| StsError::token_not_found(id))?;
            if let Some(secret) = cached.secret.as_deref() {
                if !parameters.context.proves_secret(secret) {
                    return Err(StsError::request_failed(format!(
                        "caller did not prove possession of the secret of {id}"
                    )));
                }
            }
        }

        parameters
            .store
            .remove(id)
            .ok_or_else(|| StsError::token_not_found(id))?;
        tracing::debug!(id, "Security context cancelled");
        Ok(TokenCancellerResponse {
            token_id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::constants::token_types;
    use crate::context::{InvocationContext, ProofCredential};
    use crate::crypto::SymmetricKeyStore;
    use crate::properties::StsProperties;
    use crate::store::{CachedToken, InMemoryTokenStore, TokenStore};
    use crate::token::{SecurityContextToken, TokenElement};

    struct Fixture {
        properties: StsProperties,
        store: InMemoryTokenStore,
    }

    impl Fixture {
        fn new() -> Self {
            let crypto = SymmetricKeyStore::new().with_entry("sts", vec![3u8; 32], "CN=sts");
            Self {
                properties: StsProperties::new("https://sts.example.com", Arc::new(crypto)),
                store: InMemoryTokenStore::new(),
            }
        }

        fn cache(&self, secret: Option<Vec<u8>>) -> ReceivedToken {
            let sct = SecurityContextToken::new();
            let mut entry = CachedToken::new(
                &sct.identifier,
                token_types::SCT,
                TokenElement::SecurityContext(sct.clone()),
            );
            entry.secret = secret;
            self.store.put(entry).unwrap();
            ReceivedToken::new(PresentedToken::SecurityContext(sct))
        }

        fn cancel(
            &self,
            canceller: &SctTokenCanceller,
            context: &InvocationContext,
            token: &ReceivedToken,
        ) -> StsResult<TokenCancellerResponse> {
            canceller.cancel_token(&TokenCancellerParameters {
                properties: &self.properties,
                store: &self.store,
                context,
                token,
            })
        }
    }

    #[test]
    fn test_cancel_twice_fails() {
        let fixture = Fixture::new();
        let token = fixture.cache(None);
        let context = InvocationContext::new();
        let response = fixture.cancel(&SctTokenCanceller::default(), &context, &token).unwrap();
        assert!(fixture.store.get(&response.token_id).is_none());

        let err = fixture
            .cancel(&SctTokenCanceller::default(), &context, &token)
            .unwrap_err();
        assert!(matches!(err, StsError::TokenNotFound { .. }));
        assert_eq!(err.fault_code().as_str(), "RequestFailed");
    }

    #[test]
    fn test_proof_of_possession() {
        let fixture = Fixture::new();
        let token = fixture.cache(Some(vec![1u8; 32]));
        let stranger = InvocationContext::new();
        assert!(fixture.cancel(&SctTokenCanceller::default(), &stranger, &token).is_err());
        assert!(
            fixture
                .cancel(&SctTokenCanceller::new(false), &stranger, &token)
                .is_ok()
        );

        let token = fixture.cache(Some(vec![2u8; 32]));
        let owner =
            InvocationContext::new().with_proof_credential(ProofCredential::SymmetricKey(vec![2u8; 32]));
        assert!(fixture.cancel(&SctTokenCanceller::default(), &owner, &token).is_ok());
    }
}
