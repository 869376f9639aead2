use super::{SymmetricKey, TokenProvider, TokenProviderParameters, TokenProviderResponse};
use crate::constants::token_types;
use crate::error::StsResult;
use crate::token::{SecurityContextToken, TokenElement};

/// Issues Security Context Tokens. The context, including its secret, lives
/// in the token store, so SCTs are cached whatever `cache_issued_tokens`
/// says.
#[derive(Debug, Clone, Copy, Default)]
pub struct SctTokenProvider;

impl SctTokenProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TokenProvider for SctTokenProvider {
    fn name(&self) -> &str {
        "sct"
    }

    fn can_handle_token(&self, token_type: &str, _realm: Option<&str>) -> bool {
        token_types::is_sct(token_type)
    }

    fn create_token(&self, parameters: &TokenProviderParameters<'_>) -> StsResult<TokenProviderResponse> {
        let lifetime = parameters.resolve_lifetime()?;
        let key = SymmetricKey::resolve(parameters.key_requirements)?;
        let sct = SecurityContextToken::new();
        let id = sct.identifier.clone();
        let wsu_id = sct.wsu_id.clone();

        let token = TokenElement::SecurityContext(sct);
        parameters.cache(&id, token.clone(), &lifetime, Some(key.secret.clone()))?;
        tracing::debug!(id = %id, "Security context created");

        let mut response = TokenProviderResponse::new(token, id);
        response.attached_id = Some(wsu_id);
        response.lifetime = Some(lifetime);
        response.key_size = Some(key.key_size);
        response.proof = Some(key.proof);
        Ok(response)
    }
}
