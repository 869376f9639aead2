use time::OffsetDateTime;

use super::{TokenValidator, TokenValidatorParameters, TokenValidatorResponse};
use crate::error::StsResult;
use crate::token::{PresentedToken, TokenState};

/// Validates a Security Context Token by looking its context up in the
/// token store.
#[derive(Debug, Clone, Copy, Default)]
pub struct SctTokenValidator;

impl SctTokenValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TokenValidator for SctTokenValidator {
    fn name(&self) -> &str {
        "sct"
    }

    fn can_handle_token(&self, token: &PresentedToken, _realm: Option<&str>) -> bool {
        matches!(token, PresentedToken::SecurityContext(_))
    }

    fn validate_token(&self, parameters: &TokenValidatorParameters<'_>) -> StsResult<TokenValidatorResponse> {
        let PresentedToken::SecurityContext(sct) = parameters.presented() else {
            return Ok(TokenValidatorResponse::invalid("not a security context token"));
        };
        let Some(cached) = parameters.store.get(&sct.identifier) else {
            return Ok(TokenValidatorResponse::invalid(format!(
                "security context {} is unknown",
                sct.identifier
            )));
        };

        let state = if cached.is_expired_at(OffsetDateTime::now_utc()) {
            TokenState::Expired
        } else {
            TokenState::Valid
        };
        Ok(TokenValidatorResponse {
            state,
            principal: cached.principal,
            roles: cached.properties.roles,
            realm: cached.realm,
            claims: cached.properties.claims,
            token_id: Some(cached.id),
            expires: cached.expires,
            reason: None,
        })
    }
}
