use std::collections::HashMap;
use std::sync::Arc;

use super::{TokenValidator, TokenValidatorParameters, TokenValidatorResponse};
use crate::constants::claims::ROLE;
use crate::context::Principal;
use crate::error::StsResult;
use crate::token::jwt::{JwtClaims, JwtError, JwtService};
use crate::token::{PresentedToken, TokenState};

/// Validates JWTs signed by the STS key.
#[derive(Debug, Clone)]
pub struct JwtTokenValidator {
    service: Arc<JwtService>,
    /// Issuer to realm.
    issuer_realms: HashMap<String, String>,
}

impl JwtTokenValidator {
    #[must_use]
    pub fn new(service: Arc<JwtService>) -> Self {
        Self {
            service,
            issuer_realms: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_issuer_realm(mut self, issuer: impl Into<String>, realm: impl Into<String>) -> Self {
        self.issuer_realms.insert(issuer.into(), realm.into());
        self
    }

    fn response(&self, state: TokenState, claims: JwtClaims) -> TokenValidatorResponse {
        let processed = claims.claims();
        let roles = processed
            .get(ROLE)
            .map(|c| c.values.clone())
            .unwrap_or_default();
        TokenValidatorResponse {
            state,
            principal: Some(Principal::new(&claims.sub)),
            roles,
            realm: self.issuer_realms.get(&claims.iss).cloned(),
            expires: claims.expires_at(),
            token_id: Some(claims.jti.clone()),
            claims: processed,
            reason: None,
        }
    }
}

impl TokenValidator for JwtTokenValidator {
    fn name(&self) -> &str {
        "jwt"
    }

    fn can_handle_token(&self, token: &PresentedToken, _realm: Option<&str>) -> bool {
        matches!(token, PresentedToken::Jwt(_))
    }

    fn validate_token(&self, parameters: &TokenValidatorParameters<'_>) -> StsResult<TokenValidatorResponse> {
        let PresentedToken::Jwt(jwt) = parameters.presented() else {
            return Ok(TokenValidatorResponse::invalid("not a JWT"));
        };

        match self.service.decode::<JwtClaims>(jwt) {
            Ok(data) => Ok(self.response(TokenState::Valid, data.claims)),
            Err(JwtError::Expired) => match self.service.decode_allow_expired::<JwtClaims>(jwt) {
                Ok(data) => {
                    tracing::debug!(jti = %data.claims.jti, "JWT expired");
                    Ok(self.response(TokenState::Expired, data.claims))
                }
                Err(e) => Ok(TokenValidatorResponse::invalid(e.to_string())),
            },
            Err(e) if e.is_validation_error() => Ok(TokenValidatorResponse::invalid(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
