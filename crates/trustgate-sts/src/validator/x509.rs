use time::OffsetDateTime;

use super::{TokenValidator, TokenValidatorParameters, TokenValidatorResponse};
use crate::context::Principal;
use crate::error::StsResult;
use crate::token::{PresentedToken, TokenState};

/// Validates X.509 certificates against the trust anchors of the STS crypto.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509TokenValidator;

impl X509TokenValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TokenValidator for X509TokenValidator {
    fn name(&self) -> &str {
        "x509"
    }

    fn can_handle_token(&self, token: &PresentedToken, _realm: Option<&str>) -> bool {
        matches!(token, PresentedToken::X509(_))
    }

    fn validate_token(&self, parameters: &TokenValidatorParameters<'_>) -> StsResult<TokenValidatorResponse> {
        let PresentedToken::X509(certificate) = parameters.presented() else {
            return Ok(TokenValidatorResponse::invalid("not an X.509 certificate"));
        };
        if !parameters.properties.crypto.is_trusted(certificate) {
            return Ok(TokenValidatorResponse::invalid(format!(
                "certificate {} is not trusted",
                certificate.subject_dn
            )));
        }

        let now = OffsetDateTime::now_utc();
        let state = if now > certificate.not_after {
            TokenState::Expired
        } else if certificate.is_valid_at(now) {
            TokenState::Valid
        } else {
            return Ok(TokenValidatorResponse::invalid("certificate is not yet valid"));
        };
        Ok(TokenValidatorResponse {
            state,
            principal: Some(Principal::new(&certificate.subject_dn)),
            expires: Some(certificate.not_after),
            ..TokenValidatorResponse::default()
        })
    }
}
