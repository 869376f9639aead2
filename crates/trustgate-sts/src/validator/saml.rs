use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use super::{TokenValidator, TokenValidatorParameters, TokenValidatorResponse};
use crate::constants::claims::ROLE;
use crate::context::Principal;
use crate::error::StsResult;
use crate::federation::SamlRealmCodec;
use crate::token::{PresentedToken, SamlAssertion, TokenState};

/// Clock skew tolerated on `NotBefore`.
const FUTURE_TTL: Duration = Duration::seconds(60);

/// Validates signed SAML assertions against the STS crypto.
pub struct SamlTokenValidator {
    realm_codec: Option<Arc<dyn SamlRealmCodec>>,
    require_signed: bool,
}

impl SamlTokenValidator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            realm_codec: None,
            require_signed: true,
        }
    }

    #[must_use]
    pub fn with_realm_codec(mut self, codec: Arc<dyn SamlRealmCodec>) -> Self {
        self.realm_codec = Some(codec);
        self
    }

    /// Accepts unsigned assertions. Only for deployments where the transport
    /// already vouches for the token.
    #[must_use]
    pub fn allow_unsigned(mut self) -> Self {
        self.require_signed = false;
        self
    }

    fn check_signature(
        &self,
        assertion: &SamlAssertion,
        parameters: &TokenValidatorParameters<'_>,
    ) -> Option<String> {
        let Some(signature) = &assertion.signature else {
            return self
                .require_signed
                .then(|| "assertion is not signed".to_string());
        };
        let crypto = parameters.properties.crypto.as_ref();
        match assertion.verify_signature(crypto) {
            Ok(true) => {}
            Ok(false) => return Some("signature does not verify".to_string()),
            Err(e) => return Some(e.to_string()),
        }
        let trusted = crypto
            .certificate(&signature.key_alias)
            .is_some_and(|cert| crypto.is_trusted(&cert));
        (!trusted).then(|| format!("signer {} is not trusted", signature.key_alias))
    }
}

impl Default for SamlTokenValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenValidator for SamlTokenValidator {
    fn name(&self) -> &str {
        "saml"
    }

    fn can_handle_token(&self, token: &PresentedToken, _realm: Option<&str>) -> bool {
        matches!(token, PresentedToken::Saml(_))
    }

    fn validate_token(&self, parameters: &TokenValidatorParameters<'_>) -> StsResult<TokenValidatorResponse> {
        let PresentedToken::Saml(assertion) = parameters.presented() else {
            return Ok(TokenValidatorResponse::invalid("not a SAML assertion"));
        };

        if let Some(reason) = self.check_signature(assertion, parameters) {
            return Ok(TokenValidatorResponse::invalid(reason));
        }

        let now = OffsetDateTime::now_utc();
        if assertion.is_not_yet_valid_at(now, FUTURE_TTL) {
            return Ok(TokenValidatorResponse::invalid("assertion is not yet valid"));
        }
        let state = if assertion.is_expired_at(now) {
            tracing::debug!(id = %assertion.id, "SAML assertion expired");
            TokenState::Expired
        } else {
            TokenState::Valid
        };

        Ok(TokenValidatorResponse {
            state,
            principal: Some(Principal::new(&assertion.subject.name_id)),
            roles: assertion.attribute_values(ROLE),
            realm: self.realm_codec.as_ref().and_then(|c| c.realm_for(assertion)),
            claims: assertion.claims(),
            token_id: Some(assertion.id.clone()),
            expires: Some(assertion.conditions.not_on_or_after),
            reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SymmetricKeyStore;
    use crate::federation::IssuerRealmCodec;
    use crate::token::SamlVersion;
    use crate::validator::test_support::Fixture;

    fn assertion(fixture: &Fixture) -> SamlAssertion {
        let mut assertion = SamlAssertion::builder(SamlVersion::V2_0, "issuer-a", "alice")
            .attribute(ROLE, vec!["admin".to_string()])
            .build();
        assertion
            .sign(fixture.properties.crypto.as_ref(), "sts")
            .unwrap();
        assertion
    }

    #[test]
    fn test_valid_assertion() {
        let fixture = Fixture::new();
        let validator = SamlTokenValidator::new().with_realm_codec(Arc::new(IssuerRealmCodec::new([(
            "issuer-a".to_string(),
            "A".to_string(),
        )])));
        let response = fixture.validate(&validator, PresentedToken::Saml(assertion(&fixture)));
        assert_eq!(response.state, TokenState::Valid);
        assert_eq!(response.principal.unwrap().name(), "alice");
        assert_eq!(response.roles, vec!["admin"]);
        assert_eq!(response.realm.as_deref(), Some("A"));
        assert_eq!(response.claims.value(ROLE), Some("admin"));
    }

    #[test]
    fn test_tampered_assertion_invalid() {
        let fixture = Fixture::new();
        let mut tampered = assertion(&fixture);
        tampered.subject.name_id = "mallory".to_string();
        let response = fixture.validate(&SamlTokenValidator::new(), PresentedToken::Saml(tampered));
        assert_eq!(response.state, TokenState::Invalid);
    }

    #[test]
    fn test_unsigned_assertion() {
        let fixture = Fixture::new();
        let unsigned = SamlAssertion::builder(SamlVersion::V1_1, "issuer", "alice").build();
        let response =
            fixture.validate(&SamlTokenValidator::new(), PresentedToken::Saml(unsigned.clone()));
        assert_eq!(response.state, TokenState::Invalid);
        let response = fixture.validate(
            &SamlTokenValidator::new().allow_unsigned(),
            PresentedToken::Saml(unsigned),
        );
        assert_eq!(response.state, TokenState::Valid);
    }

    #[test]
    fn test_foreign_signer_invalid() {
        let fixture = Fixture::new();
        let foreign = SymmetricKeyStore::new().with_entry("other", vec![8u8; 32], "CN=other");
        let mut assertion = SamlAssertion::builder(SamlVersion::V2_0, "issuer", "alice").build();
        assertion.sign(&foreign, "other").unwrap();
        let response = fixture.validate(&SamlTokenValidator::new(), PresentedToken::Saml(assertion));
        assert_eq!(response.state, TokenState::Invalid);
    }

    #[test]
    fn test_expired_assertion() {
        let fixture = Fixture::new();
        let now = OffsetDateTime::now_utc();
        let mut assertion = SamlAssertion::builder(SamlVersion::V2_0, "issuer", "alice")
            .lifetime(now - Duration::hours(2), now - Duration::hours(1))
            .build();
        assertion
            .sign(fixture.properties.crypto.as_ref(), "sts")
            .unwrap();
        let response = fixture.validate(&SamlTokenValidator::new(), PresentedToken::Saml(assertion));
        assert_eq!(response.state, TokenState::Expired);
        assert_eq!(response.principal.unwrap().name(), "alice");
    }
}
