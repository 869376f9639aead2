use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{
    ClaimsElement, Entropy, KeyRequirements, KeyType, LifetimeElement, RenewingPolicy,
    RequestRequirements, RequestSecurityToken, RequestType, TokenRequirements,
};
use crate::claims::{Claim, ClaimCollection, ClaimsManager};
use crate::constants::{claims as claim_dialects, token_types};
use crate::encoding;
use crate::error::{StsError, StsResult};
use crate::lifetime::RequestedLifetime;
use crate::token::ReceivedToken;

/// Turns a request document into typed requirements.
pub struct RequestParser<'a> {
    claims_manager: &'a ClaimsManager,
}

impl<'a> RequestParser<'a> {
    #[must_use]
    pub fn new(claims_manager: &'a ClaimsManager) -> Self {
        Self { claims_manager }
    }

    pub fn parse(&self, request: &RequestSecurityToken) -> StsResult<RequestRequirements> {
        let request_type = request
            .request_type
            .as_deref()
            .map(|uri| {
                RequestType::from_uri(uri)
                    .ok_or_else(|| StsError::invalid_request(format!("unknown RequestType {uri}")))
            })
            .transpose()?;

        let secondary = request.secondary_parameters.as_ref();
        let token_type = request
            .token_type
            .as_deref()
            .or_else(|| secondary.and_then(|s| s.token_type.as_deref()))
            .map(|t| token_types::resolve_alias(t).to_string());
        let key_type_uri = request
            .key_type
            .as_deref()
            .or_else(|| secondary.and_then(|s| s.key_type.as_deref()));
        let key_type = key_type_uri
            .map(|uri| {
                KeyType::from_uri(uri)
                    .ok_or_else(|| StsError::invalid_request(format!("unknown KeyType {uri}")))
            })
            .transpose()?;

        let primary_claims = request
            .claims
            .as_ref()
            .map(|c| self.parse_claims(c))
            .transpose()?;
        let secondary_claims = secondary
            .and_then(|s| s.claims.as_ref())
            .map(|c| self.parse_claims(c))
            .transpose()?;

        let entropy = match request.entropy.as_ref().and_then(|e| e.binary_secret.as_ref()) {
            Some(secret) => Some(Entropy {
                secret: encoding::decode(&secret.value)?,
                secret_type: secret.r#type.clone(),
            }),
            None => None,
        };

        let renewing = match &request.renewing {
            Some(r) => RenewingPolicy {
                allow: r.allow.unwrap_or(true),
                allow_after_expiry: r.ok.unwrap_or(false),
            },
            None => RenewingPolicy::default(),
        };

        let token = TokenRequirements {
            request_type,
            token_type,
            applies_to: request.applies_to_address().map(str::to_string),
            context: request.context.clone(),
            lifetime: request.lifetime.as_ref().map(parse_lifetime).transpose()?,
            primary_claims,
            secondary_claims,
            on_behalf_of: request.on_behalf_of.clone().map(ReceivedToken::new),
            act_as: request.act_as.clone().map(ReceivedToken::new),
            validate_target: request.validate_target.clone().map(ReceivedToken::new),
            renew_target: request.renew_target.clone().map(ReceivedToken::new),
            cancel_target: request.cancel_target.clone().map(ReceivedToken::new),
            renewing,
        };
        let key = KeyRequirements {
            key_type,
            key_size: request.key_size,
            entropy,
            computed_key_algorithm: request.computed_key_algorithm.clone(),
            use_key_certificate: request.use_key.as_ref().and_then(|u| u.certificate.clone()),
            encryption_algorithm: request.encryption_algorithm.clone(),
            key_wrap_algorithm: request.key_wrap_algorithm.clone(),
        };
        tracing::debug!(
            request_type = ?token.request_type,
            token_type = ?token.token_type,
            key_type = ?key.key_type,
            applies_to = ?token.applies_to,
            "Request parsed"
        );
        Ok(RequestRequirements { token, key })
    }

    fn parse_claims(&self, element: &ClaimsElement) -> StsResult<ClaimCollection> {
        let dialect = element.dialect.clone();
        let mut collection = ClaimCollection::new(dialect.clone());

        match dialect.as_deref() {
            None | Some(claim_dialects::IDENTITY_DIALECT) => {
                for claim_type in &element.claim_type {
                    collection.push(Claim {
                        claim_type: claim_type.uri.clone(),
                        optional: claim_type.optional,
                        values: Vec::new(),
                    });
                }
                for claim_value in &element.claim_value {
                    collection.push(Claim {
                        claim_type: claim_value.uri.clone(),
                        optional: false,
                        values: vec![claim_value.value.clone()],
                    });
                }
            }
            Some(other) => {
                let parser = self.claims_manager.parser_for(other).ok_or_else(|| {
                    tracing::warn!(dialect = other, "No claims parser for dialect");
                    StsError::bad_request(format!("unsupported claims dialect {other}"))
                })?;
                let content = element.content.clone().unwrap_or(serde_json::Value::Null);
                for claim in parser.parse(&content)? {
                    collection.push(claim);
                }
            }
        }
        Ok(collection)
    }
}

fn parse_instant(value: &str, field: &str) -> StsResult<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| StsError::invalid_request(format!("malformed Lifetime {field} {value}: {e}")))
}

fn parse_lifetime(element: &LifetimeElement) -> StsResult<RequestedLifetime> {
    Ok(RequestedLifetime {
        created: element
            .created
            .as_deref()
            .map(|v| parse_instant(v, "Created"))
            .transpose()?,
        expires: element
            .expires
            .as_deref()
            .map(|v| parse_instant(v, "Expires"))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::claims::ClaimsParser;
    use crate::constants::{key_types, request_types};
    use crate::request::{ClaimValueElement, RenewingElement, SecondaryParameters};

    struct CsvParser;

    impl ClaimsParser for CsvParser {
        fn supported_dialect(&self) -> &str {
            "urn:csv"
        }

        fn parse(&self, content: &serde_json::Value) -> StsResult<Vec<Claim>> {
            let text = content
                .as_str()
                .ok_or_else(|| StsError::bad_request("csv claims must be a string"))?;
            Ok(text.split(',').map(Claim::required).collect())
        }
    }

    fn parse(request: &RequestSecurityToken) -> StsResult<RequestRequirements> {
        let manager = ClaimsManager::new().with_parser(Arc::new(CsvParser));
        RequestParser::new(&manager).parse(request)
    }

    #[test]
    fn test_basic_issue_request() {
        let rst = RequestSecurityToken::issue()
            .with_token_type("saml2.0")
            .with_key_type(key_types::SYMMETRIC_KEY)
            .with_applies_to("http://x/svc")
            .with_claim(Claim::optional("urn:role"))
            .with_entropy(&[7u8; 32]);
        let parsed = parse(&rst).unwrap();
        assert_eq!(parsed.token.request_type, Some(RequestType::Issue));
        assert_eq!(parsed.token.token_type.as_deref(), Some(token_types::SAML_2_0));
        assert_eq!(parsed.key.key_type, Some(KeyType::SymmetricKey));
        assert_eq!(parsed.token.applies_to.as_deref(), Some("http://x/svc"));
        assert!(parsed.token.primary_claims.unwrap().claims[0].optional);
        let entropy = parsed.key.entropy.unwrap();
        assert_eq!(entropy.secret, vec![7u8; 32]);
        assert!(entropy.is_nonce());
        assert_eq!(parsed.token.renewing, RenewingPolicy::default());
    }

    #[test]
    fn test_unknown_key_type_rejected() {
        let rst = RequestSecurityToken::issue().with_key_type("urn:bogus");
        assert!(matches!(parse(&rst), Err(StsError::InvalidRequest { .. })));
    }

    #[test]
    fn test_unknown_request_type_rejected() {
        let rst = RequestSecurityToken {
            request_type: Some(format!("{}/Bogus", crate::constants::WST_NS)),
            ..Default::default()
        };
        assert!(matches!(parse(&rst), Err(StsError::InvalidRequest { .. })));
        assert_eq!(
            RequestType::from_uri(request_types::CANCEL),
            Some(RequestType::Cancel)
        );
    }

    #[test]
    fn test_malformed_lifetime_rejected() {
        let rst = RequestSecurityToken::issue().with_lifetime(Some("yesterday".into()), None);
        assert!(matches!(parse(&rst), Err(StsError::InvalidRequest { .. })));
    }

    #[test]
    fn test_lifetime_parsed() {
        let rst = RequestSecurityToken::issue().with_lifetime(
            Some("2026-01-01T00:00:00Z".into()),
            Some("2026-01-01T01:00:00Z".into()),
        );
        let lifetime = parse(&rst).unwrap().token.lifetime.unwrap();
        assert_eq!(
            lifetime.expires.unwrap() - lifetime.created.unwrap(),
            time::Duration::hours(1)
        );
    }

    #[test]
    fn test_custom_dialect_uses_parser() {
        let rst = RequestSecurityToken {
            claims: Some(ClaimsElement {
                dialect: Some("urn:csv".to_string()),
                content: Some(serde_json::json!("urn:a,urn:b")),
                ..Default::default()
            }),
            ..RequestSecurityToken::issue()
        };
        let claims = parse(&rst).unwrap().token.primary_claims.unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims.dialect.as_deref(), Some("urn:csv"));
    }

    #[test]
    fn test_unknown_dialect_is_bad_request() {
        let rst = RequestSecurityToken {
            claims: Some(ClaimsElement {
                dialect: Some("urn:unknown".to_string()),
                ..Default::default()
            }),
            ..RequestSecurityToken::issue()
        };
        assert!(matches!(parse(&rst), Err(StsError::BadRequest { .. })));
    }

    #[test]
    fn test_claim_values_and_secondary_parameters() {
        let rst = RequestSecurityToken {
            claims: Some(ClaimsElement {
                claim_value: vec![ClaimValueElement {
                    uri: "urn:role".to_string(),
                    value: "admin".to_string(),
                }],
                ..Default::default()
            }),
            secondary_parameters: Some(SecondaryParameters {
                token_type: Some(token_types::JWT.to_string()),
                key_type: Some(key_types::PUBLIC_KEY.to_string()),
                claims: Some(ClaimsElement::default().with_claim(&Claim::required("urn:mail"))),
            }),
            renewing: Some(RenewingElement {
                allow: None,
                ok: Some(true),
            }),
            ..RequestSecurityToken::issue().with_key_type(key_types::BEARER)
        };
        let parsed = parse(&rst).unwrap();
        assert_eq!(parsed.token.primary_claims.unwrap().claims[0].values, vec!["admin"]);
        assert_eq!(parsed.token.token_type.as_deref(), Some(token_types::JWT));
        assert_eq!(parsed.key.key_type, Some(KeyType::Bearer));
        assert!(parsed.token.secondary_claims.unwrap().contains("urn:mail"));
        assert!(parsed.token.renewing.allow);
        assert!(parsed.token.renewing.allow_after_expiry);
    }
}
