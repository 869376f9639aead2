//! RequestSecurityToken document model.
//!
//! Field names mirror the WS-Trust element names so bindings can map the wire
//! form onto this model one to one. The JSON form used by the CLI is the
//! serde rendering of these types.

mod parser;
mod requirements;

pub use parser::RequestParser;
pub use requirements::{
    Entropy, KeyRequirements, KeyType, RenewingPolicy, RequestRequirements, RequestType,
    TokenRequirements,
};

use serde::{Deserialize, Serialize};

use crate::claims::Claim;
use crate::constants::{binary_secrets, request_types};
use crate::crypto::X509Certificate;
use crate::token::PresentedToken;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifetimeElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClaimTypeElement {
    pub uri: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClaimValueElement {
    pub uri: String,
    pub value: String,
}

/// `wst:Claims`. Canonical dialects list `ClaimType`/`ClaimValue`; any other
/// dialect carries its content in `Content` for a registered claims parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClaimsElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claim_type: Vec<ClaimTypeElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claim_value: Vec<ClaimValueElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

impl ClaimsElement {
    #[must_use]
    pub fn with_claim(mut self, claim: &Claim) -> Self {
        self.claim_type.push(ClaimTypeElement {
            uri: claim.claim_type.clone(),
            optional: claim.optional,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BinarySecretElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    /// Base64 secret.
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntropyElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_secret: Option<BinarySecretElement>,
}

impl EntropyElement {
    #[must_use]
    pub fn nonce(secret: &[u8]) -> Self {
        Self {
            binary_secret: Some(BinarySecretElement {
                r#type: Some(binary_secrets::NONCE.to_string()),
                value: crate::encoding::encode(secret),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UseKeyElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<X509Certificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointReference {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppliesToElement {
    pub endpoint_reference: EndpointReference,
}

impl AppliesToElement {
    #[must_use]
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            endpoint_reference: EndpointReference {
                address: address.into(),
            },
        }
    }
}

/// `wst:Renewing`. `OK` permits renewal after expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RenewingElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<bool>,
    #[serde(default, rename = "OK", skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecondaryParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimsElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestSecurityToken {
    /// Opaque value echoed into the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<LifetimeElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimsElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_behalf_of: Option<PresentedToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act_as: Option<PresentedToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_target: Option<PresentedToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_target: Option<PresentedToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_target: Option<PresentedToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<EntropyElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_key_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_key: Option<UseKeyElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<AppliesToElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_wrap_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewing: Option<RenewingElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_parameters: Option<SecondaryParameters>,
}

impl RequestSecurityToken {
    #[must_use]
    pub fn issue() -> Self {
        Self::of_type(request_types::ISSUE)
    }

    #[must_use]
    pub fn validate(target: PresentedToken) -> Self {
        Self {
            validate_target: Some(target),
            ..Self::of_type(request_types::VALIDATE)
        }
    }

    #[must_use]
    pub fn renew(target: PresentedToken) -> Self {
        Self {
            renew_target: Some(target),
            ..Self::of_type(request_types::RENEW)
        }
    }

    #[must_use]
    pub fn cancel(target: PresentedToken) -> Self {
        Self {
            cancel_target: Some(target),
            ..Self::of_type(request_types::CANCEL)
        }
    }

    fn of_type(request_type: &str) -> Self {
        Self {
            request_type: Some(request_type.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    #[must_use]
    pub fn with_key_type(mut self, key_type: impl Into<String>) -> Self {
        self.key_type = Some(key_type.into());
        self
    }

    #[must_use]
    pub fn with_applies_to(mut self, address: impl Into<String>) -> Self {
        self.applies_to = Some(AppliesToElement::address(address));
        self
    }

    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        let claims = self.claims.take().unwrap_or_default();
        self.claims = Some(claims.with_claim(&claim));
        self
    }

    #[must_use]
    pub fn with_on_behalf_of(mut self, token: PresentedToken) -> Self {
        self.on_behalf_of = Some(token);
        self
    }

    #[must_use]
    pub fn with_act_as(mut self, token: PresentedToken) -> Self {
        self.act_as = Some(token);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_entropy(mut self, secret: &[u8]) -> Self {
        self.entropy = Some(EntropyElement::nonce(secret));
        self
    }

    #[must_use]
    pub fn with_use_key(mut self, certificate: X509Certificate) -> Self {
        self.use_key = Some(UseKeyElement {
            certificate: Some(certificate),
        });
        self
    }

    #[must_use]
    pub fn with_lifetime(mut self, created: Option<String>, expires: Option<String>) -> Self {
        self.lifetime = Some(LifetimeElement { created, expires });
        self
    }

    #[must_use]
    pub fn with_renewing(mut self, allow: bool, ok: bool) -> Self {
        self.renewing = Some(RenewingElement {
            allow: Some(allow),
            ok: Some(ok),
        });
        self
    }

    #[must_use]
    pub fn applies_to_address(&self) -> Option<&str> {
        self.applies_to
            .as_ref()
            .map(|a| a.endpoint_reference.address.as_str())
    }
}
