use crate::claims::ClaimCollection;
use crate::constants::{binary_secrets, key_types, request_types};
use crate::crypto::X509Certificate;
use crate::lifetime::RequestedLifetime;
use crate::token::ReceivedToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Issue,
    Validate,
    Renew,
    Cancel,
}

impl RequestType {
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            request_types::ISSUE | request_types::BATCH_ISSUE => Some(Self::Issue),
            request_types::VALIDATE => Some(Self::Validate),
            request_types::RENEW => Some(Self::Renew),
            request_types::CANCEL => Some(Self::Cancel),
            _ => None,
        }
    }

    #[must_use]
    pub fn uri(self) -> &'static str {
        match self {
            Self::Issue => request_types::ISSUE,
            Self::Validate => request_types::VALIDATE,
            Self::Renew => request_types::RENEW,
            Self::Cancel => request_types::CANCEL,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Validate => "validate",
            Self::Renew => "renew",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyType {
    #[default]
    Bearer,
    SymmetricKey,
    PublicKey,
}

impl KeyType {
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            key_types::BEARER | key_types::BEARER_200802 => Some(Self::Bearer),
            key_types::SYMMETRIC_KEY => Some(Self::SymmetricKey),
            key_types::PUBLIC_KEY => Some(Self::PublicKey),
            _ => None,
        }
    }

    #[must_use]
    pub fn uri(self) -> &'static str {
        match self {
            Self::Bearer => key_types::BEARER,
            Self::SymmetricKey => key_types::SYMMETRIC_KEY,
            Self::PublicKey => key_types::PUBLIC_KEY,
        }
    }

    #[must_use]
    pub fn is_holder_of_key(self) -> bool {
        !matches!(self, Self::Bearer)
    }
}

/// Per-token renewal flags requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewingPolicy {
    pub allow: bool,
    pub allow_after_expiry: bool,
}

impl Default for RenewingPolicy {
    /// No `Renewing` element leaves the decision to the renewer.
    fn default() -> Self {
        Self {
            allow: true,
            allow_after_expiry: true,
        }
    }
}

/// Client key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entropy {
    pub secret: Vec<u8>,
    pub secret_type: Option<String>,
}

impl Entropy {
    #[must_use]
    pub fn is_nonce(&self) -> bool {
        self.secret_type.as_deref().is_none_or(|t| t == binary_secrets::NONCE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenRequirements {
    pub request_type: Option<RequestType>,
    pub token_type: Option<String>,
    pub applies_to: Option<String>,
    pub context: Option<String>,
    pub lifetime: Option<RequestedLifetime>,
    pub primary_claims: Option<ClaimCollection>,
    pub secondary_claims: Option<ClaimCollection>,
    pub on_behalf_of: Option<ReceivedToken>,
    pub act_as: Option<ReceivedToken>,
    pub validate_target: Option<ReceivedToken>,
    pub renew_target: Option<ReceivedToken>,
    pub cancel_target: Option<ReceivedToken>,
    pub renewing: RenewingPolicy,
}

impl TokenRequirements {
    /// The delegated token, `OnBehalfOf` taking precedence over `ActAs`.
    #[must_use]
    pub fn delegated_token(&self) -> Option<&ReceivedToken> {
        self.on_behalf_of.as_ref().or(self.act_as.as_ref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyRequirements {
    /// `None` when the request names no key type.
    pub key_type: Option<KeyType>,
    pub key_size: Option<u32>,
    pub entropy: Option<Entropy>,
    pub computed_key_algorithm: Option<String>,
    pub use_key_certificate: Option<X509Certificate>,
    pub encryption_algorithm: Option<String>,
    pub key_wrap_algorithm: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestRequirements {
    pub token: TokenRequirements,
    pub key: KeyRequirements,
}
