//! Token models: what callers present, and what the STS hands out.

pub mod element;
pub mod jwt;
pub mod reference;
pub mod saml;
pub mod sct;
pub mod username;

use serde::{Deserialize, Serialize};

use crate::claims::ProcessedClaimCollection;
use crate::constants::token_types;
use crate::context::Principal;
use crate::crypto::X509Certificate;

pub use element::{EncryptedData, TokenElement};
pub use reference::TokenReference;
pub use saml::{SamlAssertion, SamlVersion};
pub use sct::SecurityContextToken;
pub use username::UsernameToken;

/// Validation state of a presented token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    /// Not validated yet.
    #[default]
    None,
    Valid,
    Invalid,
    Expired,
}

/// Token kinds the engine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Saml1,
    Saml2,
    Jwt,
    UsernameToken,
    X509,
    SecurityContext,
}

impl TokenKind {
    #[must_use]
    pub fn is_saml(self) -> bool {
        matches!(self, Self::Saml1 | Self::Saml2)
    }
}

/// A token as presented in `OnBehalfOf`, `ActAs`, `ValidateTarget`,
/// `RenewTarget` or `CancelTarget`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresentedToken {
    Saml(SamlAssertion),
    Jwt(String),
    UsernameToken(UsernameToken),
    X509(X509Certificate),
    SecurityContext(SecurityContextToken),
}

impl PresentedToken {
    #[must_use]
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::Saml(a) => match a.version {
                SamlVersion::V1_1 => TokenKind::Saml1,
                SamlVersion::V2_0 => TokenKind::Saml2,
            },
            Self::Jwt(_) => TokenKind::Jwt,
            Self::UsernameToken(_) => TokenKind::UsernameToken,
            Self::X509(_) => TokenKind::X509,
            Self::SecurityContext(_) => TokenKind::SecurityContext,
        }
    }

    /// Token type URI of the presented token.
    #[must_use]
    pub fn token_type(&self) -> &'static str {
        match self.kind() {
            TokenKind::Saml1 => token_types::SAML_1_1,
            TokenKind::Saml2 => token_types::SAML_2_0,
            TokenKind::Jwt => token_types::JWT,
            TokenKind::UsernameToken => token_types::USERNAME_TOKEN,
            TokenKind::X509 => token_types::X509_V3,
            TokenKind::SecurityContext => token_types::SCT,
        }
    }

    /// Returns `true` if `token_type` names this token's kind.
    #[must_use]
    pub fn is_of_type(&self, token_type: &str) -> bool {
        match self.kind() {
            TokenKind::Saml1 => token_types::is_saml1(token_type),
            TokenKind::Saml2 => token_types::is_saml2(token_type),
            TokenKind::SecurityContext => token_types::is_sct(token_type),
            _ => token_type == self.token_type(),
        }
    }

    /// Audience restriction embedded in the token, if any.
    #[must_use]
    pub fn audiences(&self) -> Vec<String> {
        match self {
            Self::Saml(a) => a.conditions.audiences.clone(),
            Self::Jwt(token) => jwt::peek_audiences(token),
            _ => Vec::new(),
        }
    }
}

/// A presented token together with what validation found out about it.
#[derive(Debug, Clone)]
pub struct ReceivedToken {
    pub(crate) token: PresentedToken,
    pub(crate) state: TokenState,
    pub(crate) principal: Option<Principal>,
    pub(crate) roles: Vec<String>,
    pub(crate) realm: Option<String>,
    pub(crate) claims: ProcessedClaimCollection,
}

impl ReceivedToken {
    #[must_use]
    pub fn new(token: PresentedToken) -> Self {
        Self {
            token,
            state: TokenState::None,
            principal: None,
            roles: Vec::new(),
            realm: None,
            claims: ProcessedClaimCollection::default(),
        }
    }

    #[must_use]
    pub fn token(&self) -> &PresentedToken {
        &self.token
    }

    #[must_use]
    pub fn kind(&self) -> TokenKind {
        self.token.kind()
    }

    #[must_use]
    pub fn state(&self) -> TokenState {
        self.state
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Realm the token was issued in, as reported by its validator.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Claims carried inside the token.
    #[must_use]
    pub fn claims(&self) -> &ProcessedClaimCollection {
        &self.claims
    }
}
