//! Token validators.
//!
//! A validator never fails for a bad token: signature, expiry and membership
//! problems are reported through [`TokenState`]. Errors are reserved for
//! structural problems such as a broken collaborator.

mod jwt;
mod saml;
mod sct;
mod username;
mod x509;

pub use jwt::JwtTokenValidator;
pub use saml::SamlTokenValidator;
pub use sct::SctTokenValidator;
pub use username::UsernameTokenValidator;
pub use x509::X509TokenValidator;

use time::OffsetDateTime;

use crate::claims::ProcessedClaimCollection;
use crate::context::{InvocationContext, Principal};
use crate::error::StsResult;
use crate::properties::StsProperties;
use crate::store::TokenStore;
use crate::token::{PresentedToken, ReceivedToken, TokenState};

pub struct TokenValidatorParameters<'a> {
    pub properties: &'a StsProperties,
    pub store: &'a dyn TokenStore,
    pub context: &'a InvocationContext,
    pub token: &'a ReceivedToken,
    /// Realm of the request.
    pub realm: Option<&'a str>,
}

impl TokenValidatorParameters<'_> {
    #[must_use]
    pub fn presented(&self) -> &PresentedToken {
        self.token.token()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenValidatorResponse {
    pub state: TokenState,
    pub principal: Option<Principal>,
    pub roles: Vec<String>,
    /// Realm the token was issued in.
    pub realm: Option<String>,
    pub claims: ProcessedClaimCollection,
    /// Store id of the token, when it is cache-backed.
    pub token_id: Option<String>,
    pub expires: Option<OffsetDateTime>,
    pub reason: Option<String>,
}

impl TokenValidatorResponse {
    #[must_use]
    pub fn with_state(state: TokenState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// An invalid verdict with the reason logged.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "Token rejected");
        Self {
            state: TokenState::Invalid,
            reason: Some(reason),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state == TokenState::Valid
    }

    /// Records the verdict on the token it was made for.
    pub(crate) fn apply_to(&self, token: &mut ReceivedToken) {
        token.state = self.state;
        token.principal = self.principal.clone();
        token.roles = self.roles.clone();
        token.realm = self.realm.clone();
        token.claims = self.claims.clone();
    }
}

pub trait TokenValidator: Send + Sync {
    fn name(&self) -> &str;

    fn can_handle_token(&self, token: &PresentedToken, realm: Option<&str>) -> bool;

    fn validate_token(&self, parameters: &TokenValidatorParameters<'_>) -> StsResult<TokenValidatorResponse>;
}
