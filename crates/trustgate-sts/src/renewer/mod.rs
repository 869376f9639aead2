//! Token renewers: extend the lifetime of a token the STS issued earlier.

mod saml;
mod sct;

pub use saml::SamlTokenRenewer;
pub use sct::SctTokenRenewer;

use time::{Duration, OffsetDateTime};

use crate::context::InvocationContext;
use crate::error::{StsError, StsResult};
use crate::lifetime::Lifetime;
use crate::properties::StsProperties;
use crate::request::{KeyRequirements, TokenRequirements};
use crate::store::{CachedToken, TokenStore};
use crate::token::{ReceivedToken, TokenElement, TokenState};

/// Default limit on how long ago an expired token may have expired.
pub const DEFAULT_MAX_EXPIRY: Duration = Duration::minutes(30);

pub struct TokenRenewerParameters<'a> {
    pub properties: &'a StsProperties,
    pub store: &'a dyn TokenStore,
    pub context: &'a InvocationContext,
    pub token_requirements: &'a TokenRequirements,
    pub key_requirements: &'a KeyRequirements,
    /// The renew target, already validated.
    pub token: &'a ReceivedToken,
    pub realm: Option<&'a str>,
}

impl TokenRenewerParameters<'_> {
    pub fn resolve_lifetime(&self) -> StsResult<Lifetime> {
        self.properties
            .lifetime
            .resolve(self.token_requirements.lifetime.as_ref(), OffsetDateTime::now_utc())
    }
}

#[derive(Debug, Clone)]
pub struct TokenRenewerResponse {
    pub token: TokenElement,
    pub token_id: String,
    pub attached_id: Option<String>,
    pub lifetime: Lifetime,
}

impl TokenRenewerResponse {
    #[must_use]
    pub fn attached_id(&self) -> &str {
        self.attached_id.as_deref().unwrap_or(&self.token_id)
    }
}

pub trait TokenRenewer: Send + Sync {
    fn name(&self) -> &str;

    fn can_handle_token(&self, token: &ReceivedToken, realm: Option<&str>) -> bool;

    /// Whether tokens that already expired may be renewed at all.
    fn allow_renewal_after_expiry(&self) -> bool;

    fn renew_token(&self, parameters: &TokenRenewerParameters<'_>) -> StsResult<TokenRenewerResponse>;
}

/// Renewal limits shared by the bundled renewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    pub allow_renewal_after_expiry: bool,
    pub max_expiry: Duration,
    pub verify_proof_of_possession: bool,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            allow_renewal_after_expiry: false,
            max_expiry: DEFAULT_MAX_EXPIRY,
            verify_proof_of_possession: true,
        }
    }
}

impl RenewalPolicy {
    pub fn from_settings(settings: &trustgate_config::RenewalSettings) -> StsResult<Self> {
        Ok(Self {
            allow_renewal_after_expiry: settings.allow_renewal_after_expiry,
            max_expiry: Duration::try_from(settings.max_expiry)
                .map_err(|e| StsError::configuration(e.to_string()))?,
            verify_proof_of_possession: settings.verify_proof_of_possession,
        })
    }

    /// Looks up the cached entry of `id` and checks it may be renewed now.
    pub(crate) fn eligible(
        &self,
        store: &dyn TokenStore,
        id: &str,
        state: TokenState,
    ) -> StsResult<CachedToken> {
        let cached = store
            .get(id)
            .ok_or_else(|| StsError::token_not_found(id))?;
        if !cached.properties.allow_renewing {
            return Err(StsError::renewal_not_allowed(format!(
                "token {id} was issued as not renewable"
            )));
        }

        let now = OffsetDateTime::now_utc();
        let expired = state == TokenState::Expired || cached.is_expired_at(now);
        if expired {
            if !self.allow_renewal_after_expiry || !cached.properties.allow_renewing_after_expiry {
                return Err(StsError::renewal_not_allowed(format!(
                    "token {id} has expired"
                )));
            }
            if let Some(expires) = cached.expires {
                if now - expires > self.max_expiry {
                    return Err(StsError::renewal_not_allowed(format!(
                        "token {id} expired more than {} seconds ago",
                        self.max_expiry.whole_seconds()
                    )));
                }
            }
        }
        Ok(cached)
    }
}
