//! Token providers: build a new token for an Issue or a transforming
//! Validate.

mod jwt;
mod keys;
mod saml;
mod sct;

pub use jwt::JwtTokenProvider;
pub use keys::{DEFAULT_KEY_SIZE, MAX_KEY_SIZE, MIN_KEY_SIZE, ProofKey, SymmetricKey, resolve_public_key};
pub use saml::SamlTokenProvider;
pub use sct::SctTokenProvider;

use std::collections::HashMap;

use time::OffsetDateTime;

use crate::claims::ProcessedClaimCollection;
use crate::context::{InvocationContext, Principal};
use crate::error::{StsError, StsResult};
use crate::federation::RealmProperties;
use crate::lifetime::Lifetime;
use crate::properties::StsProperties;
use crate::request::{KeyRequirements, KeyType, TokenRequirements};
use crate::service::EncryptionProperties;
use crate::store::{CachedToken, TokenProperties, TokenStore};
use crate::token::TokenElement;

/// Everything a provider needs to build one token.
pub struct TokenProviderParameters<'a> {
    pub properties: &'a StsProperties,
    pub store: &'a dyn TokenStore,
    pub context: &'a InvocationContext,
    pub token_requirements: &'a TokenRequirements,
    pub key_requirements: &'a KeyRequirements,
    /// Resolved token type URI.
    pub token_type: String,
    pub key_type: KeyType,
    /// Subject after federation.
    pub principal: Option<Principal>,
    pub roles: Vec<String>,
    /// Realm the token is issued in.
    pub realm: Option<String>,
    pub applies_to: Option<String>,
    /// Resolved requested claims.
    pub claims: ProcessedClaimCollection,
    /// Encryption policy of the relying party.
    pub encryption: EncryptionProperties,
}

impl TokenProviderParameters<'_> {
    pub fn require_principal(&self) -> StsResult<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| StsError::request_failed("no principal to issue a token for"))
    }

    pub fn resolve_lifetime(&self) -> StsResult<Lifetime> {
        self.properties
            .lifetime
            .resolve(self.token_requirements.lifetime.as_ref(), OffsetDateTime::now_utc())
    }

    /// Records an issued token for later validation, renewal or cancellation.
    pub fn cache(
        &self,
        id: &str,
        payload: TokenElement,
        lifetime: &Lifetime,
        secret: Option<Vec<u8>>,
    ) -> StsResult<()> {
        let mut entry = CachedToken::new(id, &self.token_type, payload);
        entry.realm = self.realm.clone();
        entry.principal = self.principal.clone();
        entry.created = lifetime.created;
        entry.expires = Some(lifetime.expires);
        entry.secret = secret;
        entry.properties = TokenProperties {
            allow_renewing: self.token_requirements.renewing.allow,
            allow_renewing_after_expiry: self.token_requirements.renewing.allow_after_expiry,
            applies_to: self.applies_to.clone(),
            roles: self.roles.clone(),
            claims: self.claims.clone(),
        };
        self.store.put(entry)?;
        tracing::debug!(id, token_type = %self.token_type, "Issued token cached");
        Ok(())
    }
}

/// What a provider produced.
#[derive(Debug, Clone)]
pub struct TokenProviderResponse {
    /// The token, never encrypted. Encryption for the relying party happens
    /// afterwards.
    pub token: TokenElement,
    pub token_id: String,
    /// Id used by the attached reference when it differs from `token_id`.
    pub attached_id: Option<String>,
    pub lifetime: Option<Lifetime>,
    pub proof: Option<ProofKey>,
    pub key_size: Option<u32>,
}

impl TokenProviderResponse {
    #[must_use]
    pub fn new(token: TokenElement, token_id: impl Into<String>) -> Self {
        Self {
            token,
            token_id: token_id.into(),
            attached_id: None,
            lifetime: None,
            proof: None,
            key_size: None,
        }
    }

    #[must_use]
    pub fn attached_id(&self) -> &str {
        self.attached_id.as_deref().unwrap_or(&self.token_id)
    }
}

pub trait TokenProvider: Send + Sync {
    fn name(&self) -> &str;

    fn can_handle_token(&self, token_type: &str, realm: Option<&str>) -> bool;

    /// Returns `true` if the provider carries settings of its own for
    /// `realm`.
    fn has_realm(&self, _realm: &str) -> bool {
        false
    }

    fn create_token(&self, parameters: &TokenProviderParameters<'_>) -> StsResult<TokenProviderResponse>;
}

/// Realm table of a provider that serves only some realms.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProviderRealms(Option<HashMap<String, RealmProperties>>);

impl ProviderRealms {
    pub(crate) fn new(realms: HashMap<String, RealmProperties>) -> Self {
        Self(Some(realms))
    }

    /// A provider with a realm table refuses realms outside it.
    pub(crate) fn accepts(&self, realm: Option<&str>) -> bool {
        match (&self.0, realm) {
            (Some(map), Some(r)) => map.contains_key(r),
            _ => true,
        }
    }

    pub(crate) fn contains(&self, realm: &str) -> bool {
        self.0.as_ref().is_some_and(|m| m.contains_key(realm))
    }

    /// The provider's own settings for `realm`, else the engine-wide ones.
    pub(crate) fn lookup<'a>(
        &'a self,
        properties: &'a StsProperties,
        realm: Option<&str>,
    ) -> Option<&'a RealmProperties> {
        let realm = realm?;
        self.0
            .as_ref()
            .and_then(|m| m.get(realm))
            .or_else(|| properties.realms.get(realm))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::SymmetricKeyStore;
    use crate::store::InMemoryTokenStore;

    pub(crate) fn properties() -> StsProperties {
        let crypto = SymmetricKeyStore::new()
            .with_entry("sts", vec![3u8; 32], "CN=sts")
            .with_entry("service", vec![4u8; 32], "CN=service");
        StsProperties::new("https://sts.example.com", Arc::new(crypto))
    }

    pub(crate) struct Fixture {
        pub properties: StsProperties,
        pub store: InMemoryTokenStore,
        pub context: InvocationContext,
        pub token: TokenRequirements,
        pub key: KeyRequirements,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            Self {
                properties: properties(),
                store: InMemoryTokenStore::new(),
                context: InvocationContext::new().with_principal(Principal::new("alice")),
                token: TokenRequirements::default(),
                key: KeyRequirements::default(),
            }
        }

        pub(crate) fn parameters(&self, token_type: &str) -> TokenProviderParameters<'_> {
            TokenProviderParameters {
                properties: &self.properties,
                store: &self.store,
                context: &self.context,
                token_requirements: &self.token,
                key_requirements: &self.key,
                token_type: token_type.to_string(),
                key_type: self.key.key_type.unwrap_or_default(),
                principal: self.context.principal().cloned(),
                roles: Vec::new(),
                realm: None,
                applies_to: Some("http://x/service".to_string()),
                claims: ProcessedClaimCollection::default(),
                encryption: EncryptionProperties::default(),
            }
        }
    }
}
