//! Issued-token cache.
//!
//! The store is the only mutable state shared between concurrent operations.
//! Ids are unique for the lifetime of the store: a removed or swept id is
//! kept as a tombstone and never accepted again.

mod memory;
mod sweeper;

pub use memory::InMemoryTokenStore;
pub use sweeper::spawn_expiry_sweeper;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::claims::ProcessedClaimCollection;
use crate::context::Principal;
use crate::encoding;
use crate::error::StsResult;
use crate::token::TokenElement;

/// Renewal policy and issuance context recorded with a cached token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenProperties {
    pub allow_renewing: bool,
    pub allow_renewing_after_expiry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub claims: ProcessedClaimCollection,
}

impl Default for TokenProperties {
    fn default() -> Self {
        Self {
            allow_renewing: true,
            allow_renewing_after_expiry: false,
            applies_to: None,
            roles: Vec::new(),
            claims: ProcessedClaimCollection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub id: String,
    pub token_type: String,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub principal: Option<Principal>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires: Option<OffsetDateTime>,
    /// The token as issued, before any encryption for the relying party.
    pub payload: TokenElement,
    /// Proof-of-possession secret bound to the token.
    #[serde(default, with = "encoding::base64_option")]
    pub secret: Option<Vec<u8>>,
    #[serde(default)]
    pub properties: TokenProperties,
}

impl CachedToken {
    #[must_use]
    pub fn new(id: impl Into<String>, token_type: impl Into<String>, payload: TokenElement) -> Self {
        Self {
            id: id.into(),
            token_type: token_type.into(),
            realm: None,
            principal: None,
            created: OffsetDateTime::now_utc(),
            expires: None,
            payload,
            secret: None,
            properties: TokenProperties::default(),
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
        self.expires.is_some_and(|expires| instant >= expires)
    }
}

/// Concurrent keyed cache with read-your-writes per id.
pub trait TokenStore: Send + Sync {
    /// Adds a new token. Fails if the id is live or was removed.
    fn put(&self, token: CachedToken) -> StsResult<()>;

    /// Replaces a live token with the same id.
    fn update(&self, token: CachedToken) -> StsResult<()>;

    fn get(&self, id: &str) -> Option<CachedToken>;

    /// Removes a live token, returning it.
    fn remove(&self, id: &str) -> Option<CachedToken>;

    fn ids(&self) -> Vec<String>;

    /// Turns live tokens that expired before `cutoff` into tombstones.
    /// Returns the number of tokens dropped.
    fn remove_expired(&self, cutoff: OffsetDateTime) -> usize;
}
