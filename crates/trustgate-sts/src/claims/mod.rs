//! Requested and resolved claims.

mod handlers;
mod manager;

pub use handlers::StaticClaimsHandler;
pub use manager::ClaimsManager;

use serde::{Deserialize, Serialize};

use crate::context::Principal;
use crate::error::StsResult;

/// A requested claim type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    #[serde(default)]
    pub optional: bool,
    /// Values supplied by the requester (WS-Trust 1.4 `ClaimValue`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl Claim {
    #[must_use]
    pub fn required(claim_type: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            optional: false,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn optional(claim_type: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            optional: true,
            values: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCollection {
    pub dialect: Option<String>,
    pub claims: Vec<Claim>,
}

impl ClaimCollection {
    #[must_use]
    pub fn new(dialect: Option<String>) -> Self {
        Self {
            dialect,
            claims: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn push(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    #[must_use]
    pub fn contains(&self, claim_type: &str) -> bool {
        self.claims.iter().any(|c| c.claim_type == claim_type)
    }
}

/// A claim with resolved values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedClaim {
    pub claim_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_issuer: Option<String>,
    pub values: Vec<String>,
}

impl ProcessedClaim {
    #[must_use]
    pub fn new(claim_type: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            issuer: None,
            original_issuer: None,
            values,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessedClaimCollection(Vec<ProcessedClaim>);

impl ProcessedClaimCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, claim: ProcessedClaim) {
        self.0.push(claim);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessedClaim> {
        self.0.iter()
    }

    #[must_use]
    pub fn get(&self, claim_type: &str) -> Option<&ProcessedClaim> {
        self.0.iter().find(|c| c.claim_type == claim_type)
    }

    /// First value of `claim_type`.
    #[must_use]
    pub fn value(&self, claim_type: &str) -> Option<&str> {
        self.get(claim_type)
            .and_then(|c| c.values.first())
            .map(String::as_str)
    }

    /// Keeps only the claim types present in `requested`.
    #[must_use]
    pub fn restricted_to(self, requested: &ClaimCollection) -> Self {
        Self(
            self.0
                .into_iter()
                .filter(|c| requested.contains(&c.claim_type))
                .collect(),
        )
    }
}

impl FromIterator<ProcessedClaim> for ProcessedClaimCollection {
    fn from_iter<I: IntoIterator<Item = ProcessedClaim>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ProcessedClaimCollection {
    type Item = ProcessedClaim;
    type IntoIter = std::vec::IntoIter<ProcessedClaim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Extend<ProcessedClaim> for ProcessedClaimCollection {
    fn extend<I: IntoIterator<Item = ProcessedClaim>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

/// What a claims handler knows about the request it serves.
#[derive(Debug, Clone, Default)]
pub struct ClaimsParameters {
    pub principal: Option<Principal>,
    pub roles: Vec<String>,
    pub realm: Option<String>,
    pub applies_to: Option<String>,
    pub token_type: Option<String>,
}

/// Resolves values for a set of claim types.
pub trait ClaimsHandler: Send + Sync {
    fn supported_claim_types(&self) -> &[String];

    /// Realms this handler serves. `None` means every realm.
    fn supported_realms(&self) -> Option<&[String]> {
        None
    }

    /// Realm the handler's user directory lives in. When it differs from the
    /// request realm the principal is mapped into it first.
    fn handler_realm(&self) -> Option<&str> {
        None
    }

    fn retrieve_claim_values(
        &self,
        claims: &ClaimCollection,
        parameters: &ClaimsParameters,
    ) -> StsResult<ProcessedClaimCollection>;
}

/// Translates a custom claims dialect into canonical claims.
pub trait ClaimsParser: Send + Sync {
    fn supported_dialect(&self) -> &str;

    fn parse(&self, content: &serde_json::Value) -> StsResult<Vec<Claim>>;
}
