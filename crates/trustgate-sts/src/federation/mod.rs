//! Realm resolution and cross-realm federation.
//!
//! A request is served in a *target* realm chosen by the [`RealmParser`]. A
//! delegated or validated token carries the *source* realm it was issued in.
//! When the two differ, a [`Relationship`] for the ordered pair decides
//! whether the principal is mapped (`FederateIdentity`) or the claims are
//! (`FederateClaims`).

mod mapper;
mod realm;

pub use mapper::{
    CaseClaimsMapper, CaseIdentityMapper, ClaimsMapper, IdentityMapper, LetterCase,
    RenameClaimsMapper, TableIdentityMapper, claims_mapper_from_settings,
    identity_mapper_from_settings,
};
pub use realm::{IssuerRealmCodec, RealmParser, SamlRealmCodec, UrlRealmParser};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use trustgate_config::RelationshipKind;

use crate::claims::{ClaimsParameters, ProcessedClaimCollection};
use crate::context::Principal;
use crate::crypto::Crypto;
use crate::error::{StsError, StsResult};

/// Per-realm issuance overrides.
#[derive(Clone, Default)]
pub struct RealmProperties {
    pub issuer: Option<String>,
    pub signature_alias: Option<String>,
    pub signature_crypto: Option<Arc<dyn Crypto>>,
    pub encryption_alias: Option<String>,
}

impl RealmProperties {
    #[must_use]
    pub fn with_issuer(issuer: impl Into<String>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn signature_alias(mut self, alias: impl Into<String>) -> Self {
        self.signature_alias = Some(alias.into());
        self
    }
}

impl fmt::Debug for RealmProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmProperties")
            .field("issuer", &self.issuer)
            .field("signature_alias", &self.signature_alias)
            .field("signature_crypto", &self.signature_crypto.is_some())
            .field("encryption_alias", &self.encryption_alias)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipType {
    FederateIdentity,
    FederateClaims,
}

impl From<RelationshipKind> for RelationshipType {
    fn from(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::FederateIdentity => Self::FederateIdentity,
            RelationshipKind::FederateClaims => Self::FederateClaims,
        }
    }
}

/// Federation policy for one ordered realm pair.
#[derive(Clone)]
pub struct Relationship {
    pub source_realm: String,
    pub target_realm: String,
    pub relationship_type: RelationshipType,
    pub identity_mapper: Option<Arc<dyn IdentityMapper>>,
    pub claims_mapper: Option<Arc<dyn ClaimsMapper>>,
}

impl Relationship {
    #[must_use]
    pub fn new(
        source_realm: impl Into<String>,
        target_realm: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            source_realm: source_realm.into(),
            target_realm: target_realm.into(),
            relationship_type,
            identity_mapper: None,
            claims_mapper: None,
        }
    }

    #[must_use]
    pub fn with_identity_mapper(mut self, mapper: Arc<dyn IdentityMapper>) -> Self {
        self.identity_mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn with_claims_mapper(mut self, mapper: Arc<dyn ClaimsMapper>) -> Self {
        self.claims_mapper = Some(mapper);
        self
    }
}

impl fmt::Debug for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relationship")
            .field("source_realm", &self.source_realm)
            .field("target_realm", &self.target_realm)
            .field("relationship_type", &self.relationship_type)
            .field("identity_mapper", &self.identity_mapper.is_some())
            .field("claims_mapper", &self.claims_mapper.is_some())
            .finish()
    }
}

/// Relationship table keyed by `(source, target)`.
#[derive(Debug, Clone, Default)]
pub struct RelationshipResolver {
    relationships: HashMap<(String, String), Relationship>,
}

impl RelationshipResolver {
    pub fn new(relationships: impl IntoIterator<Item = Relationship>) -> StsResult<Self> {
        let mut map = HashMap::new();
        for rel in relationships {
            let key = (rel.source_realm.clone(), rel.target_realm.clone());
            if map.insert(key, rel).is_some() {
                return Err(StsError::configuration(
                    "two relationships registered for the same realm pair",
                ));
            }
        }
        Ok(Self { relationships: map })
    }

    #[must_use]
    pub fn resolve(&self, source_realm: &str, target_realm: &str) -> Option<&Relationship> {
        self.relationships
            .get(&(source_realm.to_string(), target_realm.to_string()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

/// Result of resolving the principal across realms.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub principal: Principal,
    /// Set when source and target realm differ and a relationship applied.
    pub relationship: Option<Relationship>,
    pub source_realm: Option<String>,
}

/// Relationship table plus the global mappers.
#[derive(Clone, Default)]
pub struct Federation {
    resolver: RelationshipResolver,
    identity_mapper: Option<Arc<dyn IdentityMapper>>,
    claims_mapper: Option<Arc<dyn ClaimsMapper>>,
}

impl Federation {
    #[must_use]
    pub fn new(resolver: RelationshipResolver) -> Self {
        Self {
            resolver,
            identity_mapper: None,
            claims_mapper: None,
        }
    }

    #[must_use]
    pub fn with_identity_mapper(mut self, mapper: Arc<dyn IdentityMapper>) -> Self {
        self.identity_mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn with_claims_mapper(mut self, mapper: Arc<dyn ClaimsMapper>) -> Self {
        self.claims_mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn global_identity_mapper(&self) -> Option<&Arc<dyn IdentityMapper>> {
        self.identity_mapper.as_ref()
    }

    #[must_use]
    pub fn resolver(&self) -> &RelationshipResolver {
        &self.resolver
    }

    /// Resolves the principal of a token issued in `source_realm` for use in
    /// `target_realm`.
    pub fn federate_principal(
        &self,
        source_realm: Option<&str>,
        target_realm: Option<&str>,
        principal: &Principal,
    ) -> StsResult<FederatedIdentity> {
        let (source, target) = match (source_realm, target_realm) {
            (Some(s), Some(t)) if s != t => (s, t),
            _ => {
                return Ok(FederatedIdentity {
                    principal: principal.clone(),
                    relationship: None,
                    source_realm: source_realm.map(str::to_string),
                });
            }
        };

        let relationship = self.resolver.resolve(source, target);
        let mapper = match relationship {
            None => {
                // Unresolved pairs fall back to the global mapper.
                let Some(mapper) = &self.identity_mapper else {
                    tracing::warn!(source, target, "No relationship between realms");
                    return Err(StsError::request_failed(format!(
                        "no relationship between realm {source} and realm {target}"
                    )));
                };
                mapper
            }
            Some(rel) if rel.relationship_type == RelationshipType::FederateClaims => {
                tracing::debug!(source, target, "Federating claims, principal unchanged");
                return Ok(FederatedIdentity {
                    principal: principal.clone(),
                    relationship: Some(rel.clone()),
                    source_realm: Some(source.to_string()),
                });
            }
            Some(rel) => rel
                .identity_mapper
                .as_ref()
                .or(self.identity_mapper.as_ref())
                .ok_or_else(|| {
                    StsError::request_failed(format!(
                        "no IdentityMapper configured for realm {source} to realm {target}"
                    ))
                })?,
        };

        let mapped = mapper
            .map_principal(source, principal, target)
            .ok_or_else(|| {
                StsError::request_failed(format!(
                    "principal cannot be mapped from realm {source} to realm {target}"
                ))
            })?;
        tracing::debug!(
            source,
            target,
            from = %principal,
            to = %mapped,
            "Principal mapped across realms"
        );

        Ok(FederatedIdentity {
            principal: mapped,
            relationship: relationship.cloned(),
            source_realm: Some(source.to_string()),
        })
    }

    /// Maps claims issued in the relationship's source realm into its target
    /// realm.
    pub fn federate_claims(
        &self,
        relationship: &Relationship,
        claims: &ProcessedClaimCollection,
        parameters: &ClaimsParameters,
    ) -> StsResult<ProcessedClaimCollection> {
        let mapper = relationship
            .claims_mapper
            .as_ref()
            .or(self.claims_mapper.as_ref())
            .ok_or_else(|| {
                StsError::bad_request(format!(
                    "no ClaimsMapper configured for realm {} to realm {}",
                    relationship.source_realm, relationship.target_realm
                ))
            })?;
        mapper.map_claims(
            &relationship.source_realm,
            claims,
            &relationship.target_realm,
            parameters,
        )
    }
}

impl fmt::Debug for Federation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Federation")
            .field("resolver", &self.resolver)
            .field("identity_mapper", &self.identity_mapper.is_some())
            .field("claims_mapper", &self.claims_mapper.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ProcessedClaim;

    fn upper() -> Arc<dyn IdentityMapper> {
        Arc::new(CaseIdentityMapper(LetterCase::Upper))
    }

    fn lower() -> Arc<dyn IdentityMapper> {
        Arc::new(CaseIdentityMapper(LetterCase::Lower))
    }

    #[test]
    fn test_same_realm_is_passthrough() {
        let federation = Federation::default();
        let out = federation
            .federate_principal(Some("A"), Some("A"), &Principal::new("alice"))
            .unwrap();
        assert_eq!(out.principal.name(), "alice");
        assert!(out.relationship.is_none());
    }

    #[test]
    fn test_missing_relationship_fails_without_global_mapper() {
        let federation = Federation::default();
        let err = federation
            .federate_principal(Some("A"), Some("B"), &Principal::new("alice"))
            .unwrap_err();
        assert!(matches!(err, StsError::RequestFailed { .. }));
    }

    #[test]
    fn test_missing_relationship_uses_global_mapper() {
        let federation = Federation::default().with_identity_mapper(upper());
        let out = federation
            .federate_principal(Some("A"), Some("B"), &Principal::new("alice"))
            .unwrap();
        assert_eq!(out.principal.name(), "ALICE");
    }

    #[test]
    fn test_relationship_mapper_overrides_global() {
        let rel = Relationship::new("A", "B", RelationshipType::FederateIdentity)
            .with_identity_mapper(lower());
        let federation = Federation::new(RelationshipResolver::new([rel]).unwrap())
            .with_identity_mapper(upper());
        let out = federation
            .federate_principal(Some("A"), Some("B"), &Principal::new("Alice"))
            .unwrap();
        assert_eq!(out.principal.name(), "alice");
        assert!(out.relationship.is_some());
    }

    #[test]
    fn test_federate_claims_keeps_principal() {
        let rel = Relationship::new("A", "B", RelationshipType::FederateClaims);
        let federation = Federation::new(RelationshipResolver::new([rel]).unwrap())
            .with_identity_mapper(upper());
        let out = federation
            .federate_principal(Some("A"), Some("B"), &Principal::new("alice"))
            .unwrap();
        assert_eq!(out.principal.name(), "alice");
        assert_eq!(
            out.relationship.map(|r| r.relationship_type),
            Some(RelationshipType::FederateClaims)
        );
    }

    #[test]
    fn test_federate_claims_without_mapper_is_bad_request() {
        let rel = Relationship::new("A", "B", RelationshipType::FederateClaims);
        let federation = Federation::default();
        let claims: ProcessedClaimCollection =
            std::iter::once(ProcessedClaim::new("urn:a", vec!["x".to_string()])).collect();
        let err = federation
            .federate_claims(&rel, &claims, &ClaimsParameters::default())
            .unwrap_err();
        assert!(matches!(err, StsError::BadRequest { .. }));
    }

    #[test]
    fn test_duplicate_relationship_rejected() {
        let a = Relationship::new("A", "B", RelationshipType::FederateClaims);
        let b = Relationship::new("A", "B", RelationshipType::FederateIdentity);
        assert!(RelationshipResolver::new([a, b]).is_err());
    }
}
