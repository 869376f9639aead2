use std::collections::HashMap;
use std::sync::Arc;

use trustgate_config::{ClaimsMapperSettings, IdentityMapperSettings};

use crate::claims::{ClaimsParameters, ProcessedClaim, ProcessedClaimCollection};
use crate::context::Principal;
use crate::error::StsResult;

/// Maps a principal of one realm to the corresponding principal of another.
pub trait IdentityMapper: Send + Sync {
    /// Returns `None` when the principal has no counterpart in `target_realm`.
    fn map_principal(
        &self,
        source_realm: &str,
        principal: &Principal,
        target_realm: &str,
    ) -> Option<Principal>;
}

/// Maps claims issued in one realm to claims understood in another.
pub trait ClaimsMapper: Send + Sync {
    fn map_claims(
        &self,
        source_realm: &str,
        claims: &ProcessedClaimCollection,
        target_realm: &str,
        parameters: &ClaimsParameters,
    ) -> StsResult<ProcessedClaimCollection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterCase {
    Upper,
    Lower,
}

impl LetterCase {
    fn apply(self, value: &str) -> String {
        match self {
            Self::Upper => value.to_uppercase(),
            Self::Lower => value.to_lowercase(),
        }
    }
}

/// Changes the letter case of the principal name.
#[derive(Debug, Clone, Copy)]
pub struct CaseIdentityMapper(pub LetterCase);

impl IdentityMapper for CaseIdentityMapper {
    fn map_principal(&self, _: &str, principal: &Principal, _: &str) -> Option<Principal> {
        Some(Principal::new(self.0.apply(principal.name())))
    }
}

/// Explicit name table. Names absent from the table do not map.
#[derive(Debug, Clone, Default)]
pub struct TableIdentityMapper {
    entries: HashMap<String, String>,
}

impl TableIdentityMapper {
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

impl IdentityMapper for TableIdentityMapper {
    fn map_principal(&self, _: &str, principal: &Principal, _: &str) -> Option<Principal> {
        self.entries.get(principal.name()).map(Principal::new)
    }
}

/// Changes the letter case of every claim value.
#[derive(Debug, Clone, Copy)]
pub struct CaseClaimsMapper(pub LetterCase);

impl ClaimsMapper for CaseClaimsMapper {
    fn map_claims(
        &self,
        _: &str,
        claims: &ProcessedClaimCollection,
        _: &str,
        _: &ClaimsParameters,
    ) -> StsResult<ProcessedClaimCollection> {
        Ok(claims
            .iter()
            .map(|c| ProcessedClaim {
                values: c.values.iter().map(|v| self.0.apply(v)).collect(),
                ..c.clone()
            })
            .collect())
    }
}

/// Renames claim types. Values and unlisted types pass through.
#[derive(Debug, Clone, Default)]
pub struct RenameClaimsMapper {
    types: HashMap<String, String>,
}

impl RenameClaimsMapper {
    #[must_use]
    pub fn new(types: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

impl ClaimsMapper for RenameClaimsMapper {
    fn map_claims(
        &self,
        _: &str,
        claims: &ProcessedClaimCollection,
        _: &str,
        _: &ClaimsParameters,
    ) -> StsResult<ProcessedClaimCollection> {
        Ok(claims
            .iter()
            .map(|c| {
                let mut mapped = c.clone();
                if let Some(renamed) = self.types.get(&c.claim_type) {
                    mapped.original_issuer = c.issuer.clone();
                    mapped.claim_type = renamed.clone();
                }
                mapped
            })
            .collect())
    }
}

#[must_use]
pub fn identity_mapper_from_settings(settings: &IdentityMapperSettings) -> Arc<dyn IdentityMapper> {
    match settings {
        IdentityMapperSettings::Uppercase => Arc::new(CaseIdentityMapper(LetterCase::Upper)),
        IdentityMapperSettings::Lowercase => Arc::new(CaseIdentityMapper(LetterCase::Lower)),
        IdentityMapperSettings::Table { entries } => Arc::new(TableIdentityMapper::new(
            entries.iter().map(|(k, v)| (k.clone(), v.clone())),
        )),
    }
}

#[must_use]
pub fn claims_mapper_from_settings(settings: &ClaimsMapperSettings) -> Arc<dyn ClaimsMapper> {
    match settings {
        ClaimsMapperSettings::Uppercase => Arc::new(CaseClaimsMapper(LetterCase::Upper)),
        ClaimsMapperSettings::Lowercase => Arc::new(CaseClaimsMapper(LetterCase::Lower)),
        ClaimsMapperSettings::Rename { types } => Arc::new(RenameClaimsMapper::new(
            types.iter().map(|(k, v)| (k.clone(), v.clone())),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_identity_mapper() {
        let mapper = CaseIdentityMapper(LetterCase::Upper);
        let mapped = mapper.map_principal("A", &Principal::new("alice"), "B").unwrap();
        assert_eq!(mapped.name(), "ALICE");
    }

    #[test]
    fn test_table_identity_mapper_unmapped() {
        let mapper = TableIdentityMapper::new([("alice".to_string(), "alice@b".to_string())]);
        assert_eq!(
            mapper
                .map_principal("A", &Principal::new("alice"), "B")
                .unwrap()
                .name(),
            "alice@b"
        );
        assert!(mapper.map_principal("A", &Principal::new("bob"), "B").is_none());
    }

    #[test]
    fn test_case_claims_mapper() {
        let claims: ProcessedClaimCollection =
            std::iter::once(ProcessedClaim::new("urn:surname", vec!["doe".to_string()])).collect();
        let mapped = CaseClaimsMapper(LetterCase::Upper)
            .map_claims("A", &claims, "B", &ClaimsParameters::default())
            .unwrap();
        assert_eq!(mapped.value("urn:surname"), Some("DOE"));
    }

    #[test]
    fn test_rename_claims_mapper() {
        let claims: ProcessedClaimCollection = std::iter::once(
            ProcessedClaim::new("urn:a", vec!["x".to_string()]).with_issuer("realm-a"),
        )
        .collect();
        let mapper = RenameClaimsMapper::new([("urn:a".to_string(), "urn:b".to_string())]);
        let mapped = mapper
            .map_claims("A", &claims, "B", &ClaimsParameters::default())
            .unwrap();
        let claim = mapped.get("urn:b").unwrap();
        assert_eq!(claim.values, vec!["x".to_string()]);
        assert_eq!(claim.original_issuer.as_deref(), Some("realm-a"));
    }
}
