use std::collections::HashMap;

use trustgate_config::StaticClaimSettings;

use super::{ClaimCollection, ClaimsHandler, ClaimsParameters, ProcessedClaim, ProcessedClaimCollection};
use crate::error::StsResult;

#[derive(Debug, Clone)]
struct StaticValue {
    values: Vec<String>,
    realms: Vec<String>,
}

/// Claims held in a fixed table keyed by principal name and claim type.
#[derive(Debug, Clone, Default)]
pub struct StaticClaimsHandler {
    claim_types: Vec<String>,
    table: HashMap<(String, String), Vec<StaticValue>>,
    supported_realms: Option<Vec<String>>,
    handler_realm: Option<String>,
    issuer: Option<String>,
}

impl StaticClaimsHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_claim<I, V>(self, principal: &str, claim_type: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.with_realm_claim(principal, claim_type, values, Vec::<String>::new())
    }

    /// Adds values visible only in the listed realms.
    #[must_use]
    pub fn with_realm_claim<I, V, R>(
        mut self,
        principal: &str,
        claim_type: &str,
        values: I,
        realms: R,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
        R: IntoIterator<Item = String>,
    {
        if !self.claim_types.iter().any(|t| t == claim_type) {
            self.claim_types.push(claim_type.to_string());
        }
        self.table
            .entry((principal.to_string(), claim_type.to_string()))
            .or_default()
            .push(StaticValue {
                values: values.into_iter().map(Into::into).collect(),
                realms: realms.into_iter().collect(),
            });
        self
    }

    #[must_use]
    pub fn with_supported_realms<I, R>(mut self, realms: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.supported_realms = Some(realms.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_handler_realm(mut self, realm: impl Into<String>) -> Self {
        self.handler_realm = Some(realm.into());
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn from_settings(settings: &[StaticClaimSettings]) -> Self {
        settings.iter().fold(Self::new(), |handler, entry| {
            handler.with_realm_claim(
                &entry.principal,
                &entry.claim_type,
                entry.values.iter().cloned(),
                entry.realms.iter().cloned(),
            )
        })
    }

    fn values_for(&self, principal: &str, claim_type: &str, realm: Option<&str>) -> Vec<String> {
        self.table
            .get(&(principal.to_string(), claim_type.to_string()))
            .into_iter()
            .flatten()
            .filter(|v| {
                v.realms.is_empty() || realm.is_some_and(|r| v.realms.iter().any(|x| x == r))
            })
            .flat_map(|v| v.values.iter().cloned())
            .collect()
    }
}

impl ClaimsHandler for StaticClaimsHandler {
    fn supported_claim_types(&self) -> &[String] {
        &self.claim_types
    }

    fn supported_realms(&self) -> Option<&[String]> {
        self.supported_realms.as_deref()
    }

    fn handler_realm(&self) -> Option<&str> {
        self.handler_realm.as_deref()
    }

    fn retrieve_claim_values(
        &self,
        claims: &ClaimCollection,
        parameters: &ClaimsParameters,
    ) -> StsResult<ProcessedClaimCollection> {
        let Some(principal) = &parameters.principal else {
            return Ok(ProcessedClaimCollection::default());
        };
        let realm = parameters.realm.as_deref();

        let mut resolved = ProcessedClaimCollection::default();
        for claim in claims.iter() {
            let values = self.values_for(principal.name(), &claim.claim_type, realm);
            if values.is_empty() {
                continue;
            }
            let mut processed = ProcessedClaim::new(claim.claim_type.clone(), values);
            processed.issuer = self.issuer.clone();
            resolved.push(processed);
        }
        Ok(resolved)
    }
}
