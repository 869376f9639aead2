use std::sync::Arc;

use indexmap::IndexMap;

use super::{
    Claim, ClaimCollection, ClaimsHandler, ClaimsParameters, ClaimsParser, ProcessedClaimCollection,
};
use crate::error::{StsError, StsResult};
use crate::federation::IdentityMapper;

/// Dispatches requested claims to the registered handlers.
///
/// Each claim goes to the first handler, in registration order, that
/// advertises its type and serves the request realm.
pub struct ClaimsManager {
    handlers: Vec<Arc<dyn ClaimsHandler>>,
    parsers: Vec<Arc<dyn ClaimsParser>>,
    identity_mapper: Option<Arc<dyn IdentityMapper>>,
    stop_processing_on_error: bool,
}

impl Default for ClaimsManager {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            parsers: Vec::new(),
            identity_mapper: None,
            stop_processing_on_error: true,
        }
    }
}

impl ClaimsManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ClaimsHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn ClaimsParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    /// Mapper used to move the principal into a handler's own realm.
    #[must_use]
    pub fn with_identity_mapper(mut self, mapper: Arc<dyn IdentityMapper>) -> Self {
        self.identity_mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn stop_processing_on_error(mut self, stop: bool) -> Self {
        self.stop_processing_on_error = stop;
        self
    }

    #[must_use]
    pub fn parser_for(&self, dialect: &str) -> Option<&Arc<dyn ClaimsParser>> {
        self.parsers.iter().find(|p| p.supported_dialect() == dialect)
    }

    #[must_use]
    pub fn supported_claim_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for handler in &self.handlers {
            for claim_type in handler.supported_claim_types() {
                if !types.contains(claim_type) {
                    types.push(claim_type.clone());
                }
            }
        }
        types
    }

    #[must_use]
    pub fn is_supported(&self, claim_type: &str) -> bool {
        self.handlers
            .iter()
            .any(|h| h.supported_claim_types().iter().any(|t| t == claim_type))
    }

    /// Fails if a mandatory claim has no handler at all.
    pub fn check_claims_support(&self, claims: &ClaimCollection) -> StsResult<()> {
        match claims
            .iter()
            .find(|c| !c.optional && !self.is_supported(&c.claim_type))
        {
            Some(claim) => {
                tracing::warn!(claim_type = %claim.claim_type, "Mandatory claim not supported");
                Err(StsError::missing_claim(&claim.claim_type))
            }
            None => Ok(()),
        }
    }

    /// Combines primary and secondary claims. Secondary claims only join when
    /// both collections use the same dialect, and never shadow a primary type.
    #[must_use]
    pub fn merge(
        primary: Option<&ClaimCollection>,
        secondary: Option<&ClaimCollection>,
    ) -> Option<ClaimCollection> {
        match (primary, secondary) {
            (None, None) => None,
            (Some(p), None) => Some(p.clone()),
            (None, Some(s)) => Some(s.clone()),
            (Some(p), Some(s)) => {
                if p.dialect != s.dialect {
                    tracing::debug!(
                        primary = ?p.dialect,
                        secondary = ?s.dialect,
                        "Claims dialects differ, secondary claims ignored"
                    );
                    return Some(p.clone());
                }
                let mut merged = p.clone();
                for claim in s.iter().filter(|c| !p.contains(&c.claim_type)) {
                    merged.push(claim.clone());
                }
                Some(merged)
            }
        }
    }

    fn handler_index(&self, claim: &Claim, realm: Option<&str>) -> Option<usize> {
        self.handlers.iter().position(|h| {
            let serves_realm = match (h.supported_realms(), realm) {
                (None, _) => true,
                (Some(realms), Some(r)) => realms.iter().any(|x| x == r),
                (Some(_), None) => false,
            };
            serves_realm && h.supported_claim_types().iter().any(|t| *t == claim.claim_type)
        })
    }

    /// Parameters for a handler whose directory lives in another realm.
    fn parameters_for(
        &self,
        handler: &dyn ClaimsHandler,
        parameters: &ClaimsParameters,
    ) -> Option<ClaimsParameters> {
        let (Some(handler_realm), Some(realm)) = (handler.handler_realm(), parameters.realm.as_deref())
        else {
            return Some(parameters.clone());
        };
        if handler_realm == realm {
            return Some(parameters.clone());
        }
        let Some(mapper) = &self.identity_mapper else {
            tracing::warn!(
                handler_realm,
                realm,
                "No IdentityMapper to reach claims handler realm, handler skipped"
            );
            return None;
        };
        let principal = parameters
            .principal
            .as_ref()
            .and_then(|p| mapper.map_principal(realm, p, handler_realm));
        if principal.is_none() {
            return None;
        }
        Some(ClaimsParameters {
            principal,
            realm: Some(handler_realm.to_string()),
            ..parameters.clone()
        })
    }

    /// Resolves values for every requested claim.
    pub fn retrieve_claim_values(
        &self,
        requested: &ClaimCollection,
        parameters: &ClaimsParameters,
    ) -> StsResult<ProcessedClaimCollection> {
        if requested.is_empty() {
            return Ok(ProcessedClaimCollection::default());
        }

        let realm = parameters.realm.as_deref();
        let mut groups: IndexMap<usize, ClaimCollection> = IndexMap::new();
        for claim in requested.iter() {
            match self.handler_index(claim, realm) {
                Some(idx) => groups
                    .entry(idx)
                    .or_insert_with(|| ClaimCollection::new(requested.dialect.clone()))
                    .push(claim.clone()),
                None if claim.optional => {
                    tracing::debug!(claim_type = %claim.claim_type, "Optional claim unsupported, dropped");
                }
                None => {
                    tracing::warn!(claim_type = %claim.claim_type, realm = ?realm, "No claims handler for mandatory claim");
                    return Err(StsError::missing_claim(&claim.claim_type));
                }
            }
        }

        let mut resolved = ProcessedClaimCollection::default();
        for (idx, claims) in groups {
            let handler = &self.handlers[idx];
            let Some(handler_params) = self.parameters_for(handler.as_ref(), parameters) else {
                continue;
            };
            match handler.retrieve_claim_values(&claims, &handler_params) {
                Ok(values) => resolved.extend(values),
                Err(e) if self.stop_processing_on_error => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Claims handler failed, continuing");
                }
            }
        }

        Self::validate_claim_values(requested, &resolved)?;
        Ok(resolved)
    }

    /// Every mandatory claim must have at least one value.
    pub fn validate_claim_values(
        requested: &ClaimCollection,
        resolved: &ProcessedClaimCollection,
    ) -> StsResult<()> {
        for claim in requested.iter().filter(|c| !c.optional) {
            let present = resolved
                .get(&claim.claim_type)
                .is_some_and(|c| !c.values.is_empty());
            if !present {
                tracing::warn!(claim_type = %claim.claim_type, "Mandatory claim has no value");
                return Err(StsError::missing_claim(&claim.claim_type));
            }
        }
        Ok(())
    }
}
