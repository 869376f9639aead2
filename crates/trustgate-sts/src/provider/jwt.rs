use std::collections::HashMap;
use std::sync::Arc;

use super::{ProviderRealms, TokenProvider, TokenProviderParameters, TokenProviderResponse};
use crate::constants::token_types;
use crate::error::StsResult;
use crate::federation::RealmProperties;
use crate::token::TokenElement;
use crate::token::jwt::{JwtClaims, JwtService};

/// Issues JWTs. JWTs carry no proof key, every token is a bearer token.
#[derive(Debug, Clone)]
pub struct JwtTokenProvider {
    service: Arc<JwtService>,
    realms: ProviderRealms,
}

impl JwtTokenProvider {
    #[must_use]
    pub fn new(service: Arc<JwtService>) -> Self {
        Self {
            service,
            realms: ProviderRealms::default(),
        }
    }

    #[must_use]
    pub fn with_realms(mut self, realms: HashMap<String, RealmProperties>) -> Self {
        self.realms = ProviderRealms::new(realms);
        self
    }
}

impl TokenProvider for JwtTokenProvider {
    fn name(&self) -> &str {
        "jwt"
    }

    fn can_handle_token(&self, token_type: &str, realm: Option<&str>) -> bool {
        token_type == token_types::JWT && self.realms.accepts(realm)
    }

    fn has_realm(&self, realm: &str) -> bool {
        self.realms.contains(realm)
    }

    fn create_token(&self, parameters: &TokenProviderParameters<'_>) -> StsResult<TokenProviderResponse> {
        let principal = parameters.require_principal()?;
        let lifetime = parameters.resolve_lifetime()?;
        let realm_properties = self.realms.lookup(parameters.properties, parameters.realm.as_deref());
        let issuer = parameters.properties.issuer_with(realm_properties);

        let mut builder = JwtClaims::builder(issuer, principal.name())
            .lifetime(lifetime.created, lifetime.expires)
            .claims(&parameters.claims);
        if let Some(applies_to) = &parameters.applies_to {
            builder = builder.audience(applies_to.clone());
        }
        let claims = builder.build();
        let jwt = self.service.encode(&claims)?;

        let token = TokenElement::Jwt(jwt);
        if parameters.properties.cache_issued_tokens {
            parameters.cache(&claims.jti, token.clone(), &lifetime, None)?;
        }
        tracing::debug!(
            jti = %claims.jti,
            issuer,
            kid = self.service.current_kid(),
            "JWT created"
        );

        let mut response = TokenProviderResponse::new(token, claims.jti);
        response.lifetime = Some(lifetime);
        Ok(response)
    }
}
