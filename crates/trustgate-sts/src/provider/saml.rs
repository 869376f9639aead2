use std::collections::HashMap;

use super::{
    ProviderRealms, SymmetricKey, TokenProvider, TokenProviderParameters, TokenProviderResponse,
    resolve_public_key,
};
use crate::constants::token_types;
use crate::error::{StsError, StsResult};
use crate::federation::RealmProperties;
use crate::request::KeyType;
use crate::token::saml::{KeyInfo, SubjectConfirmation};
use crate::token::{PresentedToken, SamlAssertion, SamlVersion, TokenElement};

/// Issues SAML 1.1 and 2.0 assertions.
#[derive(Debug, Clone, Default)]
pub struct SamlTokenProvider {
    realms: ProviderRealms,
}

impl SamlTokenProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the provider to `realms`, each with its own issuer and
    /// signing settings.
    #[must_use]
    pub fn with_realms(realms: HashMap<String, RealmProperties>) -> Self {
        Self {
            realms: ProviderRealms::new(realms),
        }
    }

    fn confirmation(
        &self,
        parameters: &TokenProviderParameters<'_>,
    ) -> StsResult<(SubjectConfirmation, Option<SymmetricKey>)> {
        match parameters.key_type {
            KeyType::Bearer => Ok((SubjectConfirmation::bearer(), None)),
            KeyType::PublicKey => {
                let certificate =
                    resolve_public_key(parameters.key_requirements, parameters.context)?;
                Ok((
                    SubjectConfirmation::holder_of_key(KeyInfo::Certificate(certificate)),
                    None,
                ))
            }
            KeyType::SymmetricKey => {
                let key = SymmetricKey::resolve(parameters.key_requirements)?;
                // The proof key is readable by the relying party only when it
                // has an encryption key.
                let encrypted_key = match parameters.encryption.alias.as_deref() {
                    Some(alias) => Some(parameters.properties.crypto.encrypt(
                        alias,
                        &parameters.encryption.algorithm,
                        &parameters.encryption.key_wrap_algorithm,
                        &key.secret,
                    )?),
                    None => None,
                };
                Ok((
                    SubjectConfirmation::holder_of_key(KeyInfo::symmetric(&key.secret, encrypted_key)),
                    Some(key),
                ))
            }
        }
    }
}

impl TokenProvider for SamlTokenProvider {
    fn name(&self) -> &str {
        "saml"
    }

    fn can_handle_token(&self, token_type: &str, realm: Option<&str>) -> bool {
        token_types::is_saml(token_type) && self.realms.accepts(realm)
    }

    fn has_realm(&self, realm: &str) -> bool {
        self.realms.contains(realm)
    }

    fn create_token(&self, parameters: &TokenProviderParameters<'_>) -> StsResult<TokenProviderResponse> {
        let version = SamlVersion::for_token_type(&parameters.token_type)
            .ok_or_else(|| StsError::unknown_token_type(Some(&parameters.token_type)))?;
        let principal = parameters.require_principal()?;
        let realm = parameters.realm.as_deref();
        let realm_properties = self.realms.lookup(parameters.properties, realm);
        let issuer = parameters.properties.issuer_with(realm_properties);
        let lifetime = parameters.resolve_lifetime()?;
        let (confirmation, key) = self.confirmation(parameters)?;

        let password_authenticated = matches!(
            parameters
                .token_requirements
                .delegated_token()
                .map(|t| t.token()),
            Some(PresentedToken::UsernameToken(_))
        );
        let mut builder = SamlAssertion::builder(version, issuer, principal.name())
            .confirmation(confirmation)
            .lifetime(lifetime.created, lifetime.expires)
            .claims(&parameters.claims)
            .authenticated(password_authenticated);
        if let Some(applies_to) = &parameters.applies_to {
            builder = builder.audience(applies_to.clone());
        }
        if !parameters.roles.is_empty() {
            builder = builder.attribute(crate::constants::claims::ROLE, parameters.roles.clone());
        }
        let mut assertion = builder.build();

        if parameters.properties.sign_tokens {
            let (crypto, alias) = parameters.properties.signing_key_with(realm_properties)?;
            assertion.sign(crypto.as_ref(), &alias)?;
        }

        let id = assertion.id.clone();
        let token = TokenElement::Saml(assertion);
        if parameters.properties.cache_issued_tokens {
            parameters.cache(
                &id,
                token.clone(),
                &lifetime,
                key.as_ref().map(|k| k.secret.clone()),
            )?;
        }

        tracing::debug!(
            id = %id,
            version = %version.as_str(),
            issuer,
            confirmation = parameters.key_type.uri(),
            "SAML assertion created"
        );
        let mut response = TokenProviderResponse::new(token, id);
        response.lifetime = Some(lifetime);
        if let Some(key) = key {
            response.key_size = Some(key.key_size);
            response.proof = Some(key.proof);
        }
        Ok(response)
    }
}
