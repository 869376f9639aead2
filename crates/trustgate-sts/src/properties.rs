//! Immutable issuance settings shared by every operation and plugin.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::crypto::Crypto;
use crate::error::{StsError, StsResult};
use crate::federation::RealmProperties;
use crate::lifetime::LifetimePolicy;
use crate::service::EncryptionProperties;

#[derive(Clone)]
pub struct StsProperties {
    pub issuer: String,
    pub crypto: Arc<dyn Crypto>,
    /// Signing key alias. Falls back to the crypto default alias.
    pub signature_alias: Option<String>,
    pub sign_tokens: bool,
    pub encrypt_issued_token: bool,
    pub encryption: EncryptionProperties,
    pub lifetime: LifetimePolicy,
    pub realms: HashMap<String, RealmProperties>,
    pub return_references: bool,
    pub include_lifetime: bool,
    pub cache_issued_tokens: bool,
}

impl StsProperties {
    #[must_use]
    pub fn new(issuer: impl Into<String>, crypto: Arc<dyn Crypto>) -> Self {
        Self {
            issuer: issuer.into(),
            crypto,
            signature_alias: None,
            sign_tokens: true,
            encrypt_issued_token: false,
            encryption: EncryptionProperties::default(),
            lifetime: LifetimePolicy::default(),
            realms: HashMap::new(),
            return_references: true,
            include_lifetime: true,
            cache_issued_tokens: true,
        }
    }

    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>, properties: RealmProperties) -> Self {
        self.realms.insert(realm.into(), properties);
        self
    }

    #[must_use]
    pub fn realm(&self, realm: Option<&str>) -> Option<&RealmProperties> {
        realm.and_then(|r| self.realms.get(r))
    }

    /// Issuer name for tokens issued in `realm`.
    #[must_use]
    pub fn issuer_for(&self, realm: Option<&str>) -> &str {
        self.issuer_with(self.realm(realm))
    }

    #[must_use]
    pub fn issuer_with<'a>(&'a self, realm: Option<&'a RealmProperties>) -> &'a str {
        realm
            .and_then(|r| r.issuer.as_deref())
            .unwrap_or(&self.issuer)
    }

    /// Crypto and key alias used to sign tokens issued in `realm`.
    pub fn signing_key_for(&self, realm: Option<&str>) -> StsResult<(Arc<dyn Crypto>, String)> {
        self.signing_key_with(self.realm(realm))
    }

    pub fn signing_key_with(
        &self,
        realm: Option<&RealmProperties>,
    ) -> StsResult<(Arc<dyn Crypto>, String)> {
        let crypto = realm
            .and_then(|r| r.signature_crypto.clone())
            .unwrap_or_else(|| Arc::clone(&self.crypto));
        let alias = realm
            .and_then(|r| r.signature_alias.clone())
            .or_else(|| self.signature_alias.clone())
            .or_else(|| crypto.default_alias().map(str::to_string))
            .ok_or_else(|| StsError::configuration("no signature alias configured"))?;
        Ok((crypto, alias))
    }
}

impl fmt::Debug for StsProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsProperties")
            .field("issuer", &self.issuer)
            .field("signature_alias", &self.signature_alias)
            .field("sign_tokens", &self.sign_tokens)
            .field("encrypt_issued_token", &self.encrypt_issued_token)
            .field("encryption", &self.encryption)
            .field("lifetime", &self.lifetime)
            .field("realms", &self.realms.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SymmetricKeyStore;

    fn properties() -> StsProperties {
        let crypto = SymmetricKeyStore::new()
            .with_entry("sts", vec![1; 32], "CN=sts")
            .with_entry("realm-b", vec![2; 32], "CN=b");
        StsProperties::new("default-issuer", Arc::new(crypto))
            .with_realm("A", RealmProperties::with_issuer("issuer-a"))
            .with_realm("B", RealmProperties::with_issuer("issuer-b").signature_alias("realm-b"))
    }

    #[test]
    fn test_issuer_by_realm() {
        let props = properties();
        assert_eq!(props.issuer_for(Some("A")), "issuer-a");
        assert_eq!(props.issuer_for(Some("C")), "default-issuer");
        assert_eq!(props.issuer_for(None), "default-issuer");
    }

    #[test]
    fn test_signing_alias_by_realm() {
        let props = properties();
        assert_eq!(props.signing_key_for(Some("B")).unwrap().1, "realm-b");
        assert_eq!(props.signing_key_for(Some("A")).unwrap().1, "sts");
    }

    #[test]
    fn test_missing_alias_is_configuration_error() {
        let props = StsProperties::new("x", Arc::new(SymmetricKeyStore::new()));
        assert!(matches!(
            props.signing_key_for(None),
            Err(StsError::Configuration { .. })
        ));
    }
}
