//! Invocation context supplied by the transport binding.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::X509Certificate;
use crate::token::saml::SamlAssertion;

/// Transport attribute holding the full request URL.
pub const ATTR_REQUEST_URL: &str = "request.url";
/// Transport attribute holding the URL scheme (`http`, `https`).
pub const ATTR_SCHEME: &str = "request.scheme";
pub const ATTR_REMOTE_ADDR: &str = "request.remote_addr";

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A credential the caller demonstrably holds, e.g. the key that signed the
/// request message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofCredential {
    Certificate(X509Certificate),
    SymmetricKey(Vec<u8>),
}

/// What the binding knows about the caller of one operation.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    principal: Option<Principal>,
    roles: Vec<String>,
    attributes: HashMap<String, String>,
    tls_certificates: Vec<X509Certificate>,
    proof_credentials: Vec<ProofCredential>,
    message_assertion: Option<SamlAssertion>,
}

impl InvocationContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets the request URL and derives the scheme attribute from it.
    #[must_use]
    pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if let Some((scheme, _)) = url.split_once("://") {
            self.attributes
                .insert(ATTR_SCHEME.to_string(), scheme.to_ascii_lowercase());
        }
        self.attributes.insert(ATTR_REQUEST_URL.to_string(), url);
        self
    }

    #[must_use]
    pub fn with_tls_certificate(mut self, certificate: X509Certificate) -> Self {
        self.tls_certificates.push(certificate);
        self
    }

    #[must_use]
    pub fn with_proof_credential(mut self, credential: ProofCredential) -> Self {
        self.proof_credentials.push(credential);
        self
    }

    /// A SAML assertion carried in the message security header.
    #[must_use]
    pub fn with_message_assertion(mut self, assertion: SamlAssertion) -> Self {
        self.message_assertion = Some(assertion);
        self
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn request_url(&self) -> Option<&str> {
        self.attribute(ATTR_REQUEST_URL)
    }

    #[must_use]
    pub fn tls_certificates(&self) -> &[X509Certificate] {
        &self.tls_certificates
    }

    #[must_use]
    pub fn message_assertion(&self) -> Option<&SamlAssertion> {
        self.message_assertion.as_ref()
    }

    /// Returns `true` if the caller presented `certificate` over TLS or used
    /// its key to sign the request.
    #[must_use]
    pub fn proves_certificate(&self, certificate: &X509Certificate) -> bool {
        let fingerprint = certificate.fingerprint();
        self.tls_certificates
            .iter()
            .any(|c| c.fingerprint() == fingerprint)
            || self.proof_credentials.iter().any(|p| match p {
                ProofCredential::Certificate(c) => c.fingerprint() == fingerprint,
                ProofCredential::SymmetricKey(_) => false,
            })
    }

    /// Returns `true` if the caller used `secret` to sign the request.
    #[must_use]
    pub fn proves_secret(&self, secret: &[u8]) -> bool {
        let expected = Sha256::digest(secret);
        self.proof_credentials.iter().any(|p| match p {
            ProofCredential::SymmetricKey(key) => Sha256::digest(key) == expected,
            ProofCredential::Certificate(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_sets_scheme() {
        let ctx = InvocationContext::new().with_request_url("HTTPS://sts.example.com/realmA/sts");
        assert_eq!(ctx.attribute(ATTR_SCHEME), Some("https"));
        assert_eq!(ctx.request_url(), Some("HTTPS://sts.example.com/realmA/sts"));
    }

    #[test]
    fn test_proves_secret() {
        let ctx = InvocationContext::new()
            .with_proof_credential(ProofCredential::SymmetricKey(vec![1, 2, 3]));
        assert!(ctx.proves_secret(&[1, 2, 3]));
        assert!(!ctx.proves_secret(&[3, 2, 1]));
    }

    #[test]
    fn test_proves_certificate() {
        let cert = X509Certificate::self_issued("CN=alice", vec![9; 32]);
        let other = X509Certificate::self_issued("CN=bob", vec![8; 32]);
        let ctx = InvocationContext::new().with_tls_certificate(cert.clone());
        assert!(ctx.proves_certificate(&cert));
        assert!(!ctx.proves_certificate(&other));
    }
}
