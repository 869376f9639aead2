use std::fmt::Write as _;

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use super::{SamlAssertion, SecurityContextToken};
use crate::constants::token_types;
use crate::crypto::{Crypto, EncryptedPayload};
use crate::encoding;
use crate::error::{StsError, StsResult};

const XENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";
const XENC_ELEMENT: &str = "http://www.w3.org/2001/04/xmlenc#Element";
const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// An issued token encrypted for the relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub id: String,
    pub key_identifier_type: Option<String>,
    pub payload: EncryptedPayload,
}

impl EncryptedData {
    /// Encrypts `element` for `alias`.
    pub fn encrypt(
        crypto: &dyn Crypto,
        element: &TokenElement,
        alias: &str,
        algorithm: &str,
        key_wrap_algorithm: &str,
        key_identifier_type: Option<&str>,
    ) -> StsResult<Self> {
        if matches!(element, TokenElement::Encrypted(_)) {
            return Err(StsError::crypto("token element is already encrypted"));
        }
        let plaintext = serde_json::to_vec(element)
            .map_err(|e| StsError::crypto(format!("cannot serialize token element: {e}")))?;
        let payload = crypto.encrypt(alias, algorithm, key_wrap_algorithm, &plaintext)?;
        Ok(Self {
            id: format!("ED-{}", uuid::Uuid::new_v4().simple()),
            key_identifier_type: key_identifier_type.map(str::to_string),
            payload,
        })
    }

    /// Recovers the plaintext token element.
    pub fn decrypt(&self, crypto: &dyn Crypto) -> StsResult<TokenElement> {
        let plaintext = crypto.decrypt(&self.payload)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| StsError::crypto(format!("decrypted token element is malformed: {e}")))
    }

    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        let _ = write!(
            xml,
            r#"<xenc:EncryptedData xmlns:xenc="{XENC_NS}" Id="{}" Type="{XENC_ELEMENT}"><xenc:EncryptionMethod Algorithm="{}"/>"#,
            escape(&self.id),
            escape(&self.payload.algorithm)
        );
        let _ = write!(
            xml,
            r#"<ds:KeyInfo xmlns:ds="{DS_NS}"><xenc:EncryptedKey><xenc:EncryptionMethod Algorithm="{}"/>"#,
            escape(&self.payload.key_wrap_algorithm)
        );
        match &self.key_identifier_type {
            Some(value_type) => {
                let _ = write!(
                    xml,
                    r#"<ds:KeyInfo><wsse:SecurityTokenReference xmlns:wsse="{WSSE_NS}"><wsse:KeyIdentifier ValueType="{}">{}</wsse:KeyIdentifier></wsse:SecurityTokenReference></ds:KeyInfo>"#,
                    escape(value_type),
                    escape(&self.payload.recipient_alias)
                );
            }
            None => {
                let _ = write!(
                    xml,
                    "<ds:KeyInfo><ds:KeyName>{}</ds:KeyName></ds:KeyInfo>",
                    escape(&self.payload.recipient_alias)
                );
            }
        }
        let _ = write!(
            xml,
            "<xenc:CipherData><xenc:CipherValue>{}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedKey></ds:KeyInfo>",
            encoding::encode(&self.payload.wrapped_key)
        );
        let mut cipher = self.payload.nonce.clone();
        cipher.extend_from_slice(&self.payload.ciphertext);
        let _ = write!(
            xml,
            "<xenc:CipherData><xenc:CipherValue>{}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>",
            encoding::encode(&cipher)
        );
        xml
    }
}

/// The content of `RequestedSecurityToken`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenElement {
    Saml(SamlAssertion),
    Jwt(String),
    SecurityContext(SecurityContextToken),
    Encrypted(EncryptedData),
}

impl TokenElement {
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }

    #[must_use]
    pub fn as_saml(&self) -> Option<&SamlAssertion> {
        match self {
            Self::Saml(assertion) => Some(assertion),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_jwt(&self) -> Option<&str> {
        match self {
            Self::Jwt(token) => Some(token),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sct(&self) -> Option<&SecurityContextToken> {
        match self {
            Self::SecurityContext(sct) => Some(sct),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_xml(&self) -> String {
        match self {
            Self::Saml(assertion) => assertion.to_xml(),
            Self::Jwt(token) => format!(
                r#"<wsse:BinarySecurityToken xmlns:wsse="{WSSE_NS}" ValueType="{}" EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</wsse:BinarySecurityToken>"#,
                token_types::JWT,
                encoding::encode(token.as_bytes())
            ),
            Self::SecurityContext(sct) => sct.to_xml(),
            Self::Encrypted(data) => data.to_xml(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::algorithms;
    use crate::crypto::SymmetricKeyStore;
    use crate::token::SamlVersion;

    #[test]
    fn test_encrypted_element_hides_plaintext() {
        let crypto = SymmetricKeyStore::new().with_entry("service", vec![3u8; 32], "CN=service");
        let assertion = SamlAssertion::builder(SamlVersion::V2_0, "sts", "alice")
            .attribute("urn:surname", vec!["doe".to_string()])
            .build();
        let element = TokenElement::Saml(assertion);

        let encrypted = EncryptedData::encrypt(
            &crypto,
            &element,
            "service",
            algorithms::AES256_GCM,
            algorithms::RSA_OAEP_MGF1P,
            None,
        )
        .unwrap();
        let xml = TokenElement::Encrypted(encrypted.clone()).to_xml();
        assert!(xml.contains("xenc:EncryptedData"));
        assert!(!xml.contains("alice"));
        assert!(!xml.contains("doe"));

        assert_eq!(encrypted.decrypt(&crypto).unwrap(), element);
    }

    #[test]
    fn test_jwt_wrapped_in_binary_security_token() {
        let xml = TokenElement::Jwt("a.b.c".to_string()).to_xml();
        assert!(xml.starts_with("<wsse:BinarySecurityToken"));
        assert!(xml.contains(token_types::JWT));
    }
}
