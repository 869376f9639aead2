use std::fmt::Write as _;

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::constants::{references, token_types};

const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const WSSE11_NS: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// `wsse:KeyIdentifier` naming the token by id.
    KeyIdentifier { value_type: String, value: String },
    /// `wsse:Reference` by URI.
    Direct { uri: String, value_type: Option<String> },
}

/// A `wsse:SecurityTokenReference` returned as attached or unattached
/// reference to an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReference {
    pub token_type: String,
    pub kind: ReferenceKind,
}

impl TokenReference {
    /// SAML tokens are referenced by key identifier; everything else by
    /// direct reference, fragment-prefixed when the token is attached.
    #[must_use]
    pub fn for_token(token_type: &str, id: &str, attached: bool) -> Self {
        let kind = if token_types::is_saml(token_type) {
            let value_type = if token_types::is_saml2(token_type) {
                references::SAML2_KEY_IDENTIFIER
            } else {
                references::SAML1_KEY_IDENTIFIER
            };
            ReferenceKind::KeyIdentifier {
                value_type: value_type.to_string(),
                value: id.to_string(),
            }
        } else {
            let uri = if attached {
                format!("#{id}")
            } else {
                id.to_string()
            };
            ReferenceKind::Direct {
                uri,
                value_type: Some(token_type.to_string()),
            }
        };
        Self {
            token_type: token_type.to_string(),
            kind,
        }
    }

    /// The referenced id with any `#` stripped.
    #[must_use]
    pub fn referenced_id(&self) -> &str {
        match &self.kind {
            ReferenceKind::KeyIdentifier { value, .. } => value,
            ReferenceKind::Direct { uri, .. } => uri.strip_prefix('#').unwrap_or(uri),
        }
    }

    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        let _ = write!(
            xml,
            r#"<wsse:SecurityTokenReference xmlns:wsse="{WSSE_NS}" xmlns:wsse11="{WSSE11_NS}" wsse11:TokenType="{}">"#,
            escape(&self.token_type)
        );
        match &self.kind {
            ReferenceKind::KeyIdentifier { value_type, value } => {
                let _ = write!(
                    xml,
                    r#"<wsse:KeyIdentifier ValueType="{}">{}</wsse:KeyIdentifier>"#,
                    escape(value_type),
                    escape(value)
                );
            }
            ReferenceKind::Direct { uri, value_type } => {
                let _ = write!(xml, r#"<wsse:Reference URI="{}""#, escape(uri));
                if let Some(value_type) = value_type {
                    let _ = write!(xml, r#" ValueType="{}""#, escape(value_type));
                }
                xml.push_str("/>");
            }
        }
        xml.push_str("</wsse:SecurityTokenReference>");
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saml_uses_key_identifier() {
        let reference = TokenReference::for_token(token_types::SAML_2_0, "_abc", true);
        assert_eq!(
            reference.kind,
            ReferenceKind::KeyIdentifier {
                value_type: references::SAML2_KEY_IDENTIFIER.to_string(),
                value: "_abc".to_string(),
            }
        );
        let saml1 = TokenReference::for_token(token_types::SAML_1_1, "_abc", false);
        assert!(saml1.to_xml().contains(references::SAML1_KEY_IDENTIFIER));
    }

    #[test]
    fn test_attached_direct_reference_is_fragment() {
        let attached = TokenReference::for_token(token_types::SCT, "sctId-1", true);
        let unattached = TokenReference::for_token(token_types::SCT, "urn:uuid:1", false);
        assert!(attached.to_xml().contains(r##"URI="#sctId-1""##));
        assert_eq!(attached.referenced_id(), "sctId-1");
        assert_eq!(unattached.referenced_id(), "urn:uuid:1");
    }
}
