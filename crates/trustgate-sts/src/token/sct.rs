use std::fmt::Write as _;

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

const WSC_NS: &str = "http://docs.oasis-open.org/ws-sx/ws-secureconversation/200512";
pub(crate) const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// Security Context Token: an opaque handle whose state lives in the token
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityContextToken {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// `wsu:Id` used by attached references.
    pub wsu_id: String,
}

impl SecurityContextToken {
    #[must_use]
    pub fn new() -> Self {
        Self::with_identifier(format!("urn:uuid:{}", uuid::Uuid::new_v4()))
    }

    #[must_use]
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            instance: None,
            wsu_id: format!("sctId-{}", uuid::Uuid::new_v4().simple()),
        }
    }

    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        let _ = write!(
            xml,
            r#"<wsc:SecurityContextToken xmlns:wsc="{WSC_NS}" xmlns:wsu="{WSU_NS}" wsu:Id="{}"><wsc:Identifier>{}</wsc:Identifier>"#,
            escape(&self.wsu_id),
            escape(&self.identifier)
        );
        if let Some(instance) = &self.instance {
            let _ = write!(xml, "<wsc:Instance>{}</wsc:Instance>", escape(instance));
        }
        xml.push_str("</wsc:SecurityContextToken>");
        xml
    }
}

impl Default for SecurityContextToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_unique_urns() {
        let a = SecurityContextToken::new();
        let b = SecurityContextToken::new();
        assert!(a.identifier.starts_with("urn:uuid:"));
        assert_ne!(a.identifier, b.identifier);
    }

    #[test]
    fn test_xml() {
        let sct = SecurityContextToken::with_identifier("urn:uuid:1234");
        let xml = sct.to_xml();
        assert!(xml.contains("<wsc:Identifier>urn:uuid:1234</wsc:Identifier>"));
        assert!(!xml.contains("Instance"));
    }
}
