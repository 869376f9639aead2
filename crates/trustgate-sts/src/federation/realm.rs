use std::collections::HashMap;

use trustgate_config::RealmParserSettings;
use url::Url;

use crate::context::InvocationContext;
use crate::error::StsResult;
use crate::token::SamlAssertion;

/// Resolves the realm an invocation targets.
pub trait RealmParser: Send + Sync {
    fn parse_realm(&self, context: &InvocationContext) -> StsResult<Option<String>>;
}

/// Picks the realm from the request URL: host table first, then path
/// segments, then the default realm.
#[derive(Debug, Clone, Default)]
pub struct UrlRealmParser {
    hosts: HashMap<String, String>,
    segments: HashMap<String, String>,
    default_realm: Option<String>,
}

impl UrlRealmParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, realm: impl Into<String>) -> Self {
        self.hosts.insert(host.into().to_ascii_lowercase(), realm.into());
        self
    }

    #[must_use]
    pub fn with_segment(mut self, segment: impl Into<String>, realm: impl Into<String>) -> Self {
        self.segments.insert(segment.into(), realm.into());
        self
    }

    #[must_use]
    pub fn with_default_realm(mut self, realm: impl Into<String>) -> Self {
        self.default_realm = Some(realm.into());
        self
    }

    #[must_use]
    pub fn from_settings(settings: &RealmParserSettings) -> Self {
        let mut parser = Self::new();
        for (host, realm) in &settings.hosts {
            parser = parser.with_host(host.clone(), realm.clone());
        }
        for (segment, realm) in &settings.segments {
            parser = parser.with_segment(segment.clone(), realm.clone());
        }
        parser.default_realm = settings.default_realm.clone();
        parser
    }

    fn lookup(&self, url: &Url) -> Option<String> {
        if let Some(realm) = url
            .host_str()
            .and_then(|h| self.hosts.get(&h.to_ascii_lowercase()))
        {
            return Some(realm.clone());
        }
        url.path_segments()?
            .find_map(|segment| self.segments.get(segment))
            .cloned()
    }
}

impl RealmParser for UrlRealmParser {
    fn parse_realm(&self, context: &InvocationContext) -> StsResult<Option<String>> {
        let matched = context.request_url().and_then(|raw| match Url::parse(raw) {
            Ok(url) => self.lookup(&url),
            Err(e) => {
                tracing::debug!(url = raw, error = %e, "Request URL not parseable for realm");
                None
            }
        });
        Ok(matched.or_else(|| self.default_realm.clone()))
    }
}

/// Derives the realm a SAML assertion was issued in.
pub trait SamlRealmCodec: Send + Sync {
    fn realm_for(&self, assertion: &SamlAssertion) -> Option<String>;
}

/// Maps assertion issuers to realms.
#[derive(Debug, Clone, Default)]
pub struct IssuerRealmCodec {
    issuers: HashMap<String, String>,
}

impl IssuerRealmCodec {
    #[must_use]
    pub fn new(issuers: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            issuers: issuers.into_iter().collect(),
        }
    }
}

impl SamlRealmCodec for IssuerRealmCodec {
    fn realm_for(&self, assertion: &SamlAssertion) -> Option<String> {
        self.issuers.get(&assertion.issuer).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> UrlRealmParser {
        UrlRealmParser::new()
            .with_segment("realmA", "A")
            .with_segment("realmB", "B")
            .with_host("sts.c.example.com", "C")
            .with_default_realm("A")
    }

    fn realm_of(url: &str) -> Option<String> {
        let ctx = InvocationContext::new().with_request_url(url);
        parser().parse_realm(&ctx).unwrap()
    }

    #[test]
    fn test_segment_realm() {
        assert_eq!(realm_of("https://localhost:8443/sts/realmB/issue").as_deref(), Some("B"));
    }

    #[test]
    fn test_host_realm_wins() {
        assert_eq!(realm_of("https://STS.C.example.com/realmB").as_deref(), Some("C"));
    }

    #[test]
    fn test_default_realm_fallback() {
        assert_eq!(realm_of("https://localhost/other").as_deref(), Some("A"));
        assert_eq!(realm_of("not a url").as_deref(), Some("A"));
        assert_eq!(
            parser().parse_realm(&InvocationContext::new()).unwrap().as_deref(),
            Some("A")
        );
    }

    #[test]
    fn test_no_default_realm() {
        let parser = UrlRealmParser::new().with_segment("realmA", "A");
        let ctx = InvocationContext::new().with_request_url("https://localhost/x");
        assert!(parser.parse_realm(&ctx).unwrap().is_none());
    }
}
