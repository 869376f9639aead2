//! SAML 1.1 and 2.0 assertion model.
//!
//! The model carries exactly what the engine inspects: subject, confirmation,
//! conditions, attributes, authentication statement and signature. XML output
//! is produced by hand with escaped text; the signature covers the unsigned
//! serialization.

use std::fmt::Write as _;

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::claims::{ProcessedClaim, ProcessedClaimCollection};
use crate::constants::{algorithms, confirmation, token_types};
use crate::crypto::{Crypto, EncryptedPayload, X509Certificate};
use crate::encoding;
use crate::error::{StsError, StsResult};

const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const XENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";
const AUTHN_PASSWORD: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:Password";
const AUTHN_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:unspecified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamlVersion {
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "2.0")]
    V2_0,
}

impl SamlVersion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_1 => "1.1",
            Self::V2_0 => "2.0",
        }
    }

    #[must_use]
    pub fn token_type(self) -> &'static str {
        match self {
            Self::V1_1 => token_types::SAML_1_1,
            Self::V2_0 => token_types::SAML_2_0,
        }
    }

    /// Version matching a SAML token type URI.
    #[must_use]
    pub fn for_token_type(token_type: &str) -> Option<Self> {
        if token_types::is_saml2(token_type) {
            Some(Self::V2_0)
        } else if token_types::is_saml1(token_type) {
            Some(Self::V1_1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationMethod {
    Bearer,
    HolderOfKey,
    SenderVouches,
}

impl ConfirmationMethod {
    /// Method identifier for the given SAML version.
    #[must_use]
    pub fn uri(self, version: SamlVersion) -> &'static str {
        match (version, self) {
            (SamlVersion::V1_1, Self::Bearer) => confirmation::SAML1_BEARER,
            (SamlVersion::V1_1, Self::HolderOfKey) => confirmation::SAML1_HOLDER_OF_KEY,
            (SamlVersion::V1_1, Self::SenderVouches) => confirmation::SAML1_SENDER_VOUCHES,
            (SamlVersion::V2_0, Self::Bearer) => confirmation::SAML2_BEARER,
            (SamlVersion::V2_0, Self::HolderOfKey) => confirmation::SAML2_HOLDER_OF_KEY,
            (SamlVersion::V2_0, Self::SenderVouches) => confirmation::SAML2_SENDER_VOUCHES,
        }
    }

    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            confirmation::SAML1_BEARER | confirmation::SAML2_BEARER => Some(Self::Bearer),
            confirmation::SAML1_HOLDER_OF_KEY | confirmation::SAML2_HOLDER_OF_KEY => {
                Some(Self::HolderOfKey)
            }
            confirmation::SAML1_SENDER_VOUCHES | confirmation::SAML2_SENDER_VOUCHES => {
                Some(Self::SenderVouches)
            }
            _ => None,
        }
    }
}

/// Key a holder-of-key assertion is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyInfo {
    /// Client public key.
    Certificate(X509Certificate),
    /// Symmetric proof key, identified by its SHA-256 and optionally encrypted
    /// for the relying party.
    Symmetric {
        key_sha256: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encrypted_key: Option<EncryptedPayload>,
    },
}

impl KeyInfo {
    #[must_use]
    pub fn symmetric(secret: &[u8], encrypted_key: Option<EncryptedPayload>) -> Self {
        use sha2::{Digest, Sha256};
        Self::Symmetric {
            key_sha256: hex::encode(Sha256::digest(secret)),
            encrypted_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    pub method: ConfirmationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_info: Option<KeyInfo>,
}

impl SubjectConfirmation {
    #[must_use]
    pub fn bearer() -> Self {
        Self {
            method: ConfirmationMethod::Bearer,
            key_info: None,
        }
    }

    #[must_use]
    pub fn holder_of_key(key_info: KeyInfo) -> Self {
        Self {
            method: ConfirmationMethod::HolderOfKey,
            key_info: Some(key_info),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlSubject {
    pub name_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,
    pub confirmation: SubjectConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_on_or_after: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlAttribute {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    #[serde(with = "time::serde::rfc3339")]
    pub authn_instant: OffsetDateTime,
    pub context_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionSignature {
    pub key_alias: String,
    pub algorithm: String,
    #[serde(with = "encoding::base64_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlAssertion {
    pub id: String,
    pub version: SamlVersion,
    pub issuer: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issue_instant: OffsetDateTime,
    pub subject: SamlSubject,
    pub conditions: Conditions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<SamlAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authn_statement: Option<AuthnStatement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<AssertionSignature>,
}

impl SamlAssertion {
    #[must_use]
    pub fn builder(
        version: SamlVersion,
        issuer: impl Into<String>,
        name_id: impl Into<String>,
    ) -> SamlAssertionBuilder {
        SamlAssertionBuilder::new(version, issuer, name_id)
    }

    #[must_use]
    pub fn confirmation_method(&self) -> ConfirmationMethod {
        self.subject.confirmation.method
    }

    #[must_use]
    pub fn confirmation_method_uri(&self) -> &'static str {
        self.confirmation_method().uri(self.version)
    }

    #[must_use]
    pub fn is_holder_of_key(&self) -> bool {
        self.confirmation_method() == ConfirmationMethod::HolderOfKey
    }

    #[must_use]
    pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
        instant >= self.conditions.not_on_or_after
    }

    /// Returns `true` if `NotBefore` is still ahead of `instant` beyond `skew`.
    #[must_use]
    pub fn is_not_yet_valid_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
        self.conditions.not_before > instant + skew
    }

    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Embedded attributes as claims issued by this assertion's issuer.
    #[must_use]
    pub fn claims(&self) -> ProcessedClaimCollection {
        self.attributes
            .iter()
            .map(|a| ProcessedClaim::new(a.name.clone(), a.values.clone()).with_issuer(&self.issuer))
            .collect()
    }

    /// Attribute values named `name`.
    #[must_use]
    pub fn attribute_values(&self, name: &str) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|a| a.name == name)
            .flat_map(|a| a.values.iter().cloned())
            .collect()
    }

    /// The bytes a signature covers.
    #[must_use]
    pub fn signing_input(&self) -> Vec<u8> {
        self.render(false).into_bytes()
    }

    /// Signs the assertion, replacing any existing signature.
    pub fn sign(&mut self, crypto: &dyn Crypto, alias: &str) -> StsResult<()> {
        self.signature = None;
        let value = crypto.sign(alias, &self.signing_input())?;
        self.signature = Some(AssertionSignature {
            key_alias: alias.to_string(),
            algorithm: algorithms::HMAC_SHA256.to_string(),
            value,
        });
        Ok(())
    }

    /// Verifies the signature. An unsigned assertion does not verify.
    pub fn verify_signature(&self, crypto: &dyn Crypto) -> StsResult<bool> {
        let Some(signature) = &self.signature else {
            return Ok(false);
        };
        if crypto.certificate(&signature.key_alias).is_none() {
            return Err(StsError::invalid_security_token(format!(
                "assertion signed by unknown key {}",
                signature.key_alias
            )));
        }
        crypto.verify(&signature.key_alias, &self.signing_input(), &signature.value)
    }

    #[must_use]
    pub fn to_xml(&self) -> String {
        self.render(true)
    }

    fn render(&self, with_signature: bool) -> String {
        match self.version {
            SamlVersion::V2_0 => self.render_v2(with_signature),
            SamlVersion::V1_1 => self.render_v1(with_signature),
        }
    }

    fn render_v2(&self, with_signature: bool) -> String {
        let mut xml = String::new();
        let _ = write!(
            xml,
            r#"<saml2:Assertion xmlns:saml2="{}" ID="{}" IssueInstant="{}" Version="2.0">"#,
            token_types::SAML_2_NS,
            escape(&self.id),
            encoding::rfc3339(self.issue_instant)
        );
        let _ = write!(xml, "<saml2:Issuer>{}</saml2:Issuer>", escape(&self.issuer));
        if with_signature {
            render_signature(&mut xml, self.signature.as_ref());
        }

        xml.push_str("<saml2:Subject>");
        match &self.subject.name_format {
            Some(format) => {
                let _ = write!(
                    xml,
                    r#"<saml2:NameID Format="{}">{}</saml2:NameID>"#,
                    escape(format),
                    escape(&self.subject.name_id)
                );
            }
            None => {
                let _ = write!(xml, "<saml2:NameID>{}</saml2:NameID>", escape(&self.subject.name_id));
            }
        }
        let _ = write!(
            xml,
            r#"<saml2:SubjectConfirmation Method="{}">"#,
            self.confirmation_method_uri()
        );
        if let Some(key_info) = &self.subject.confirmation.key_info {
            xml.push_str("<saml2:SubjectConfirmationData>");
            render_key_info(&mut xml, key_info);
            xml.push_str("</saml2:SubjectConfirmationData>");
        }
        xml.push_str("</saml2:SubjectConfirmation></saml2:Subject>");

        let _ = write!(
            xml,
            r#"<saml2:Conditions NotBefore="{}" NotOnOrAfter="{}">"#,
            encoding::rfc3339(self.conditions.not_before),
            encoding::rfc3339(self.conditions.not_on_or_after)
        );
        if !self.conditions.audiences.is_empty() {
            xml.push_str("<saml2:AudienceRestriction>");
            for audience in &self.conditions.audiences {
                let _ = write!(xml, "<saml2:Audience>{}</saml2:Audience>", escape(audience));
            }
            xml.push_str("</saml2:AudienceRestriction>");
        }
        xml.push_str("</saml2:Conditions>");

        if !self.attributes.is_empty() {
            xml.push_str("<saml2:AttributeStatement>");
            for attribute in &self.attributes {
                let _ = write!(xml, r#"<saml2:Attribute Name="{}""#, escape(&attribute.name));
                if let Some(format) = &attribute.name_format {
                    let _ = write!(xml, r#" NameFormat="{}""#, escape(format));
                }
                xml.push('>');
                for value in &attribute.values {
                    let _ = write!(
                        xml,
                        "<saml2:AttributeValue>{}</saml2:AttributeValue>",
                        escape(value)
                    );
                }
                xml.push_str("</saml2:Attribute>");
            }
            xml.push_str("</saml2:AttributeStatement>");
        }

        if let Some(authn) = &self.authn_statement {
            let _ = write!(
                xml,
                r#"<saml2:AuthnStatement AuthnInstant="{}"><saml2:AuthnContext><saml2:AuthnContextClassRef>{}</saml2:AuthnContextClassRef></saml2:AuthnContext></saml2:AuthnStatement>"#,
                encoding::rfc3339(authn.authn_instant),
                escape(&authn.context_class)
            );
        }
        xml.push_str("</saml2:Assertion>");
        xml
    }

    fn render_v1_subject(&self, xml: &mut String) {
        xml.push_str("<saml1:Subject>");
        let _ = write!(
            xml,
            "<saml1:NameIdentifier>{}</saml1:NameIdentifier>",
            escape(&self.subject.name_id)
        );
        let _ = write!(
            xml,
            "<saml1:SubjectConfirmation><saml1:ConfirmationMethod>{}</saml1:ConfirmationMethod>",
            self.confirmation_method_uri()
        );
        if let Some(key_info) = &self.subject.confirmation.key_info {
            render_key_info(xml, key_info);
        }
        xml.push_str("</saml1:SubjectConfirmation></saml1:Subject>");
    }

    fn render_v1(&self, with_signature: bool) -> String {
        let mut xml = String::new();
        let _ = write!(
            xml,
            r#"<saml1:Assertion xmlns:saml1="{}" AssertionID="{}" IssueInstant="{}" Issuer="{}" MajorVersion="1" MinorVersion="1">"#,
            token_types::SAML_1_NS,
            escape(&self.id),
            encoding::rfc3339(self.issue_instant),
            escape(&self.issuer)
        );

        let _ = write!(
            xml,
            r#"<saml1:Conditions NotBefore="{}" NotOnOrAfter="{}">"#,
            encoding::rfc3339(self.conditions.not_before),
            encoding::rfc3339(self.conditions.not_on_or_after)
        );
        if !self.conditions.audiences.is_empty() {
            xml.push_str("<saml1:AudienceRestrictionCondition>");
            for audience in &self.conditions.audiences {
                let _ = write!(xml, "<saml1:Audience>{}</saml1:Audience>", escape(audience));
            }
            xml.push_str("</saml1:AudienceRestrictionCondition>");
        }
        xml.push_str("</saml1:Conditions>");

        if let Some(authn) = &self.authn_statement {
            let _ = write!(
                xml,
                r#"<saml1:AuthenticationStatement AuthenticationInstant="{}" AuthenticationMethod="{}">"#,
                encoding::rfc3339(authn.authn_instant),
                escape(&authn.context_class)
            );
            self.render_v1_subject(&mut xml);
            xml.push_str("</saml1:AuthenticationStatement>");
        }

        // SAML 1.1 subjects live inside statements
        if !self.attributes.is_empty() || self.authn_statement.is_none() {
            xml.push_str("<saml1:AttributeStatement>");
            self.render_v1_subject(&mut xml);
            for attribute in &self.attributes {
                let _ = write!(
                    xml,
                    r#"<saml1:Attribute AttributeName="{}" AttributeNamespace="{}">"#,
                    escape(&attribute.name),
                    escape(attribute.name_format.as_deref().unwrap_or(""))
                );
                for value in &attribute.values {
                    let _ = write!(
                        xml,
                        "<saml1:AttributeValue>{}</saml1:AttributeValue>",
                        escape(value)
                    );
                }
                xml.push_str("</saml1:Attribute>");
            }
            xml.push_str("</saml1:AttributeStatement>");
        }

        if with_signature {
            render_signature(&mut xml, self.signature.as_ref());
        }
        xml.push_str("</saml1:Assertion>");
        xml
    }
}

fn render_signature(xml: &mut String, signature: Option<&AssertionSignature>) {
    let Some(signature) = signature else {
        return;
    };
    let _ = write!(
        xml,
        r#"<ds:Signature xmlns:ds="{DS_NS}"><ds:SignedInfo><ds:SignatureMethod Algorithm="{}"/></ds:SignedInfo><ds:SignatureValue>{}</ds:SignatureValue><ds:KeyInfo><ds:KeyName>{}</ds:KeyName></ds:KeyInfo></ds:Signature>"#,
        escape(&signature.algorithm),
        encoding::encode(&signature.value),
        escape(&signature.key_alias)
    );
}

fn render_key_info(xml: &mut String, key_info: &KeyInfo) {
    let _ = write!(xml, r#"<ds:KeyInfo xmlns:ds="{DS_NS}">"#);
    match key_info {
        KeyInfo::Certificate(cert) => {
            let _ = write!(
                xml,
                "<ds:X509Data><ds:X509SubjectName>{}</ds:X509SubjectName><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data>",
                escape(&cert.subject_dn),
                encoding::encode(&cert.public_key)
            );
        }
        KeyInfo::Symmetric {
            key_sha256,
            encrypted_key: Some(encrypted),
        } => {
            let _ = write!(
                xml,
                r#"<xenc:EncryptedKey xmlns:xenc="{XENC_NS}"><xenc:EncryptionMethod Algorithm="{}"/><ds:KeyInfo><ds:KeyName>{}</ds:KeyName></ds:KeyInfo><xenc:CipherData><xenc:CipherValue>{}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedKey><ds:KeyName>sha256:{}</ds:KeyName>"#,
                escape(&encrypted.key_wrap_algorithm),
                escape(&encrypted.recipient_alias),
                encoding::encode(&encrypted.ciphertext),
                key_sha256
            );
        }
        KeyInfo::Symmetric {
            key_sha256,
            encrypted_key: None,
        } => {
            let _ = write!(xml, "<ds:KeyName>sha256:{key_sha256}</ds:KeyName>");
        }
    }
    xml.push_str("</ds:KeyInfo>");
}

/// Builder for assertions issued by providers and renewers.
pub struct SamlAssertionBuilder {
    assertion: SamlAssertion,
}

impl SamlAssertionBuilder {
    fn new(version: SamlVersion, issuer: impl Into<String>, name_id: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            assertion: SamlAssertion {
                id: format!("_{}", uuid::Uuid::new_v4().simple()),
                version,
                issuer: issuer.into(),
                issue_instant: now,
                subject: SamlSubject {
                    name_id: name_id.into(),
                    name_format: None,
                    confirmation: SubjectConfirmation::bearer(),
                },
                conditions: Conditions {
                    not_before: now,
                    not_on_or_after: now + Duration::minutes(5),
                    audiences: Vec::new(),
                },
                attributes: Vec::new(),
                authn_statement: None,
                signature: None,
            },
        }
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.assertion.id = id.into();
        self
    }

    #[must_use]
    pub fn name_format(mut self, format: impl Into<String>) -> Self {
        self.assertion.subject.name_format = Some(format.into());
        self
    }

    #[must_use]
    pub fn confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.assertion.subject.confirmation = confirmation;
        self
    }

    #[must_use]
    pub fn lifetime(mut self, not_before: OffsetDateTime, not_on_or_after: OffsetDateTime) -> Self {
        self.assertion.conditions.not_before = not_before;
        self.assertion.conditions.not_on_or_after = not_on_or_after;
        self
    }

    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.assertion.conditions.audiences.push(audience.into());
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.assertion.attributes.push(SamlAttribute {
            name: name.into(),
            name_format: None,
            values,
        });
        self
    }

    /// Adds every resolved claim as an attribute.
    #[must_use]
    pub fn claims(mut self, claims: &ProcessedClaimCollection) -> Self {
        for claim in claims.iter() {
            self = self.attribute(claim.claim_type.clone(), claim.values.clone());
        }
        self
    }

    /// Adds an authentication statement. `password` selects the password
    /// context class, otherwise the class is unspecified.
    #[must_use]
    pub fn authenticated(mut self, password: bool) -> Self {
        let context_class = if password {
            AUTHN_PASSWORD
        } else {
            AUTHN_UNSPECIFIED
        };
        self.assertion.authn_statement = Some(AuthnStatement {
            authn_instant: self.assertion.issue_instant,
            context_class: context_class.to_string(),
        });
        self
    }

    #[must_use]
    pub fn build(self) -> SamlAssertion {
        self.assertion
    }
}
