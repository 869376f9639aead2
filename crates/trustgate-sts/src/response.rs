//! RequestSecurityTokenResponse document model.

use serde::{Deserialize, Serialize};

use crate::constants::status;
use crate::encoding;
use crate::error::{StsError, StsResult};
use crate::lifetime::Lifetime;
use crate::request::{AppliesToElement, EntropyElement};
use crate::token::{TokenElement, TokenReference};

/// Proof of possession key returned with a holder-of-key token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestedProofToken {
    /// Base64 secret generated by the STS.
    BinarySecret(String),
    /// The client derives the key from both entropies with this algorithm.
    ComputedKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Valid,
    Invalid,
}

impl StatusCode {
    #[must_use]
    pub fn uri(self) -> &'static str {
        match self {
            Self::Valid => status::VALID,
            Self::Invalid => status::INVALID,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Status {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Status {
    #[must_use]
    pub fn new(code: StatusCode, reason: Option<String>) -> Self {
        Self {
            code: code.uri().to_string(),
            reason,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.code == status::VALID
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestSecurityTokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_security_token: Option<TokenElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_attached_reference: Option<TokenReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_unattached_reference: Option<TokenReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<AppliesToElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<Lifetime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_proof_token: Option<RequestedProofToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<EntropyElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requested_token_cancelled: bool,
}

impl RequestSecurityTokenResponse {
    #[must_use]
    pub fn new(context: Option<String>) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }

    /// Decodes a `BinarySecret` proof token.
    pub fn proof_secret(&self) -> StsResult<Option<Vec<u8>>> {
        match &self.requested_proof_token {
            Some(RequestedProofToken::BinarySecret(secret)) => Ok(Some(encoding::decode(secret)?)),
            _ => Ok(None),
        }
    }

    /// Server entropy, if the key was computed from both sides.
    pub fn server_entropy(&self) -> StsResult<Option<Vec<u8>>> {
        match self.entropy.as_ref().and_then(|e| e.binary_secret.as_ref()) {
            Some(secret) => Ok(Some(encoding::decode(&secret.value)?)),
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status.as_ref().is_some_and(Status::is_valid)
    }

    /// The issued token rendered as XML.
    #[must_use]
    pub fn token_xml(&self) -> Option<String> {
        self.requested_security_token.as_ref().map(TokenElement::to_xml)
    }

    pub fn to_json(&self) -> StsResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StsError::crypto(format!("cannot serialize response: {e}")))
    }
}

/// Outcome of one request inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchItem {
    Response(Box<RequestSecurityTokenResponse>),
    Fault { code: String, reason: String },
}

impl BatchItem {
    #[must_use]
    pub fn from_result(result: StsResult<RequestSecurityTokenResponse>) -> Self {
        match result {
            Ok(response) => Self::Response(Box::new(response)),
            Err(e) => Self::Fault {
                code: e.fault_code().qname(),
                reason: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestSecurityTokenResponseCollection {
    pub request_security_token_response: Vec<BatchItem>,
}

impl RequestSecurityTokenResponseCollection {
    #[must_use]
    pub fn len(&self) -> usize {
        self.request_security_token_response.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.request_security_token_response.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchItem> {
        self.request_security_token_response.iter()
    }
}

impl FromIterator<StsResult<RequestSecurityTokenResponse>> for RequestSecurityTokenResponseCollection {
    fn from_iter<I: IntoIterator<Item = StsResult<RequestSecurityTokenResponse>>>(iter: I) -> Self {
        Self {
            request_security_token_response: iter.into_iter().map(BatchItem::from_result).collect(),
        }
    }
}
