//! STS fault model.
//!
//! Every failure that reaches a caller is an [`StsError`]. Its
//! [`FaultCode`] is what a binding puts on the wire; callers branch on the
//! code, never on the variant's message.

use std::fmt;

/// WS-Trust fault codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCode {
    InvalidRequest,
    RequestFailed,
    BadRequest,
    InvalidSecurityToken,
    FailedAuthentication,
    ExpiredData,
    InvalidTimeRange,
    UnableToRenew,
}

impl FaultCode {
    /// Local name of the fault element.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::RequestFailed => "RequestFailed",
            Self::BadRequest => "BadRequest",
            Self::InvalidSecurityToken => "InvalidSecurityToken",
            Self::FailedAuthentication => "FailedAuthentication",
            Self::ExpiredData => "ExpiredData",
            Self::InvalidTimeRange => "InvalidTimeRange",
            Self::UnableToRenew => "UnableToRenew",
        }
    }

    /// Prefixed qualified name, e.g. `wst:InvalidRequest`.
    #[must_use]
    pub fn qname(&self) -> String {
        let prefix = match self {
            Self::InvalidSecurityToken | Self::FailedAuthentication => "wsse",
            _ => "wst",
        };
        format!("{prefix}:{}", self.as_str())
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by STS operations and plugins.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StsError {
    /// No token type could be resolved for the request.
    #[error("Unknown token type: {}", token_type.as_deref().unwrap_or("<none>"))]
    UnknownTokenType { token_type: Option<String> },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Request failed: {message}")]
    RequestFailed { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Invalid time range: {message}")]
    InvalidTimeRange { message: String },

    #[error("Delegation not allowed: {message}")]
    DelegationNotAllowed { message: String },

    /// The delegated token's audience does not cover the AppliesTo address.
    #[error("AppliesTo {applies_to} is not in the delegated token's audience")]
    AudienceMismatch { applies_to: String },

    #[error("Encryption algorithm not accepted: {algorithm}")]
    EncryptionAlgorithmNotAccepted { algorithm: String },

    #[error("No claims handler supports mandatory claim {claim_type}")]
    MissingClaim { claim_type: String },

    #[error("Token not found: {id}")]
    TokenNotFound { id: String },

    #[error("Renewal not allowed: {message}")]
    RenewalNotAllowed { message: String },

    #[error("Invalid security token: {message}")]
    InvalidSecurityToken { message: String },

    #[error("Authentication failed: {message}")]
    FailedAuthentication { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Crypto error: {message}")]
    Crypto { message: String },
}

impl StsError {
    #[must_use]
    pub fn unknown_token_type(token_type: Option<&str>) -> Self {
        Self::UnknownTokenType {
            token_type: token_type.map(str::to_string),
        }
    }

    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_time_range(message: impl Into<String>) -> Self {
        Self::InvalidTimeRange {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn delegation_not_allowed(message: impl Into<String>) -> Self {
        Self::DelegationNotAllowed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn audience_mismatch(applies_to: impl Into<String>) -> Self {
        Self::AudienceMismatch {
            applies_to: applies_to.into(),
        }
    }

    #[must_use]
    pub fn encryption_algorithm_not_accepted(algorithm: impl Into<String>) -> Self {
        Self::EncryptionAlgorithmNotAccepted {
            algorithm: algorithm.into(),
        }
    }

    #[must_use]
    pub fn missing_claim(claim_type: impl Into<String>) -> Self {
        Self::MissingClaim {
            claim_type: claim_type.into(),
        }
    }

    #[must_use]
    pub fn token_not_found(id: impl Into<String>) -> Self {
        Self::TokenNotFound { id: id.into() }
    }

    #[must_use]
    pub fn renewal_not_allowed(message: impl Into<String>) -> Self {
        Self::RenewalNotAllowed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_security_token(message: impl Into<String>) -> Self {
        Self::InvalidSecurityToken {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed_authentication(message: impl Into<String>) -> Self {
        Self::FailedAuthentication {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// The wire fault code for this error.
    #[must_use]
    pub fn fault_code(&self) -> FaultCode {
        match self {
            Self::UnknownTokenType { .. } | Self::InvalidRequest { .. } => FaultCode::InvalidRequest,
            Self::BadRequest { .. } => FaultCode::BadRequest,
            Self::InvalidTimeRange { .. } => FaultCode::InvalidTimeRange,
            Self::InvalidSecurityToken { .. } => FaultCode::InvalidSecurityToken,
            Self::FailedAuthentication { .. } => FaultCode::FailedAuthentication,
            Self::RequestFailed { .. }
            | Self::DelegationNotAllowed { .. }
            | Self::AudienceMismatch { .. }
            | Self::EncryptionAlgorithmNotAccepted { .. }
            | Self::MissingClaim { .. }
            | Self::TokenNotFound { .. }
            | Self::RenewalNotAllowed { .. }
            | Self::Configuration { .. }
            | Self::Crypto { .. } => FaultCode::RequestFailed,
        }
    }

    /// Returns `true` if the request itself was at fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTokenType { .. }
                | Self::InvalidRequest { .. }
                | Self::BadRequest { .. }
                | Self::InvalidTimeRange { .. }
                | Self::AudienceMismatch { .. }
                | Self::InvalidSecurityToken { .. }
                | Self::FailedAuthentication { .. }
        )
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownTokenType { .. }
            | Self::InvalidRequest { .. }
            | Self::BadRequest { .. }
            | Self::InvalidTimeRange { .. } => ErrorCategory::Request,
            Self::DelegationNotAllowed { .. }
            | Self::AudienceMismatch { .. }
            | Self::EncryptionAlgorithmNotAccepted { .. }
            | Self::MissingClaim { .. }
            | Self::RenewalNotAllowed { .. }
            | Self::RequestFailed { .. } => ErrorCategory::Policy,
            Self::TokenNotFound { .. }
            | Self::InvalidSecurityToken { .. }
            | Self::FailedAuthentication { .. } => ErrorCategory::Token,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Crypto { .. } => ErrorCategory::Crypto,
        }
    }
}

/// Coarse grouping used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Request,
    Policy,
    Token,
    Configuration,
    Crypto,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Policy => write!(f, "policy"),
            Self::Token => write!(f, "token"),
            Self::Configuration => write!(f, "configuration"),
            Self::Crypto => write!(f, "crypto"),
        }
    }
}

impl From<serde_json::Error> for StsError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_request(format!("malformed request document: {err}"))
    }
}

impl From<base64::DecodeError> for StsError {
    fn from(err: base64::DecodeError) -> Self {
        Self::invalid_request(format!("invalid base64 value: {err}"))
    }
}

impl From<trustgate_config::ConfigError> for StsError {
    fn from(err: trustgate_config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

pub type StsResult<T> = Result<T, StsError>;
