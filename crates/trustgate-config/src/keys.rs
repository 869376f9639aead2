//! Decoding of key material written into configuration files.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::ConfigError;

/// Smallest secret accepted for a key store entry, in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// How a configured secret was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretEncoding {
    Hex,
    Base64,
}

/// Decodes a hex or base64 secret.
///
/// Hex is tried first when the string has an even length made only of hex
/// digits, otherwise the value is read as standard base64.
pub fn decode_secret(value: &str) -> Result<(Vec<u8>, SecretEncoding), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::missing("secret is empty"));
    }

    let (bytes, encoding) = if value.len() % 2 == 0 && value.chars().all(|c| c.is_ascii_hexdigit())
    {
        let bytes = hex::decode(value)
            .map_err(|e| ConfigError::invalid_value(format!("invalid hex secret: {e}")))?;
        (bytes, SecretEncoding::Hex)
    } else {
        let bytes = BASE64
            .decode(value)
            .map_err(|e| ConfigError::invalid_value(format!("invalid base64 secret: {e}")))?;
        (bytes, SecretEncoding::Base64)
    };

    if bytes.len() < MIN_SECRET_LEN {
        return Err(ConfigError::invalid_value(format!(
            "secret must be at least {MIN_SECRET_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    Ok((bytes, encoding))
}
