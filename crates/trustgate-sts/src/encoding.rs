//! Serde helpers for binary fields carried as base64 text.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(value.trim())
}

/// RFC 3339 rendering used in XML attributes. Falls back to the unix
/// timestamp for instants RFC 3339 cannot express.
pub fn rfc3339(instant: time::OffsetDateTime) -> String {
    instant
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| instant.unix_timestamp().to_string())
}

pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        super::decode(&value).map_err(serde::de::Error::custom)
    }
}

pub mod base64_option {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&super::encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|v| super::decode(&v).map_err(serde::de::Error::custom))
            .transpose()
    }
}
