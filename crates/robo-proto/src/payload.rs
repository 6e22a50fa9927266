//! Opaque envelope payloads.

use std::fmt;

use bytes::Bytes;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::ProtoError;

/// An opaque structured payload carried by an envelope.
///
/// The payload is kept as the exact JSON text it arrived with, so relaying a
/// published payload to subscribers never re-parses or reorders it. Cloning is
/// a reference-count bump.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Payload(Bytes);

impl Payload {
    /// Wrap raw bytes as a payload.
    ///
    /// Bytes that are not valid JSON are still accepted; they are emitted as a
    /// JSON string when encoded.
    #[must_use]
    pub const fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Build a payload from a structured JSON value.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self(Bytes::from(value.to_string()))
    }

    /// Build a payload from JSON text, validating it first.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Decoding`] if `json` is not a single JSON value.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        let raw: Box<RawValue> =
            serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))?;
        Ok(Self(Bytes::from(raw.get().to_owned())))
    }

    /// The raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the payload, returning the underlying bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Size of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the payload into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Decoding`] if the bytes are not valid JSON.
    pub fn to_value(&self) -> Result<serde_json::Value, ProtoError> {
        serde_json::from_slice(&self.0).map_err(|e| ProtoError::Decoding(e.to_string()))
    }

    /// Deserialize the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Decoding`] if the bytes do not match `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtoError> {
        serde_json::from_slice(&self.0).map_err(|e| ProtoError::Decoding(e.to_string()))
    }

    fn as_raw(&self) -> Option<Box<RawValue>> {
        let text = std::str::from_utf8(&self.0).ok()?;
        RawValue::from_string(text.to_owned()).ok()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Payload")
            .field(&String::from_utf8_lossy(&self.0))
            .finish()
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::from_value(&value)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_raw() {
            Some(raw) => raw.serialize(serializer),
            None => serializer.serialize_str(&String::from_utf8_lossy(&self.0)),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Ok(Self(Bytes::from(raw.get().to_owned())))
    }
}
