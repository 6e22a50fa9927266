//! Envelope definitions and the JSON wire codec.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::payload::Payload;

/// Machine-readable error codes carried by `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The frame could not be decoded.
    InvalidMessage,
    /// The frame carried a type this gateway does not accept.
    UnknownType,
    /// The broker rejected a subscription.
    SubscriptionFailed,
    /// The connection holds the maximum number of subscriptions.
    SubscriptionLimit,
    /// The broker rejected a publish.
    PublishFailed,
    /// A code this version does not know about.
    #[serde(other)]
    Other,
}

impl ErrorCode {
    /// Wire name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessage => "invalid_message",
            Self::UnknownType => "unknown_type",
            Self::SubscriptionFailed => "subscription_failed",
            Self::SubscriptionLimit => "subscription_limit",
            Self::PublishFailed => "publish_failed",
            Self::Other => "other",
        }
    }

    /// Human-readable message sent with the code by default.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::InvalidMessage => "Failed to parse message",
            Self::UnknownType => "Unknown message type",
            Self::SubscriptionFailed => "Failed to subscribe to topic",
            Self::SubscriptionLimit => "Subscription limit reached",
            Self::PublishFailed => "Failed to publish message",
            Self::Other => "Error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `error` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable reason.
    pub message: String,
}

/// A unit of the persistent-connection protocol.
///
/// Client-originated: `Subscribe`, `Unsubscribe`, `Publish`.
/// Gateway-originated: `Message`, `Subscribed`, `Unsubscribed`, `Error`.
/// Any other `type` string decodes to `Unknown` so newer clients do not break
/// older gateways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Register interest in a topic.
    Subscribe {
        /// Topic name.
        topic: String,
    },
    /// Drop interest in a topic.
    Unsubscribe {
        /// Topic name.
        topic: String,
    },
    /// Publish a payload to a topic.
    Publish {
        /// Topic name.
        topic: String,
        /// Payload, if any.
        payload: Option<Payload>,
    },
    /// Delivery of a published payload.
    Message {
        /// Topic name.
        topic: String,
        /// Payload, if any.
        payload: Option<Payload>,
    },
    /// Subscribe acknowledgement.
    Subscribed {
        /// Topic name.
        topic: String,
    },
    /// Unsubscribe acknowledgement.
    Unsubscribed {
        /// Topic name.
        topic: String,
    },
    /// Failure notice.
    Error(ErrorBody),
    /// A type this version does not recognize.
    Unknown {
        /// The `type` string as received.
        kind: String,
    },
}

/// Loose wire shape used for decoding.
#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    payload: Option<Payload>,
}

/// Wire shape used for encoding.
#[derive(Serialize)]
struct OutboundFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<FramePayload<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FramePayload<'a> {
    Opaque(&'a Payload),
    Error(&'a ErrorBody),
}

impl Envelope {
    /// Create a subscribe envelope.
    #[must_use]
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
        }
    }

    /// Create an unsubscribe envelope.
    #[must_use]
    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self::Unsubscribe {
            topic: topic.into(),
        }
    }

    /// Create a publish envelope.
    #[must_use]
    pub fn publish(topic: impl Into<String>, payload: Option<Payload>) -> Self {
        Self::Publish {
            topic: topic.into(),
            payload,
        }
    }

    /// Create a message delivery envelope.
    #[must_use]
    pub fn message(topic: impl Into<String>, payload: Option<Payload>) -> Self {
        Self::Message {
            topic: topic.into(),
            payload,
        }
    }

    /// Create a subscribe acknowledgement.
    #[must_use]
    pub fn subscribed(topic: impl Into<String>) -> Self {
        Self::Subscribed {
            topic: topic.into(),
        }
    }

    /// Create an unsubscribe acknowledgement.
    #[must_use]
    pub fn unsubscribed(topic: impl Into<String>) -> Self {
        Self::Unsubscribed {
            topic: topic.into(),
        }
    }

    /// Create an error envelope with the code's default message.
    #[must_use]
    pub fn error(code: ErrorCode) -> Self {
        Self::error_with_message(code, code.default_message())
    }

    /// Create an error envelope with a custom message.
    #[must_use]
    pub fn error_with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorBody {
            code,
            message: message.into(),
        })
    }

    /// The wire `type` of this envelope.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Publish { .. } => "publish",
            Self::Message { .. } => "message",
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Error(_) => "error",
            Self::Unknown { kind } => kind,
        }
    }

    /// The topic this envelope refers to, if any.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Subscribe { topic }
            | Self::Unsubscribe { topic }
            | Self::Publish { topic, .. }
            | Self::Message { topic, .. }
            | Self::Subscribed { topic }
            | Self::Unsubscribed { topic } => Some(topic),
            Self::Error(_) | Self::Unknown { .. } => None,
        }
    }

    /// Whether a client is allowed to send this envelope.
    #[must_use]
    pub const fn is_client_originated(&self) -> bool {
        matches!(
            self,
            Self::Subscribe { .. } | Self::Unsubscribe { .. } | Self::Publish { .. }
        )
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Decoding`] if the frame is not a JSON object with a
    /// string `type`, or if an `error` frame carries a malformed payload.
    pub fn decode(text: &str) -> Result<Self, ProtoError> {
        let frame: InboundFrame =
            serde_json::from_str(text).map_err(|e| ProtoError::Decoding(e.to_string()))?;
        Self::from_frame(frame)
    }

    /// Decode a frame from raw bytes, which must be UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Envelope::decode`], plus invalid UTF-8.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        let frame: InboundFrame =
            serde_json::from_slice(bytes).map_err(|e| ProtoError::Decoding(e.to_string()))?;
        Self::from_frame(frame)
    }

    fn from_frame(frame: InboundFrame) -> Result<Self, ProtoError> {
        let topic = frame.topic.unwrap_or_default();
        let envelope = match frame.kind.as_str() {
            "subscribe" => Self::Subscribe { topic },
            "unsubscribe" => Self::Unsubscribe { topic },
            "publish" => Self::Publish {
                topic,
                payload: frame.payload,
            },
            "message" => Self::Message {
                topic,
                payload: frame.payload,
            },
            "subscribed" => Self::Subscribed { topic },
            "unsubscribed" => Self::Unsubscribed { topic },
            "error" => {
                let payload = frame
                    .payload
                    .ok_or_else(|| ProtoError::Decoding("error frame without payload".into()))?;
                Self::Error(payload.parse()?)
            }
            _ => Self::Unknown { kind: frame.kind },
        };
        Ok(envelope)
    }

    /// Encode the envelope as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Encoding`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProtoError> {
        let payload = match self {
            Self::Publish { payload, .. } | Self::Message { payload, .. } => {
                payload.as_ref().map(FramePayload::Opaque)
            }
            Self::Error(body) => Some(FramePayload::Error(body)),
            _ => None,
        };
        let frame = OutboundFrame {
            kind: self.kind(),
            topic: self.topic(),
            payload,
        };
        serde_json::to_string(&frame).map_err(|e| ProtoError::Encoding(e.to_string()))
    }
}
