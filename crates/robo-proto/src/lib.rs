//! # robo-proto
//!
//! Envelope codec for the robocore persistent-connection protocol.
//!
//! Every frame exchanged over `/api/v1/ws` is a UTF-8 JSON object of the form
//! `{"type": ..., "topic": ..., "payload": ...}`. This crate turns those frames
//! into the closed [`Envelope`] union and back, keeping payloads opaque.
//!
//! ```rust
//! use robo_proto::Envelope;
//!
//! let env = Envelope::decode(r#"{"type":"subscribe","topic":"sensors"}"#).unwrap();
//! assert_eq!(env, Envelope::subscribe("sensors"));
//! assert_eq!(
//!     Envelope::subscribed("sensors").encode().unwrap(),
//!     r#"{"type":"subscribed","topic":"sensors"}"#,
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod error;
pub mod payload;

pub use envelope::{Envelope, ErrorBody, ErrorCode};
pub use error::ProtoError;
pub use payload::Payload;
