//! Error types for the robo-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode an envelope.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a frame.
    #[error("decoding error: {0}")]
    Decoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtoError::Decoding("expected value at line 1".to_string());
        assert_eq!(err.to_string(), "decoding error: expected value at line 1");

        let err = ProtoError::Encoding("bad".to_string());
        assert_eq!(err.to_string(), "encoding error: bad");
    }
}
