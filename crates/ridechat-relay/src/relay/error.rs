//! Errors reported back to the requesting connection.

/// Fallback detail when the gateway gives nothing usable.
pub const STORE_FAILED: &str = "Failed to store message";

/// Relay failures. `Display` is the exact text placed in the ack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Missing or ill-typed required fields.
    #[error("{0}")]
    MalformedRequest(&'static str),

    /// Bad signature, expired token, or booking mismatch. One message for all
    /// so callers cannot tell which check failed.
    #[error("Invalid or expired token")]
    Unauthorized,

    /// A valid join for a second booking on an already bound connection.
    #[error("Connection already joined to another booking")]
    AlreadyBound,

    /// The persistence gateway rejected or failed the call.
    #[error("{0}")]
    Downstream(String),

    #[error("Unknown event")]
    UnknownEvent,
}

impl RelayError {
    pub const JOIN_FIELDS: Self = Self::MalformedRequest("bookingId and token required");
    pub const MESSAGE_FIELDS: Self =
        Self::MalformedRequest("bookingId, text, and token required");
    pub const RECEIPT_FIELDS: Self =
        Self::MalformedRequest("bookingId, token, and message_ids required");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_texts_are_stable() {
        assert_eq!(
            RelayError::JOIN_FIELDS.to_string(),
            "bookingId and token required"
        );
        assert_eq!(
            RelayError::MESSAGE_FIELDS.to_string(),
            "bookingId, text, and token required"
        );
        assert_eq!(
            RelayError::RECEIPT_FIELDS.to_string(),
            "bookingId, token, and message_ids required"
        );
        assert_eq!(
            RelayError::Unauthorized.to_string(),
            "Invalid or expired token"
        );
        assert_eq!(
            RelayError::Downstream(STORE_FAILED.into()).to_string(),
            STORE_FAILED
        );
    }
}
