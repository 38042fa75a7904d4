use std::time::Duration;

use companion_protocol::{DecodeError, ErrorShape, error_codes};

/// Failure of the real-time channel while delivering a call or packet.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no participant '{0}' is connected")]
    NotConnected(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("channel closed")]
    Closed,

    #[error("remote error {0}")]
    Remote(ErrorShape),

    #[error(transparent)]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid payload: {0}")]
    Decode(#[from] DecodeError),

    #[error("payload too large: {size} > {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid action: {action}")]
    InvalidAction { action: String },

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("no {entity} with id {id}")]
    NoSuchEntity { entity: String, id: String },

    #[error("method already registered: {method}")]
    AlreadyRegistered { method: String },

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn no_such_entity(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NoSuchEntity {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => error_codes::DECODE_ERROR,
            Self::PayloadTooLarge { .. } => error_codes::PAYLOAD_TOO_LARGE,
            Self::InvalidAction { .. } => error_codes::INVALID_ACTION,
            Self::MissingField { .. } => error_codes::MISSING_FIELD,
            Self::InvalidField { .. } => error_codes::INVALID_FIELD,
            Self::NoSuchEntity { .. } => error_codes::NO_SUCH_ENTITY,
            Self::AlreadyRegistered { .. } => error_codes::CONFLICT,
            Self::Transport(TransportError::NotConnected(_)) => error_codes::UNAVAILABLE,
            Self::Transport(TransportError::Timeout(_)) => error_codes::TIMEOUT,
            Self::Transport(_) => error_codes::TRANSPORT_FAILURE,
            Self::Config(_) | Self::Json(_) => error_codes::INTERNAL,
        }
    }

    /// Whether the inbound caller can fix this by changing its payload.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::PayloadTooLarge { .. }
                | Self::InvalidAction { .. }
                | Self::MissingField { .. }
                | Self::InvalidField { .. }
                | Self::NoSuchEntity { .. }
        )
    }

    pub fn to_error_shape(&self) -> ErrorShape {
        ErrorShape::new(self.code(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_such_entity_message() {
        let err = Error::no_such_entity("card", "missing");
        assert_eq!(err.to_string(), "no card with id missing");
        assert_eq!(err.code(), error_codes::NO_SUCH_ENTITY);
        assert!(err.is_caller_error());
    }

    #[test]
    fn decode_error_converts() {
        let err: Error = DecodeError::new("malformed JSON: eof").into();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.to_string(), "invalid payload: malformed JSON: eof");
    }

    #[test]
    fn transport_errors_map_to_distinct_codes() {
        let timeout: Error = TransportError::Timeout(Duration::from_secs(10)).into();
        let absent: Error = TransportError::NotConnected("agent".into()).into();
        let closed: Error = TransportError::Closed.into();
        assert_eq!(timeout.code(), error_codes::TIMEOUT);
        assert_eq!(absent.code(), error_codes::UNAVAILABLE);
        assert_eq!(closed.code(), error_codes::TRANSPORT_FAILURE);
        assert!(!closed.is_caller_error());
    }

    #[test]
    fn error_shape_uses_display() {
        let shape = Error::MissingField { field: "cardId" }.to_error_shape();
        assert_eq!(shape.code, error_codes::MISSING_FIELD);
        assert_eq!(shape.message, "missing required field: cardId");
    }
}
