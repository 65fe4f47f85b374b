//! Error types for calgrid.

use thiserror::Error;

use crate::event::{EventKey, OriginKey};

/// Errors that can occur in calgrid operations.
#[derive(Error, Debug)]
pub enum CalGridError {
    #[error("Malformed source '{origin}': {reason}")]
    MalformedSource { origin: OriginKey, reason: String },

    #[error("Event '{id}' no longer exists in '{origin}'")]
    UnknownId { origin: OriginKey, id: String },

    #[error("Cannot move '{key}' within the given bounds: {reason}")]
    OutOfBounds { key: EventKey, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid time range for '{id}': end must be after start")]
    InvalidRange { id: String },

    #[error("IO error on '{key}': {source}")]
    Io {
        key: OriginKey,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CalGridError {
    pub(crate) fn io(key: &OriginKey, source: std::io::Error) -> Self {
        CalGridError::Io {
            key: key.clone(),
            source,
        }
    }
}

/// Result type alias for calgrid operations.
pub type CalGridResult<T> = Result<T, CalGridError>;
