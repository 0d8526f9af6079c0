//! Error types for the marshaling core.
//!
//! Every failure is returned at the call boundary. Nothing in this crate
//! retries; [`MarshalError::is_retryable`] tells the caller which failures
//! are worth re-invoking after refreshing the collection schema.

use std::error::Error as StdError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarshalError {
    /// Malformed field or collection declaration.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A row carried a key that is neither declared nor absorbable by a dynamic field.
    #[error("Insert data contains a field that does not exist in the collection: '{field}' at row {row}")]
    UnknownField { row: usize, field: String },

    /// A required (non-nullable, no default) field was absent from a row.
    #[error("Field '{field}' is required but missing at row {row}")]
    MissingField { row: usize, field: String },

    /// Vector length does not match the declared dimension.
    #[error("Field '{field}' at row {row}: expected {expected} elements, got {actual}")]
    Dimension {
        field: String,
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A value could not be coerced into the field's declared type.
    #[error("Field '{field}' at row {row}: {reason}")]
    InvalidValue {
        field: String,
        row: usize,
        reason: String,
    },

    /// Search request could not be shaped against the collection.
    #[error("Search configuration error: {0}")]
    SearchConfig(String),

    /// The server rejected a write because the cached schema is stale.
    #[error("Collection schema mismatch: {reason}")]
    SchemaMismatch { reason: String },

    /// Any other non-success status returned by the server.
    #[error("Server error {code}: {reason}")]
    Server { code: i32, reason: String },

    /// Malformed column or result payload received from the wire.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Protobuf encode error: {0}")]
    ProtoEncode(#[from] prost::EncodeError),

    #[error("Protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure raised by the transport collaborator.
    #[error("Transport error: {0}")]
    Transport(Box<dyn StdError + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, MarshalError>;

impl MarshalError {
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        MarshalError::Schema(msg.into())
    }

    pub fn search_config<S: Into<String>>(msg: S) -> Self {
        MarshalError::SearchConfig(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        MarshalError::Decode(msg.into())
    }

    pub fn invalid_value<F: Into<String>, R: Into<String>>(field: F, row: usize, reason: R) -> Self {
        MarshalError::InvalidValue {
            field: field.into(),
            row,
            reason: reason.into(),
        }
    }

    pub fn transport<E>(err: E) -> Self where E: Into<Box<dyn StdError + Send + Sync>> {
        MarshalError::Transport(err.into())
    }

    /// True only for the stale-schema signal; the caller refreshes the
    /// schema and calls again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarshalError::SchemaMismatch { .. })
    }

    /// Row index carried by row validation errors.
    pub fn row(&self) -> Option<usize> {
        match self {
            MarshalError::UnknownField { row, .. } |
            MarshalError::MissingField { row, .. } |
            MarshalError::Dimension { row, .. } |
            MarshalError::InvalidValue { row, .. } => Some(*row),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_schema_mismatch_is_retryable() {
        let stale = MarshalError::SchemaMismatch { reason: "stale".into() };
        assert!(stale.is_retryable());
        assert!(!MarshalError::schema("bad").is_retryable());
        assert!(!(MarshalError::Server { code: 1, reason: "x".into() }).is_retryable());
    }

    #[test]
    fn row_errors_report_their_row() {
        let err = MarshalError::UnknownField { row: 3, field: "zzz".into() };
        assert_eq!(err.row(), Some(3));
        assert!(err.to_string().contains("row 3"));
        assert_eq!(MarshalError::search_config("x").row(), None);
    }
}
