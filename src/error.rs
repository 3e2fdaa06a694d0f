//! Error types for memrel
//!
//! This module defines all error types used throughout the table store.

use thiserror::Error;

/// The main error type for memrel
#[derive(Error, Debug)]
pub enum Error {
    // ========== Schema Errors ==========
    #[error("Schema error: malformed column '{column}': {reason}")]
    MalformedColumn { column: String, reason: String },

    #[error("Schema error: column '{0}' already exists in table '{1}'")]
    ColumnAlreadyExists(String, String),

    #[error("Index error: {0}")]
    IndexDefinition(String),

    // ========== Not Found Errors ==========
    #[error("Registry error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Registry error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Table error: column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Table error: record '{0}' not found in table '{1}'")]
    RecordNotFound(String, String),

    #[error("Table error: foreign key '{0}' not found in table '{1}'")]
    ForeignKeyNotFound(String, String),

    #[error("Persistence error: channel '{0}' not defined")]
    ChannelNotFound(String),

    #[error("Persistence error: file '{0}' not found")]
    FileNotFound(String),

    #[error("Index error: operator '{0}' not found")]
    OperatorNotFound(String),

    #[error("Selector error: alias '{0}' not found in record collection")]
    AliasNotFound(String),

    // ========== Value Errors ==========
    #[error("Value error: value for column '{0}' is null")]
    FieldValueIsNull(String),

    #[error("Value error: null value not allowed for column '{0}'")]
    NullNotAllowed(String),

    #[error("Type error: cannot convert {from} to {to}")]
    TypeMismatch { from: String, to: String },

    #[error("Type error: value too large for column '{0}'")]
    ValueTooLarge(String),

    // ========== State Errors ==========
    #[error("Syntax error: {0}")]
    SyntaxError(String),

    #[error("Table error: table '{0}' is not created")]
    TableNotCreated(String),

    #[error("Table error: table '{0}' is already created")]
    TableAlreadyCreated(String),

    #[error("Table error: no key given and no key generator defined for table '{0}'")]
    MissingKeyGenerator(String),

    #[error("Table error: unable to generate a free key for table '{0}' after {1} attempts")]
    KeyGenerationExhausted(String, usize),

    #[error("Forbidden action: {0}")]
    ForbiddenAction(String),

    // ========== Storage Errors ==========
    #[error("Storage error: table '{0}' is full ({1} rows)")]
    CapacityExceeded(String, usize),

    #[error("Storage error: corrupted row '{0}'")]
    CorruptedRow(String),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Config(String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for memrel operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a `TypeMismatch` from two displayable type names
    pub(crate) fn type_mismatch(from: impl Into<String>, to: impl Into<String>) -> Self {
        Error::TypeMismatch {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Build a `MalformedColumn` error
    pub(crate) fn malformed(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedColumn {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Registry error: table 'users' not found");

        let err = Error::FieldValueIsNull("age".to_string());
        assert_eq!(err.to_string(), "Value error: value for column 'age' is null");

        let err = Error::malformed("_key", "name is reserved");
        assert_eq!(
            err.to_string(),
            "Schema error: malformed column '_key': name is reserved"
        );
    }
}
