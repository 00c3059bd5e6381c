//! Error types for the templating and transaction layer.
//!
//! This module defines all error types using `thiserror`. Driver errors
//! pass through unchanged; everything this layer adds on top gets its own
//! variant so callers can tell a programming error (wrong value kind, bad
//! lookup, missing scope) from a data error (null in a non-null column).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Native driver failure, propagated unchanged. No retry or backoff is
    /// applied at this layer.
    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    /// SQL NULL decoded from a column declared non-null.
    #[error("null value in non-null column '{table}.{column}'")]
    NullValue { table: String, column: String },

    /// A value of the wrong underlying kind reached a column's encode or
    /// decode path. This is a programming error, not a recoverable state.
    #[error("type mismatch for column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The qualified column name is absent from the result row's metadata.
    #[error("column '{name}' is not present in the result row")]
    ColumnNotInRow { name: String },

    /// A scope-requiring entry point was called with no transaction bound
    /// for this database on the current task.
    #[error("no active transaction for this database on the current task")]
    NoActiveTransaction,

    /// The owning transaction scope has already committed or rolled back.
    #[error("transaction scope has already ended")]
    ScopeClosed,

    /// API misuse that is detected at runtime.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl Error {
    /// Create a null-violation error for a column.
    pub fn null_value(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::NullValue {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a type-mismatch error for a column.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected,
            actual,
        }
    }

    /// Create a row-lookup error for a qualified column name.
    pub fn column_not_in_row(name: impl Into<String>) -> Self {
        Self::ColumnNotInRow { name: name.into() }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Whether this error indicates incorrect API usage rather than a
    /// runtime condition of the database.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch { .. }
                | Self::ColumnNotInRow { .. }
                | Self::NoActiveTransaction
                | Self::InvalidInput { .. }
        )
    }
}

/// Result type alias for all operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_value_display() {
        let err = Error::null_value("users", "id");
        assert_eq!(err.to_string(), "null value in non-null column 'users.id'");
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = Error::type_mismatch("users.id", "integer", "text");
        assert!(err.to_string().contains("expected integer, got text"));
    }

    #[test]
    fn test_usage_error_classification() {
        assert!(Error::NoActiveTransaction.is_usage_error());
        assert!(Error::column_not_in_row("users.id").is_usage_error());
        assert!(Error::invalid_input("bad").is_usage_error());
        assert!(!Error::null_value("users", "id").is_usage_error());
        assert!(!Error::ScopeClosed.is_usage_error());
    }

    #[test]
    fn test_driver_error_passes_through() {
        let err = Error::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::Driver(sqlx::Error::RowNotFound)));
    }
}
