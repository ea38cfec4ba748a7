//! Error types for core domain and persistence operations.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for persistence and codec operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique constraint fired.
    ///
    /// On the events table this is the idempotency guard, not a fault:
    /// the ingest path maps it to the duplicate outcome.
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    /// Other constraint violation (foreign key, check).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Wire codec failure.
    #[error("codec error: {0}")]
    Codec(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::UniqueViolation(db_err.to_string())
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

impl CoreError {
    /// True when the error is the events-table idempotency guard firing.
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = CoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn unique_violation_predicate() {
        assert!(CoreError::UniqueViolation("events".into()).is_unique_violation());
        assert!(!CoreError::Database("down".into()).is_unique_violation());
    }
}
