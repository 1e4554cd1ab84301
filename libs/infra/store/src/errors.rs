//! [libs/infra/store/src/errors.rs]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("row mapping failed: {0}")]
    Mapping(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl DbError {
    /// SQLite surfaces unique violations as a generic `libsql::Error`
    /// carrying `"UNIQUE constraint failed"` in its message; this recovers
    /// the distinct variant spec.md §4.1/§7 requires callers be able to
    /// branch on.
    pub fn from_libsql(err: libsql::Error, context: &str) -> Self {
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed") {
            DbError::UniqueViolation(context.to_string())
        } else {
            DbError::Query(err)
        }
    }
}
