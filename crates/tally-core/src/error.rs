//! Error types for tally-core

use thiserror::Error;

/// Result type alias using tally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tally-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation that requires a signed-in owner ran without one
    #[error("Not authenticated: no owner identity is available")]
    NotAuthenticated,

    /// The remote store was unreachable or rejected a request
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Legacy import finished but some collections failed
    #[error("Legacy migration completed with {0} failed collection(s)")]
    MigrationPartialFailure(usize),
}

impl Error {
    /// Whether this error indicates the remote side failed, as opposed to a
    /// local storage or input problem.
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = Error::NotFound("act-1".to_string());
        assert_eq!(err.to_string(), "Record not found: act-1");

        let err = Error::Remote("connection refused".to_string());
        assert_eq!(err.to_string(), "Remote store error: connection refused");
        assert!(err.is_remote());

        let err = Error::MigrationPartialFailure(2);
        assert!(err.to_string().contains("2 failed collection(s)"));
        assert!(!err.is_remote());
    }

    #[test]
    fn serde_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
