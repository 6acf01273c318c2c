//! Error types for lorekeep.

use thiserror::Error;

/// Result type alias using lorekeep's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for lorekeep operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced node, mention, or note does not exist for this owner
    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource exists but belongs to a different owner
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid input (missing fields, malformed span, unknown type)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Identity collision outside the find-or-create path
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The tagger collaborator was unreachable or returned a bad payload
    #[error("Tagger error: {0}")]
    Tagger(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a database error, turning unique-constraint violations into
    /// [`Error::Conflict`].
    pub fn from_db(err: sqlx::Error, conflict_msg: impl Into<String>) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Error::Conflict(conflict_msg.into());
            }
        }
        Error::Database(err)
    }

    /// True for errors caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Forbidden(_) | Error::InvalidInput(_) | Error::Conflict(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("Mention 7".to_string());
        assert_eq!(err.to_string(), "Not found: Mention 7");
    }

    #[test]
    fn test_error_display_forbidden() {
        let err = Error::Forbidden("You do not own this note".to_string());
        assert_eq!(err.to_string(), "Forbidden: You do not own this note");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("node exists".to_string());
        assert_eq!(err.to_string(), "Conflict: node exists");
    }

    #[test]
    fn test_error_display_tagger() {
        let err = Error::Tagger("connection refused".to_string());
        assert_eq!(err.to_string(), "Tagger error: connection refused");
    }

    #[test]
    fn test_from_db_passes_through_non_unique_errors() {
        let err = Error::from_db(sqlx::Error::RowNotFound, "dup");
        assert!(matches!(err, Error::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::NotFound("x".into()).is_client_error());
        assert!(Error::Forbidden("x".into()).is_client_error());
        assert!(Error::InvalidInput("x".into()).is_client_error());
        assert!(Error::Conflict("x".into()).is_client_error());
        assert!(!Error::Tagger("x".into()).is_client_error());
        assert!(!Error::Internal("x".into()).is_client_error());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
