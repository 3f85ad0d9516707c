//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Download backend error: {0}")]
    Backend(String),

    #[error("Candidate discovery error: {0}")]
    Discovery(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} ({}): {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Underlying IO error kind, if this error wraps one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io(e) => Some(e.kind()),
            Self::IoPath { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_errors_convert() {
        let err: Error = sqlx::migrate::MigrateError::VersionMissing(20260101000000).into();
        assert!(matches!(err, Error::Migration(_)));
        assert!(err.to_string().starts_with("Migration error"));
    }

    #[test]
    fn test_io_path_display_includes_op_and_path() {
        let err = Error::io_path(
            "moving payload",
            Path::new("/tmp/x"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        let msg = err.to_string();
        assert!(msg.contains("moving payload"));
        assert!(msg.contains("/tmp/x"));
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::InvalidStateTransition {
            from: "Downloaded".into(),
            to: "Pending".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot transition from Downloaded to Pending"
        );
    }
}
