//! Error types for FlatStore operations
//!
//! Every fallible store operation returns a [`StoreError`]. Missing ids are not
//! errors: they surface as `Ok(false)`, `None` or an empty vector. Row-level CSV
//! problems never reach this type either; the codec drops and logs those rows.

use std::path::PathBuf;

use thiserror::Error;

/// FlatStore error types with detailed context
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// I/O operation failed (read, temp write, sync or rename)
    #[error("I/O error{}: {message} ({kind})", display_path(.path))]
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// A candidate record references a row that does not exist
    #[error("foreign key violation on {relation}: {value} not found")]
    ForeignKey {
        /// Which reference failed, e.g. `engagement.post_id -> post.id`
        relation: &'static str,
        /// The dangling value
        value: String,
    },

    /// Loaded tables reference rows that do not exist; the load was rejected
    #[error("referential integrity violated by {violations} row(s), first: {first}")]
    IntegrityViolation {
        /// Number of dangling references found
        violations: usize,
        /// Description of the first violation
        first: String,
    },

    /// A candidate record or field value breaks a record rule
    #[error("invalid record: {reason}")]
    InvalidRecord {
        /// Which rule was broken
        reason: String,
    },

    /// Username is already held by another user
    #[error("username '{username}' is already taken")]
    DuplicateUsername {
        /// The requested username
        username: String,
    },

    /// View delta would overflow or drive the count negative
    #[error("cannot apply delta {delta} to post {post_id} with {views} views")]
    InvalidViews {
        /// Target post
        post_id: i64,
        /// Current view count
        views: i64,
        /// Requested delta
        delta: i64,
    },

    /// A multi-file rewrite committed some files and could not roll them back.
    /// Disk and memory disagree; operator recovery is required.
    #[error("partial persist: {} file(s) committed before {} failed: {message}", .committed.len(), .failed.display())]
    PartialPersist {
        /// Files already holding the new contents
        committed: Vec<PathBuf>,
        /// File whose commit failed
        failed: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// A parallel load worker panicked
    #[error("loader for table '{table}' panicked")]
    LoaderPanicked {
        /// Table the worker was parsing
        table: &'static str,
    },

    /// Configuration rejected by `StoreConfig::validate`
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Which parameter is wrong
        reason: String,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

impl StoreError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error, what: &str) -> Self {
        StoreError::Io {
            path: Some(path.into()),
            kind: err.kind(),
            message: format!("{}: {}", what, err),
        }
    }

    /// True when on-disk and in-memory state may have diverged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::PartialPersist { .. })
    }

    /// True for failures of the filesystem rather than of the request.
    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io { .. } | StoreError::PartialPersist { .. })
    }
}

/// Convert std::io::Error to StoreError::Io
impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for FlatStore operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::InvalidViews { post_id: 7, views: 3, delta: -10 };
        let display = err.to_string();
        assert!(display.contains("post 7"));
        assert!(display.contains("-10"));

        let err = StoreError::Io {
            path: Some(PathBuf::from("/tmp/posts.csv")),
            kind: std::io::ErrorKind::PermissionDenied,
            message: "rename failed".into(),
        };
        assert!(err.to_string().contains("/tmp/posts.csv"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let store_err: StoreError = io_err.into();

        match store_err {
            StoreError::Io { kind, path, .. } => {
                assert_eq!(kind, std::io::ErrorKind::NotFound);
                assert!(path.is_none());
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        let partial = StoreError::PartialPersist {
            committed: vec![PathBuf::from("users.csv")],
            failed: PathBuf::from("posts.csv"),
            message: "disk full".into(),
        };
        assert!(partial.is_fatal());
        assert!(partial.is_io());
        assert!(partial.to_string().contains("1 file(s)"));

        let fk = StoreError::ForeignKey { relation: "engagement.post_id -> post.id", value: "99".into() };
        assert!(!fk.is_fatal());
        assert!(!fk.is_io());
    }
}
