//! Error types for lca-finder

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for finder operations
pub type Result<T> = std::result::Result<T, FinderError>;

/// Unified error type for all finder operations
#[derive(Error, Debug, Clone)]
pub enum FinderError {
    /// Bad source, unknown filter key, negative pagination and similar.
    /// Always raised before the store is touched.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Backend failure (connectivity, execution, constraint violation)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FinderError {
    /// Shorthand for an `InvalidQuery` error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        FinderError::InvalidQuery(msg.into())
    }

    /// Returns true if this error was raised by query validation
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, FinderError::InvalidQuery(_))
    }

    /// Returns the wrapped store error, if any
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            FinderError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FinderError {
    fn from(err: serde_json::Error) -> Self {
        FinderError::Serialization(err.to_string())
    }
}

/// Classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Connection refused, closed pool, TLS/protocol failures
    Connectivity,
    /// Pool acquire or statement timeout
    Timeout,
    /// Unique / exclusion constraint violation (SQLSTATE 23505, 23P01)
    Conflict,
    /// Foreign key violation (SQLSTATE 23503)
    ForeignKey,
    /// Not-null / check constraint violation (SQLSTATE 23502, 23514)
    Constraint,
    /// Deadlock detected (SQLSTATE 40P01)
    Deadlock,
    /// Serialization failure, admin shutdown and other class 40 / 57 errors
    Transient,
    /// Any other statement execution failure
    Execution,
    /// Column could not be decoded into a value
    Decode,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Connectivity => "connectivity",
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::ForeignKey => "foreign key violation",
            StoreErrorKind::Constraint => "constraint violation",
            StoreErrorKind::Deadlock => "deadlock",
            StoreErrorKind::Transient => "transient",
            StoreErrorKind::Execution => "execution",
            StoreErrorKind::Decode => "decode",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the backing store, wrapping the backend's error.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Creates a store error without an underlying cause.
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a store error wrapping the backend's error.
    pub fn with_source<E>(kind: StoreErrorKind, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the failure might succeed when issued again.
    ///
    /// Informational only: the finder never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Deadlock | StoreErrorKind::Timeout | StoreErrorKind::Transient
        )
    }

    /// Returns true if this is a constraint violation error
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Conflict | StoreErrorKind::ForeignKey | StoreErrorKind::Constraint
        )
    }
}

// PostgreSQL-specific error conversions (when postgres-errors feature is enabled)
#[cfg(feature = "postgres-errors")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        let kind = match &err {
            Error::Configuration(_) => StoreErrorKind::Connectivity,
            Error::Database(db_err) => {
                // Classify based on PostgreSQL SQLSTATE codes
                // See: https://www.postgresql.org/docs/current/errcodes-appendix.html
                match db_err.code().as_deref() {
                    Some("23505") | Some("23P01") => StoreErrorKind::Conflict,
                    Some("23503") => StoreErrorKind::ForeignKey,
                    Some("23502") | Some("23514") => StoreErrorKind::Constraint,
                    Some("40P01") => StoreErrorKind::Deadlock,
                    Some("57014") => StoreErrorKind::Timeout,
                    Some(code) if code.starts_with("40") => StoreErrorKind::Transient,
                    Some(code) if code.starts_with("08") => StoreErrorKind::Connectivity,
                    Some("57P01") | Some("57P02") | Some("57P03") => StoreErrorKind::Transient,
                    _ => StoreErrorKind::Execution,
                }
            }
            Error::Io(_) | Error::Tls(_) | Error::Protocol(_) | Error::PoolClosed => {
                StoreErrorKind::Connectivity
            }
            Error::PoolTimedOut => StoreErrorKind::Timeout,
            Error::TypeNotFound { .. } | Error::ColumnDecode { .. } | Error::Decode(_) => {
                StoreErrorKind::Decode
            }
            _ => StoreErrorKind::Execution,
        };
        StoreError::with_source(kind, err)
    }
}

#[cfg(feature = "postgres-errors")]
impl From<sqlx::Error> for FinderError {
    fn from(err: sqlx::Error) -> Self {
        FinderError::Store(StoreError::from(err))
    }
}
