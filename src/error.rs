//! Error types for the storage core.
//!
//! Every backend returns the same typed errors so callers cannot tell
//! backends apart by error shape. The deletion pipeline hands errors back
//! untouched, so matching on the variant is always meaningful.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Key is already bound to a different original URL.
    #[error("short key '{key}' already exists for a different URL")]
    Conflict { key: String },

    /// Key is absent.
    #[error("short key not found: {key}")]
    NotFound { key: String },

    /// Delete attempted by someone other than the record's owner.
    #[error("owner {owner} may not delete short key '{key}'")]
    Forbidden { key: String, owner: u64 },

    /// Journal line could not be decoded during replay.
    #[error("recovery log corrupt at line {line}: {reason}")]
    RecoveryCorrupt { line: usize, reason: String },

    /// Persistence engine unreachable or timed out.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Input is not an absolute URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// SQLite error that is not a constraint violation.
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Journal record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a conflict error.
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }

    /// Create a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a forbidden error.
    pub fn forbidden(key: impl Into<String>, owner: u64) -> Self {
        Self::Forbidden {
            key: key.into(),
            owner,
        }
    }

    /// Create a recovery corruption error for a 1-based line number.
    pub fn recovery_corrupt(line: usize, reason: impl Into<String>) -> Self {
        Self::RecoveryCorrupt {
            line,
            reason: reason.into(),
        }
    }

    /// Create a backend unavailable error.
    pub fn backend_unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable(reason.into())
    }

    /// Returns true for [`Error::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true for [`Error::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`Error::Forbidden`].
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

/// Convert storage error to HTTP status code.
impl Error {
    /// Get the HTTP status code a request handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Conflict { .. } => 409,
            Self::NotFound { .. } | Self::InvalidUrl(_) => 400,
            Self::Forbidden { .. } => 403,
            Self::BackendUnavailable(_) => 503,
            Self::RecoveryCorrupt { .. }
            | Self::Io { .. }
            | Self::Sql(_)
            | Self::Serialization(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::conflict("abc").status_code(), 409);
        assert_eq!(Error::not_found("abc").status_code(), 400);
        assert_eq!(Error::forbidden("abc", 2).status_code(), 403);
        assert_eq!(Error::backend_unavailable("down").status_code(), 503);
        assert_eq!(Error::recovery_corrupt(3, "bad json").status_code(), 500);
    }

    #[test]
    fn test_predicates() {
        assert!(Error::conflict("k").is_conflict());
        assert!(Error::not_found("k").is_not_found());
        assert!(Error::forbidden("k", 1).is_forbidden());
        assert!(!Error::InvalidUrl("x".into()).is_conflict());
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::recovery_corrupt(7, "expected value");
        assert_eq!(
            err.to_string(),
            "recovery log corrupt at line 7: expected value"
        );
    }
}
