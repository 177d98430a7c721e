//! Error handling for the OpalDB catalog.
//!
//! Provides the unified [`OpalError`] type and the [`OpalResult`] alias used
//! across all catalog components. Errors surface to the caller immediately;
//! the catalog performs no automatic retries.

use std::fmt;

use thiserror::Error;

/// Result type alias for catalog operations.
pub type OpalResult<T> = std::result::Result<T, OpalError>;

/// The kind of named entity an operation failed to resolve or create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// A database.
    Database,
    /// A table.
    Table,
    /// A column.
    Column,
    /// A secondary index.
    Index,
    /// A user account.
    User,
    /// A stored procedure.
    Procedure,
    /// A privilege grant.
    Privilege,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Database => "database",
            Entity::Table => "table",
            Entity::Column => "column",
            Entity::Index => "index",
            Entity::User => "user",
            Entity::Procedure => "procedure",
            Entity::Privilege => "privilege",
        };
        f.write_str(name)
    }
}

/// The main error type for catalog operations.
#[derive(Debug, Error)]
pub enum OpalError {
    /// A named entity does not exist.
    #[error("{entity} '{name}' does not exist")]
    NotFound {
        /// Kind of the missing entity.
        entity: Entity,
        /// Name that failed to resolve.
        name: String,
    },

    /// Create of an entity that already exists.
    #[error("{entity} '{name}' already exists")]
    AlreadyExists {
        /// Kind of the conflicting entity.
        entity: Entity,
        /// Conflicting name.
        name: String,
    },

    /// Type, length, precision, scale, or nullability mismatch.
    #[error("schema violation: {message}")]
    SchemaViolation {
        /// What was violated.
        message: String,
    },

    /// Insert would duplicate a unique-indexed value.
    #[error("row with {column} {value} already exists")]
    UniquenessViolation {
        /// The unique column.
        column: String,
        /// Stringified duplicate value.
        value: String,
    },

    /// Foreign-key target table or index missing.
    #[error("foreign key constraint violation on column {column}: {message}")]
    ReferenceViolation {
        /// The referencing column.
        column: String,
        /// What was missing.
        message: String,
    },

    /// User missing or password mismatch.
    #[error("authentication failed for user '{username}'")]
    AuthFailure {
        /// The user that failed to authenticate.
        username: String,
    },

    /// Privilege check failed; surfaced by callers of `has_privilege`.
    #[error("user '{username}' denied: {message}")]
    PrivilegeDenied {
        /// The denied user.
        username: String,
        /// What was denied.
        message: String,
    },

    /// Underlying filesystem, pager, or B-tree failure.
    #[error("I/O error: {source}")]
    Io {
        /// The wrapped I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Decode failure of a row, schema, index, or users file.
    #[error("corrupted {what}: {message}")]
    Corruption {
        /// What failed to decode.
        what: String,
        /// Decoder diagnostic.
        message: String,
    },

    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl OpalError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(entity: Entity, name: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            name: name.into(),
        }
    }

    /// Creates an already-exists error.
    #[must_use]
    pub fn already_exists(entity: Entity, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            name: name.into(),
        }
    }

    /// Creates a schema violation error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corruption {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error is a uniqueness or reference violation.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::UniquenessViolation { .. } | Self::ReferenceViolation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OpalError::not_found(Entity::Table, "users");
        assert_eq!(err.to_string(), "table 'users' does not exist");

        let err = OpalError::UniquenessViolation {
            column: "id".to_string(),
            value: "42".to_string(),
        };
        assert_eq!(err.to_string(), "row with id 42 already exists");
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: OpalError = io_err.into();
        assert!(matches!(err, OpalError::Io { .. }));
    }

    #[test]
    fn test_constraint_violation() {
        let err = OpalError::UniquenessViolation {
            column: "id".to_string(),
            value: "1".to_string(),
        };
        assert!(err.is_constraint_violation());
        assert!(!OpalError::not_found(Entity::User, "u").is_constraint_violation());
    }
}
