//! Error types for the migration engine.

use thiserror::Error;

use crate::validate::ValidationMismatch;
use crate::version::Version;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying database/driver error.
    #[error("Database error: {0}")]
    Database(String),

    /// Two scripts resolved to the same version.
    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        /// The colliding version.
        version: Version,
        /// Script that claimed the version first.
        first: String,
        /// Script that collided with it.
        second: String,
    },

    /// A script file name does not follow the naming convention.
    #[error("Invalid migration name '{name}': {reason}")]
    InvalidName {
        /// The offending file name.
        name: String,
        /// Why it could not be parsed.
        reason: String,
    },

    /// Unparsable version string.
    #[error("Invalid migration version '{0}': expected dotted numeric components")]
    InvalidVersion(String),

    /// Applied state diverged from the resolved scripts.
    #[error("Validation failed with {} mismatch(es): {}", .0.len(), summarize(.0))]
    Validation(Vec<ValidationMismatch>),

    /// A statement inside a migration script failed.
    #[error(
        "Migration {} failed at line {}: '{}'",
        display_version(.version),
        .line,
        .statement
    )]
    ScriptExecution {
        /// Version of the failing migration, if versioned.
        version: Option<Version>,
        /// Script identifier.
        script: String,
        /// 1-based line number of the failing statement.
        line: u32,
        /// Verbatim text of the failing statement.
        statement: String,
        /// The underlying driver error.
        #[source]
        source: Box<MigrationError>,
    },

    /// The history contains a failed migration that must be repaired first.
    #[error(
        "Schema history contains a failed migration at version {0}; run repair before migrating"
    )]
    FailedMigration(Version),

    /// A failed migration above all resolved versions blocks migration.
    #[error("Schema history contains a failed future migration at version {0}")]
    FutureFailedMigration(Version),

    /// A resolved migration below the latest applied version cannot run.
    #[error(
        "Migration {0} resolved below the latest applied version; enable out-of-order to apply it"
    )]
    IgnoredMigration(Version),

    /// Could not obtain the schema migration lock.
    #[error("Failed to acquire migration lock: {0}")]
    LockFailed(String),

    /// Baseline conflicts with existing history.
    #[error("Baseline error: {0}")]
    Baseline(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

fn summarize(mismatches: &[ValidationMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn display_version(version: &Option<Version>) -> String {
    version
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "<unversioned>".to_string())
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a lock failed error.
    pub fn lock_failed(msg: impl Into<String>) -> Self {
        Self::LockFailed(msg.into())
    }

    /// Create a baseline error.
    pub fn baseline(msg: impl Into<String>) -> Self {
        Self::Baseline(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error describes a known bad schema state rather than an
    /// infrastructure failure. Business errors are safe for a caller to
    /// retry after operator intervention; infrastructure errors are not.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Self::DuplicateVersion { .. }
                | Self::InvalidName { .. }
                | Self::InvalidVersion(_)
                | Self::Validation(_)
                | Self::ScriptExecution { .. }
                | Self::FailedMigration(_)
                | Self::FutureFailedMigration(_)
                | Self::IgnoredMigration(_)
                | Self::Baseline(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_version_display() {
        let err = MigrationError::DuplicateVersion {
            version: "1.1".parse().unwrap(),
            first: "V1.1__a.sql".to_string(),
            second: "V1.1__b.sql".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("1.1"));
        assert!(msg.contains("V1.1__a.sql"));
        assert!(msg.contains("V1.1__b.sql"));
    }

    #[test]
    fn test_script_execution_carries_line_and_statement() {
        let err = MigrationError::ScriptExecution {
            version: Some("1".parse().unwrap()),
            script: "V1__Should_Fail.sql".to_string(),
            line: 21,
            statement: "THIS IS NOT VALID SQL".to_string(),
            source: Box::new(MigrationError::database("syntax error")),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 21"));
        assert!(msg.contains("THIS IS NOT VALID SQL"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_business() {
        assert!(MigrationError::FailedMigration("3".parse().unwrap()).is_business());
        assert!(MigrationError::Baseline("conflict".to_string()).is_business());
        assert!(!MigrationError::Database("connection refused".to_string()).is_business());
        assert!(!MigrationError::LockFailed("timeout".to_string()).is_business());
    }
}
