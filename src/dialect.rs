//! Database adapter interface.
//!
//! The engine never talks to a driver directly. Everything
//! dialect-specific (DDL transaction capability, identifier quoting,
//! schema inspection and cleaning) sits behind [`Database`]. Schema
//! handles are passed explicitly through every call; there is no ambient
//! "current schema" state.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MigrateResult;

/// Explicit handle to one managed schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaName(String);

impl SchemaName {
    /// Create a schema handle.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The schema name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dialect adapter consumed by the engine.
///
/// Implementations wrap a driver/connection pool for one database product.
/// `begin`/`commit`/`rollback` scope one migration script; on dialects
/// without DDL transaction support they may be no-ops, since the engine
/// only calls them when [`supports_ddl_transactions`] returns true.
///
/// [`supports_ddl_transactions`]: Database::supports_ddl_transactions
#[async_trait]
pub trait Database: Send + Sync {
    /// Whether schema-altering statements roll back with a transaction.
    fn supports_ddl_transactions(&self) -> bool;

    /// Quote an identifier for this dialect.
    fn quote(&self, identifier: &str) -> String;

    /// Execute a single statement against a schema.
    async fn execute(&self, schema: &SchemaName, sql: &str) -> MigrateResult<()>;

    /// Begin a transaction on the connection serving this schema.
    async fn begin(&self, schema: &SchemaName) -> MigrateResult<()>;

    /// Commit the open transaction.
    async fn commit(&self, schema: &SchemaName) -> MigrateResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&self, schema: &SchemaName) -> MigrateResult<()>;

    /// Whether the schema exists.
    async fn schema_exists(&self, schema: &SchemaName) -> MigrateResult<bool>;

    /// Whether the schema holds no objects.
    async fn schema_empty(&self, schema: &SchemaName) -> MigrateResult<bool>;

    /// Drop every object in the schema.
    async fn clean_schema(&self, schema: &SchemaName) -> MigrateResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_name_display() {
        let schema = SchemaName::new("app_1");
        assert_eq!(schema.to_string(), "app_1");
        assert_eq!(schema.as_str(), "app_1");
    }
}
