//! Schema history: the persistent ledger of migration attempts.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::version::Version;

/// Kind of a migration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MigrationKind {
    /// A versioned SQL script.
    Sql,
    /// A synthetic baseline marker.
    Baseline,
}

impl std::fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sql => f.write_str("SQL"),
            Self::Baseline => f.write_str("BASELINE"),
        }
    }
}

/// A persisted record of one migration attempt.
///
/// Rows are append-only; the only mutation paths are repair (metadata
/// rewrite, failed-row deletion) and baseline (synthetic marker insertion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// Monotonic rank; assignment order equals application order.
    pub installed_rank: i32,
    /// Migration version.
    pub version: Version,
    /// Description at the time of application.
    pub description: String,
    /// Entry kind.
    pub kind: MigrationKind,
    /// Script identifier at the time of application.
    pub script: String,
    /// Checksum snapshot of what was applied; `None` for synthetic entries.
    pub checksum: Option<u32>,
    /// When the attempt was recorded.
    pub installed_on: DateTime<Utc>,
    /// Execution duration in milliseconds.
    pub execution_time_ms: i64,
    /// Whether the script ran to completion.
    pub success: bool,
}

/// Metadata rewrite applied to an existing ledger row during repair.
#[derive(Debug, Clone, Default)]
pub struct HistoryPatch {
    /// New checksum, if it drifted.
    pub checksum: Option<u32>,
    /// New description, if it drifted.
    pub description: Option<String>,
    /// New kind, if it drifted.
    pub kind: Option<MigrationKind>,
}

/// Durable ledger of migration attempts for one schema.
///
/// All reads return a snapshot in rank order. The ledger is created lazily
/// on first use and must tolerate being the very first object in an empty
/// schema.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create the ledger if it does not exist yet.
    async fn ensure_ledger(&self) -> MigrateResult<()>;

    /// Whether the ledger exists.
    async fn has_ledger(&self) -> MigrateResult<bool>;

    /// All rows, ordered by rank. Empty when the ledger does not exist.
    async fn all(&self) -> MigrateResult<Vec<AppliedMigration>>;

    /// Append a row, assigning and returning the next rank. The row's
    /// `installed_rank` field is ignored.
    async fn append(&self, row: AppliedMigration) -> MigrateResult<i32>;

    /// Rewrite metadata of the row at the given rank.
    async fn update(&self, rank: i32, patch: HistoryPatch) -> MigrateResult<()>;

    /// Delete the row at the given rank.
    async fn delete(&self, rank: i32) -> MigrateResult<()>;

    /// Drop the ledger and every row in it.
    async fn clear(&self) -> MigrateResult<()>;
}

/// DDL for a PostgreSQL-backed ledger, under the default table name.
pub const POSTGRES_LEDGER_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS "waymark_history" (
    installed_rank INTEGER PRIMARY KEY,
    version VARCHAR(50) NOT NULL UNIQUE,
    description VARCHAR(200) NOT NULL,
    kind VARCHAR(20) NOT NULL,
    script VARCHAR(1000) NOT NULL,
    checksum BIGINT,
    installed_on TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    execution_time_ms BIGINT NOT NULL DEFAULT 0,
    success BOOLEAN NOT NULL
);

CREATE INDEX IF NOT EXISTS "waymark_history_success_idx"
    ON "waymark_history" (success);
"#;

/// In-memory ledger.
///
/// Reference implementation of [`HistoryStore`], used by the test suite and
/// suitable for embedded targets where history does not need to outlive the
/// process.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    inner: Mutex<MemoryLedger>,
}

#[derive(Debug, Default)]
struct MemoryLedger {
    created: bool,
    rows: Vec<AppliedMigration>,
}

impl MemoryHistory {
    /// Create an empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLedger> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn ensure_ledger(&self) -> MigrateResult<()> {
        self.lock().created = true;
        Ok(())
    }

    async fn has_ledger(&self) -> MigrateResult<bool> {
        Ok(self.lock().created)
    }

    async fn all(&self) -> MigrateResult<Vec<AppliedMigration>> {
        Ok(self.lock().rows.clone())
    }

    async fn append(&self, mut row: AppliedMigration) -> MigrateResult<i32> {
        let mut inner = self.lock();
        if !inner.created {
            return Err(MigrationError::database("schema history does not exist"));
        }
        let rank = inner.rows.iter().map(|r| r.installed_rank).max().unwrap_or(0) + 1;
        row.installed_rank = rank;
        inner.rows.push(row);
        Ok(rank)
    }

    async fn update(&self, rank: i32, patch: HistoryPatch) -> MigrateResult<()> {
        let mut inner = self.lock();
        let row = inner
            .rows
            .iter_mut()
            .find(|r| r.installed_rank == rank)
            .ok_or_else(|| MigrationError::database(format!("no history row at rank {rank}")))?;
        if let Some(checksum) = patch.checksum {
            row.checksum = Some(checksum);
        }
        if let Some(description) = patch.description {
            row.description = description;
        }
        if let Some(kind) = patch.kind {
            row.kind = kind;
        }
        Ok(())
    }

    async fn delete(&self, rank: i32) -> MigrateResult<()> {
        let mut inner = self.lock();
        let before = inner.rows.len();
        inner.rows.retain(|r| r.installed_rank != rank);
        if inner.rows.len() == before {
            return Err(MigrationError::database(format!(
                "no history row at rank {rank}"
            )));
        }
        Ok(())
    }

    async fn clear(&self) -> MigrateResult<()> {
        let mut inner = self.lock();
        inner.rows.clear();
        inner.created = false;
        Ok(())
    }
}
