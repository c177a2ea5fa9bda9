//! Repair: reconciling ledger metadata with the current resolved state.

use serde::Serialize;

use crate::error::MigrateResult;
use crate::history::{HistoryPatch, HistoryStore, MigrationKind};
use crate::resolver::ResolvedMigration;
use crate::version::Version;

/// Summary of the mutations one repair pass performed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    /// Failed rows that were deleted, unblocking `migrate()`.
    pub removed_failed: Vec<Version>,
    /// Rows whose checksum/description/kind were rewritten to the resolved
    /// values.
    pub realigned: Vec<Version>,
}

impl RepairReport {
    /// Whether the pass changed anything.
    pub fn is_empty(&self) -> bool {
        self.removed_failed.is_empty() && self.realigned.is_empty()
    }
}

/// Rewrite the ledger to match the resolver's current view.
///
/// Deletes every `success = false` row (the half-applied marker left by a
/// dialect without DDL transactions) and realigns drifted metadata on
/// successful rows. Never re-executes SQL. Caller holds the schema lock.
pub async fn repair<H: HistoryStore + ?Sized>(
    history: &H,
    resolved: &[ResolvedMigration],
) -> MigrateResult<RepairReport> {
    let mut report = RepairReport::default();

    for row in history.all().await? {
        if row.kind == MigrationKind::Baseline {
            continue;
        }

        if !row.success {
            history.delete(row.installed_rank).await?;
            tracing::info!(version = %row.version, rank = row.installed_rank, "removed failed history row");
            report.removed_failed.push(row.version);
            continue;
        }

        let Some(current) = resolved.iter().find(|m| m.version == row.version) else {
            continue;
        };

        let mut patch = HistoryPatch::default();
        if row.checksum != Some(current.checksum) {
            patch.checksum = Some(current.checksum);
        }
        if row.description != current.description {
            patch.description = Some(current.description.clone());
        }
        if row.kind != current.kind {
            patch.kind = Some(current.kind);
        }

        if patch.checksum.is_some() || patch.description.is_some() || patch.kind.is_some() {
            history.update(row.installed_rank, patch).await?;
            tracing::info!(version = %row.version, "realigned history row with resolved migration");
            report.realigned.push(row.version);
        }
    }

    Ok(report)
}
