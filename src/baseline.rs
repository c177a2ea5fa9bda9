//! Baseline: seeding the ledger with a synthetic marker migration.

use chrono::Utc;

use crate::error::{MigrateResult, MigrationError};
use crate::history::{AppliedMigration, HistoryStore, MigrationKind};
use crate::version::Version;

/// Insert the synthetic baseline marker at the given version.
///
/// Valid only on a ledger that is empty or already holds exactly this
/// marker (in which case the call is a no-op). Prior migration history at
/// any version conflicts: the marker asserts "treat the schema as already
/// at this version", which contradicts recorded attempts. Caller holds the
/// schema lock.
pub async fn baseline<H: HistoryStore + ?Sized>(
    history: &H,
    version: &Version,
    description: &str,
) -> MigrateResult<()> {
    let rows = history.all().await?;

    if let Some(marker) = rows.iter().find(|r| r.kind == MigrationKind::Baseline) {
        if marker.version == *version {
            tracing::debug!(version = %version, "ledger already baselined at this version");
            return Ok(());
        }
        return Err(MigrationError::baseline(format!(
            "ledger already baselined at version {}, cannot baseline again at {}",
            marker.version, version
        )));
    }

    if let Some(row) = rows.iter().find(|r| r.kind != MigrationKind::Baseline) {
        return Err(MigrationError::baseline(format!(
            "ledger already contains migration {} applied at rank {}; baseline requires an empty history",
            row.version, row.installed_rank
        )));
    }

    let rank = history
        .append(AppliedMigration {
            installed_rank: 0,
            version: version.clone(),
            description: description.to_string(),
            kind: MigrationKind::Baseline,
            script: description.to_string(),
            checksum: None,
            installed_on: Utc::now(),
            execution_time_ms: 0,
            success: true,
        })
        .await?;

    tracing::info!(version = %version, rank, "baselined schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_baseline_empty_ledger() {
        let store = MemoryHistory::new();
        store.ensure_ledger().await.unwrap();

        baseline(&store, &v("99"), "initial import").await.unwrap();

        let rows = store.all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, MigrationKind::Baseline);
        assert_eq!(rows[0].version.to_string(), "99");
        assert_eq!(rows[0].checksum, None);
        assert!(rows[0].success);
    }

    #[tokio::test]
    async fn test_baseline_idempotent_at_same_version() {
        let store = MemoryHistory::new();
        store.ensure_ledger().await.unwrap();

        baseline(&store, &v("2"), "baseline").await.unwrap();
        baseline(&store, &v("2"), "baseline").await.unwrap();
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_baseline_conflicts_with_other_baseline() {
        let store = MemoryHistory::new();
        store.ensure_ledger().await.unwrap();

        baseline(&store, &v("2"), "baseline").await.unwrap();
        let err = baseline(&store, &v("3"), "baseline").await.unwrap_err();
        assert!(matches!(err, MigrationError::Baseline(_)));
    }

    #[tokio::test]
    async fn test_baseline_conflicts_with_prior_history() {
        let store = MemoryHistory::new();
        store.ensure_ledger().await.unwrap();
        store
            .append(AppliedMigration {
                installed_rank: 0,
                version: v("1"),
                description: "first".to_string(),
                kind: MigrationKind::Sql,
                script: "V1__first.sql".to_string(),
                checksum: Some(1),
                installed_on: Utc::now(),
                execution_time_ms: 1,
                success: true,
            })
            .await
            .unwrap();

        let err = baseline(&store, &v("99"), "baseline").await.unwrap_err();
        assert!(matches!(err, MigrationError::Baseline(_)));
    }
}
