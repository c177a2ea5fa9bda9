//! State classification: reconciling resolved migrations with the ledger.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::history::{AppliedMigration, MigrationKind};
use crate::resolver::ResolvedMigration;
use crate::version::Version;

/// Current state of one migration, derived on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    /// Resolved, not applied, above everything applied so far.
    Pending,
    /// Applied (or about to be applied) below a higher already-applied
    /// version.
    OutOfOrder,
    /// Applied successfully.
    Success,
    /// Applied and failed; the schema stopped inside this migration.
    Failed,
    /// Applied successfully, above every resolved version.
    FutureSuccess,
    /// Failed above every resolved version.
    FutureFailed,
    /// Applied, but the script has since disappeared from the sources.
    Missing,
    /// Resolved below the latest applied version with out-of-order disabled.
    Ignored,
    /// The synthetic baseline marker.
    Baseline,
    /// Resolved at or below the baseline version; never executed.
    BelowBaseline,
}

impl MigrationState {
    /// Whether this state represents work `migrate()` will execute.
    pub fn is_pending_work(self) -> bool {
        matches!(self, Self::Pending | Self::OutOfOrder)
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::OutOfOrder => "OUT_OF_ORDER",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::FutureSuccess => "FUTURE_SUCCESS",
            Self::FutureFailed => "FUTURE_FAILED",
            Self::Missing => "MISSING",
            Self::Ignored => "IGNORED",
            Self::Baseline => "BASELINE",
            Self::BelowBaseline => "BELOW_BASELINE",
        };
        f.write_str(name)
    }
}

/// The join of a resolved migration and/or its ledger row, with a state.
///
/// A pure projection: recomputed on every query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationInfo {
    /// Migration version.
    pub version: Version,
    /// Description, from the ledger when applied, else from resolution.
    pub description: String,
    /// Migration kind.
    pub kind: MigrationKind,
    /// Checksum: the applied snapshot when a ledger row exists, else the
    /// freshly-resolved value.
    pub checksum: Option<u32>,
    /// Classified state.
    pub state: MigrationState,
    /// The ledger row, when one exists.
    pub applied: Option<AppliedMigration>,
}

impl MigrationInfo {
    /// Whether a ledger row exists for this migration.
    pub fn is_applied(&self) -> bool {
        self.applied.is_some()
    }

    fn from_row(row: &AppliedMigration, state: MigrationState) -> Self {
        Self {
            version: row.version.clone(),
            description: row.description.clone(),
            kind: row.kind,
            checksum: row.checksum,
            state,
            applied: Some(row.clone()),
        }
    }

    fn from_resolved(migration: &ResolvedMigration, state: MigrationState) -> Self {
        Self {
            version: migration.version.clone(),
            description: migration.description.clone(),
            kind: migration.kind,
            checksum: Some(migration.checksum),
            state,
            applied: None,
        }
    }
}

/// Classification options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyOptions {
    /// Whether migrations below the latest applied version may still run.
    pub out_of_order: bool,
}

/// Ordered set of migration infos for one schema.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationInfos {
    infos: Vec<MigrationInfo>,
}

impl MigrationInfos {
    /// All infos, ordered by version ascending.
    pub fn all(&self) -> &[MigrationInfo] {
        &self.infos
    }

    /// The migration the schema is currently at: the highest-version entry
    /// with a ledger row, including failed attempts and the baseline marker.
    pub fn current(&self) -> Option<&MigrationInfo> {
        self.infos
            .iter()
            .filter(|i| i.is_applied())
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    /// Migrations `migrate()` would execute, in order.
    pub fn pending(&self) -> Vec<&MigrationInfo> {
        self.infos
            .iter()
            .filter(|i| !i.is_applied() && i.state.is_pending_work())
            .collect()
    }

    /// Migrations with a ledger row, in version order.
    pub fn applied(&self) -> Vec<&MigrationInfo> {
        self.infos.iter().filter(|i| i.is_applied()).collect()
    }
}

/// Reconcile resolved migrations with ledger rows into per-migration states.
///
/// Pure over its inputs; the engine recomputes this after every mutation.
pub fn classify(
    resolved: &[ResolvedMigration],
    applied: &[AppliedMigration],
    options: ClassifyOptions,
) -> MigrationInfos {
    let baseline_version = applied
        .iter()
        .filter(|r| r.kind == MigrationKind::Baseline)
        .map(|r| &r.version)
        .max();
    let max_applied = applied.iter().map(|r| &r.version).max();
    let max_resolved = resolved.iter().map(|m| &m.version).max();

    let by_version: HashMap<&Version, &AppliedMigration> =
        applied.iter().map(|r| (&r.version, r)).collect();

    let mut infos = Vec::with_capacity(resolved.len() + applied.len());

    for migration in resolved {
        match by_version.get(&migration.version) {
            Some(row) => {
                let state = if row.kind == MigrationKind::Baseline {
                    MigrationState::Baseline
                } else if !row.success {
                    MigrationState::Failed
                } else if was_applied_out_of_order(applied, row) {
                    MigrationState::OutOfOrder
                } else {
                    MigrationState::Success
                };
                infos.push(MigrationInfo::from_row(row, state));
            }
            None => {
                let state = if baseline_version.is_some_and(|b| migration.version <= *b) {
                    MigrationState::BelowBaseline
                } else if max_applied.is_some_and(|max| migration.version < *max) {
                    if options.out_of_order {
                        MigrationState::OutOfOrder
                    } else {
                        MigrationState::Ignored
                    }
                } else {
                    MigrationState::Pending
                };
                infos.push(MigrationInfo::from_resolved(migration, state));
            }
        }
    }

    let resolved_versions: HashMap<&Version, ()> =
        resolved.iter().map(|m| (&m.version, ())).collect();

    for row in applied {
        if resolved_versions.contains_key(&row.version) {
            continue;
        }
        let state = if row.kind == MigrationKind::Baseline {
            MigrationState::Baseline
        } else if row.success {
            if max_resolved.is_none_or(|max| row.version > *max) {
                MigrationState::FutureSuccess
            } else {
                MigrationState::Missing
            }
        } else if max_resolved.is_none_or(|max| row.version > *max) {
            MigrationState::FutureFailed
        } else {
            MigrationState::Failed
        };
        infos.push(MigrationInfo::from_row(row, state));
    }

    infos.sort_by(|a, b| a.version.cmp(&b.version));
    MigrationInfos { infos }
}

/// A successful row was applied out of order when some earlier rank carries
/// a higher version.
fn was_applied_out_of_order(applied: &[AppliedMigration], row: &AppliedMigration) -> bool {
    applied.iter().any(|other| {
        other.kind != MigrationKind::Baseline
            && other.installed_rank < row.installed_rank
            && other.version > row.version
    })
}
