//! Validation: detecting drift between resolved scripts and applied history.

use std::fmt;

use serde::Serialize;

use crate::history::MigrationKind;
use crate::info::{MigrationInfos, MigrationState};
use crate::resolver::ResolvedMigration;
use crate::version::Version;

/// One divergence between the resolved scripts and the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValidationMismatch {
    /// The script content changed after it was applied.
    Checksum {
        /// Affected version.
        version: Version,
        /// Checksum recorded at application time.
        applied: Option<u32>,
        /// Checksum of the current script.
        resolved: Option<u32>,
    },
    /// The description changed after it was applied.
    Description {
        /// Affected version.
        version: Version,
        /// Description recorded at application time.
        applied: String,
        /// Description of the current script.
        resolved: String,
    },
    /// The migration kind changed after it was applied.
    Kind {
        /// Affected version.
        version: Version,
        /// Kind recorded at application time.
        applied: MigrationKind,
        /// Kind of the current script.
        resolved: MigrationKind,
    },
    /// A ledger row has no resolved counterpart.
    NotResolved {
        /// Affected version.
        version: Version,
    },
    /// A resolved migration sits below the latest applied version and
    /// out-of-order execution is disabled.
    Ignored {
        /// Affected version.
        version: Version,
    },
}

impl fmt::Display for ValidationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checksum {
                version,
                applied,
                resolved,
            } => write!(
                f,
                "checksum mismatch for version {version} (applied {applied:?}, resolved {resolved:?})"
            ),
            Self::Description {
                version,
                applied,
                resolved,
            } => write!(
                f,
                "description mismatch for version {version} (applied '{applied}', resolved '{resolved}')"
            ),
            Self::Kind {
                version,
                applied,
                resolved,
            } => write!(
                f,
                "kind mismatch for version {version} (applied {applied}, resolved {resolved})"
            ),
            Self::NotResolved { version } => {
                write!(f, "applied migration {version} is not resolved locally")
            }
            Self::Ignored { version } => write!(
                f,
                "migration {version} resolved below the latest applied version"
            ),
        }
    }
}

/// Validation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Also flag applied rows whose script disappeared from the sources
    /// even when they sit within the resolved version range.
    pub strict: bool,
}

/// Collect every mismatch between classified infos and the resolved set.
///
/// Pure; does not touch the database. Successful rows are compared
/// field-by-field against their resolved counterpart; rows above the
/// resolved range are always flagged, in-range missing rows only under
/// strict validation.
pub fn check(
    infos: &MigrationInfos,
    resolved: &[ResolvedMigration],
    options: ValidateOptions,
) -> Vec<ValidationMismatch> {
    let mut mismatches = Vec::new();

    for info in infos.all() {
        match info.state {
            MigrationState::Success | MigrationState::OutOfOrder if info.is_applied() => {
                let Some(row) = &info.applied else {
                    continue;
                };
                let Some(current) = resolved.iter().find(|m| m.version == row.version) else {
                    continue;
                };
                if row.checksum != Some(current.checksum) {
                    mismatches.push(ValidationMismatch::Checksum {
                        version: row.version.clone(),
                        applied: row.checksum,
                        resolved: Some(current.checksum),
                    });
                }
                if row.description != current.description {
                    mismatches.push(ValidationMismatch::Description {
                        version: row.version.clone(),
                        applied: row.description.clone(),
                        resolved: current.description.clone(),
                    });
                }
                if row.kind != current.kind {
                    mismatches.push(ValidationMismatch::Kind {
                        version: row.version.clone(),
                        applied: row.kind,
                        resolved: current.kind,
                    });
                }
            }
            MigrationState::FutureSuccess | MigrationState::FutureFailed => {
                mismatches.push(ValidationMismatch::NotResolved {
                    version: info.version.clone(),
                });
            }
            MigrationState::Missing if options.strict => {
                mismatches.push(ValidationMismatch::NotResolved {
                    version: info.version.clone(),
                });
            }
            MigrationState::Ignored => {
                mismatches.push(ValidationMismatch::Ignored {
                    version: info.version.clone(),
                });
            }
            _ => {}
        }
    }

    mismatches
}
