//! Migration resolution: turning raw script sources into an ordered set of
//! versioned migration descriptors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::history::MigrationKind;
use crate::loader::ScriptSource;
use crate::script::{self, SqlScript};
use crate::version::Version;

/// File naming convention for versioned SQL migrations.
///
/// The default shape is `V{version}__{description}.sql`; underscores in the
/// description render as spaces. Files not matching prefix and suffix are
/// not migrations and are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConvention {
    /// Version prefix, e.g. `V`.
    pub prefix: String,
    /// Version/description separator, e.g. `__`.
    pub separator: String,
    /// File suffix, e.g. `.sql`.
    pub suffix: String,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            prefix: "V".to_string(),
            separator: "__".to_string(),
            suffix: ".sql".to_string(),
        }
    }
}

impl NamingConvention {
    /// Parse a file name into version and description.
    ///
    /// Returns `None` for files outside the convention, and an error for
    /// files that match prefix/suffix but are otherwise malformed.
    pub fn parse(&self, file_name: &str) -> Option<MigrateResult<(Version, String)>> {
        let stem = file_name
            .strip_prefix(&self.prefix)?
            .strip_suffix(&self.suffix)?;

        let Some((version_part, description_part)) = stem.split_once(&self.separator) else {
            return Some(Err(MigrationError::InvalidName {
                name: file_name.to_string(),
                reason: format!("missing '{}' separator", self.separator),
            }));
        };

        let version = match Version::parse(version_part) {
            Ok(v) => v,
            Err(_) => {
                return Some(Err(MigrationError::InvalidName {
                    name: file_name.to_string(),
                    reason: format!("unparsable version '{version_part}'"),
                }));
            }
        };

        Some(Ok((version, description_part.replace('_', " "))))
    }
}

/// A discovered migration, ready for classification and execution.
///
/// Produced fresh on every resolution pass; the checksum always reflects the
/// script's current, placeholder-substituted content.
#[derive(Debug, Clone)]
pub struct ResolvedMigration {
    /// Migration version.
    pub version: Version,
    /// Human-readable description from the file name.
    pub description: String,
    /// Script identifier (file name).
    pub script: String,
    /// Checksum over the substituted script text.
    pub checksum: u32,
    /// The parsed script.
    pub sql: SqlScript,
    /// Migration kind.
    pub kind: MigrationKind,
}

/// Resolve raw sources into migration descriptors, sorted by version.
///
/// Placeholders are substituted before checksum computation. Two sources
/// resolving to the same version is a resolution error, regardless of which
/// locations they came from.
pub fn resolve(
    sources: &[ScriptSource],
    convention: &NamingConvention,
    placeholders: &HashMap<String, String>,
) -> MigrateResult<Vec<ResolvedMigration>> {
    let mut migrations: Vec<ResolvedMigration> = Vec::new();
    let mut seen: HashMap<Version, String> = HashMap::new();

    for source in sources {
        let Some(parsed) = convention.parse(&source.name) else {
            continue;
        };
        let (version, description) = parsed?;

        if let Some(first) = seen.get(&version) {
            return Err(MigrationError::DuplicateVersion {
                version,
                first: first.clone(),
                second: source.name.clone(),
            });
        }
        seen.insert(version.clone(), source.name.clone());

        let text = script::apply_placeholders(&source.content, placeholders);
        let sql = SqlScript::parse(&text);
        let checksum = sql.checksum;

        migrations.push(ResolvedMigration {
            version,
            description,
            script: source.name.clone(),
            checksum,
            sql,
            kind: MigrationKind::Sql,
        });
    }

    migrations.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(migrations)
}
