//! Script source loading.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::MigrateResult;

/// Raw script text discovered at a source location.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    /// The configured location the script was found under.
    pub location: PathBuf,
    /// File name, used by the naming convention.
    pub name: String,
    /// Full path to the script.
    pub path: PathBuf,
    /// Raw script text (UTF-8).
    pub content: String,
}

/// Provides raw script sources to the resolver.
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    /// Load every script under the given locations, in a deterministic order.
    async fn load(&self, locations: &[PathBuf]) -> MigrateResult<Vec<ScriptSource>>;
}

/// Filesystem script loader.
///
/// Walks each location recursively, so scripts may be organized into
/// subdirectories. Locations that do not exist are skipped with a warning;
/// an empty location set simply resolves to no migrations.
#[derive(Debug, Default)]
pub struct FsLoader;

impl FsLoader {
    /// Create a new filesystem loader.
    pub fn new() -> Self {
        Self
    }

    async fn load_location(
        &self,
        location: &Path,
        sources: &mut Vec<ScriptSource>,
    ) -> MigrateResult<()> {
        let mut pending = vec![location.to_path_buf()];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }

        files.sort();

        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await?;
            sources.push(ScriptSource {
                location: location.to_path_buf(),
                name: name.to_string(),
                path: path.clone(),
                content,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ScriptLoader for FsLoader {
    async fn load(&self, locations: &[PathBuf]) -> MigrateResult<Vec<ScriptSource>> {
        let mut sources = Vec::new();
        for location in locations {
            if !location.exists() {
                tracing::warn!(location = %location.display(), "migration location not found, skipping");
                continue;
            }
            self.load_location(location, &mut sources).await?;
        }
        Ok(sources)
    }
}
