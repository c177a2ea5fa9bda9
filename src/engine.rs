//! The migration engine: configuration and orchestration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::baseline;
use crate::dialect::{Database, SchemaName};
use crate::error::{MigrateResult, MigrationError};
use crate::history::{AppliedMigration, HistoryStore, MigrationKind};
use crate::info::{ClassifyOptions, MigrationInfos, MigrationState, classify};
use crate::loader::{FsLoader, ScriptLoader};
use crate::lock::{LocalLock, SchemaLock, acquire_with_retry};
use crate::repair::{self, RepairReport};
use crate::resolver::{NamingConvention, ResolvedMigration, resolve};
use crate::validate::{self, ValidateOptions};
use crate::version::Version;

/// Configuration for the migration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Script source locations, scanned in order.
    pub locations: Vec<PathBuf>,
    /// Managed schemas; the first is the default target.
    pub schemas: Vec<String>,
    /// Name of the history ledger table.
    pub history_table: String,
    /// `${key}` placeholder substitutions applied to script text before
    /// checksum computation and execution.
    pub placeholders: HashMap<String, String>,
    /// Version prefix of SQL migration file names.
    pub sql_migration_prefix: String,
    /// Version/description separator of SQL migration file names.
    pub sql_migration_separator: String,
    /// Suffix of SQL migration file names.
    pub sql_migration_suffix: String,
    /// Allow applying migrations below the latest applied version.
    pub out_of_order: bool,
    /// Tolerate a failed ledger row above every resolved version.
    pub ignore_failed_future_migration: bool,
    /// Run validation as part of `migrate()`.
    pub validate_on_migrate: bool,
    /// On validation failure during `migrate()`, clean the schemas and
    /// start over instead of erroring.
    pub clean_on_validation_error: bool,
    /// Also treat in-range missing scripts as validation failures.
    pub strict_validation: bool,
    /// Baseline a non-empty schema with no history before migrating.
    pub baseline_on_migrate: bool,
    /// Version used by `baseline_on_migrate`.
    pub baseline_version: Version,
    /// Description used by `baseline_on_migrate`.
    pub baseline_description: String,
    /// Attempts to take the schema lock before giving up.
    pub lock_retry_attempts: u32,
    /// Initial lock retry interval in milliseconds; doubles per attempt.
    pub lock_retry_interval_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            locations: vec![PathBuf::from("./migrations")],
            schemas: vec!["public".to_string()],
            history_table: "waymark_history".to_string(),
            placeholders: HashMap::new(),
            sql_migration_prefix: "V".to_string(),
            sql_migration_separator: "__".to_string(),
            sql_migration_suffix: ".sql".to_string(),
            out_of_order: false,
            ignore_failed_future_migration: false,
            validate_on_migrate: true,
            clean_on_validation_error: false,
            strict_validation: false,
            baseline_on_migrate: false,
            baseline_version: Version::parse("1").expect("static version"),
            baseline_description: "baseline".to_string(),
            lock_retry_attempts: 10,
            lock_retry_interval_ms: 100,
        }
    }
}

impl MigrationConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> MigrateResult<Self> {
        toml::from_str(content).map_err(|e| MigrationError::config(e.to_string()))
    }

    /// Set the script source locations.
    pub fn locations(mut self, locations: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.locations = locations.into_iter().map(Into::into).collect();
        self
    }

    /// Set the managed schemas; the first is the default target.
    pub fn schemas(mut self, schemas: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Set the history ledger table name.
    pub fn history_table(mut self, table: impl Into<String>) -> Self {
        self.history_table = table.into();
        self
    }

    /// Set the placeholder substitutions.
    pub fn placeholders(mut self, placeholders: HashMap<String, String>) -> Self {
        self.placeholders = placeholders;
        self
    }

    /// Set the SQL migration file name prefix.
    pub fn sql_migration_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sql_migration_prefix = prefix.into();
        self
    }

    /// Allow out-of-order execution.
    pub fn out_of_order(mut self, allow: bool) -> Self {
        self.out_of_order = allow;
        self
    }

    /// Tolerate failed future migrations.
    pub fn ignore_failed_future_migration(mut self, ignore: bool) -> Self {
        self.ignore_failed_future_migration = ignore;
        self
    }

    /// Enable or disable validation during `migrate()`.
    pub fn validate_on_migrate(mut self, validate: bool) -> Self {
        self.validate_on_migrate = validate;
        self
    }

    /// Clean the schemas when validation fails during `migrate()`.
    pub fn clean_on_validation_error(mut self, clean: bool) -> Self {
        self.clean_on_validation_error = clean;
        self
    }

    /// Treat in-range missing scripts as validation failures.
    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    /// Baseline non-empty schemas with no history during `migrate()`.
    pub fn baseline_on_migrate(mut self, baseline: bool) -> Self {
        self.baseline_on_migrate = baseline;
        self
    }

    /// Set the version used by `baseline_on_migrate`.
    pub fn baseline_version(mut self, version: Version) -> Self {
        self.baseline_version = version;
        self
    }

    /// The default target schema (first configured).
    pub fn default_schema(&self) -> SchemaName {
        SchemaName::new(self.schemas.first().cloned().unwrap_or_default())
    }

    fn naming(&self) -> NamingConvention {
        NamingConvention {
            prefix: self.sql_migration_prefix.clone(),
            separator: self.sql_migration_separator.clone(),
            suffix: self.sql_migration_suffix.clone(),
        }
    }
}

/// The migration engine.
///
/// Orchestrates resolution, classification and execution against one
/// database adapter and one history ledger. `migrate()`, `repair()` and
/// `baseline()` serialize through a schema-scoped advisory lock; `info()`
/// and `validate()` are lock-free reads.
pub struct MigrationEngine<D: Database, H: HistoryStore> {
    config: MigrationConfig,
    db: D,
    history: H,
    loader: Box<dyn ScriptLoader>,
    lock: Box<dyn SchemaLock>,
}

impl<D: Database, H: HistoryStore> MigrationEngine<D, H> {
    /// Create an engine with the filesystem loader and a process-local lock.
    pub fn new(config: MigrationConfig, db: D, history: H) -> Self {
        Self {
            config,
            db,
            history,
            loader: Box::new(FsLoader::new()),
            lock: Box::new(LocalLock::new()),
        }
    }

    /// Replace the script loader.
    pub fn with_loader(mut self, loader: impl ScriptLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Replace the schema lock, e.g. with a dialect-native advisory lock.
    pub fn with_lock(mut self, lock: impl SchemaLock + 'static) -> Self {
        self.lock = Box::new(lock);
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut MigrationConfig {
        &mut self.config
    }

    /// Resolve and classify without mutating anything.
    pub async fn info(&self) -> MigrateResult<MigrationInfos> {
        let resolved = self.resolve().await?;
        let applied = self.history.all().await?;
        Ok(classify(&resolved, &applied, self.classify_options()))
    }

    /// Check resolved scripts against applied history.
    ///
    /// Read-only; a non-empty mismatch list surfaces as
    /// [`MigrationError::Validation`].
    pub async fn validate(&self) -> MigrateResult<()> {
        let resolved = self.resolve().await?;
        let applied = self.history.all().await?;
        let infos = classify(&resolved, &applied, self.classify_options());
        let mismatches = validate::check(&infos, &resolved, self.validate_options());
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::Validation(mismatches))
        }
    }

    /// Apply pending migrations; returns how many were applied.
    pub async fn migrate(&self) -> MigrateResult<usize> {
        self.acquire_lock().await?;
        let result = self.migrate_under_lock().await;
        self.release_lock().await;
        result
    }

    /// Reconcile ledger metadata with the resolver's current view.
    pub async fn repair(&self) -> MigrateResult<RepairReport> {
        self.acquire_lock().await?;
        let result = self.repair_under_lock().await;
        self.release_lock().await;
        result
    }

    /// Seed the ledger with a synthetic marker at the given version.
    pub async fn baseline(&self, version: Version, description: &str) -> MigrateResult<()> {
        self.acquire_lock().await?;
        let result = self.baseline_under_lock(&version, description).await;
        self.release_lock().await;
        result
    }

    /// Drop every object in the managed schemas and reset the ledger.
    pub async fn clean(&self) -> MigrateResult<()> {
        self.acquire_lock().await?;
        let result = self.clean_all().await;
        self.release_lock().await;
        result
    }

    async fn migrate_under_lock(&self) -> MigrateResult<usize> {
        self.history.ensure_ledger().await?;
        let resolved = self.resolve().await?;
        let mut applied = self.history.all().await?;

        if self.config.baseline_on_migrate && applied.is_empty() {
            let schema = self.config.default_schema();
            if !self.db.schema_empty(&schema).await? {
                baseline::baseline(
                    &self.history,
                    &self.config.baseline_version,
                    &self.config.baseline_description,
                )
                .await?;
                applied = self.history.all().await?;
            }
        }

        let mut infos = classify(&resolved, &applied, self.classify_options());

        if self.config.validate_on_migrate {
            let mismatches = validate::check(&infos, &resolved, self.validate_options());
            if !mismatches.is_empty() {
                if self.config.clean_on_validation_error {
                    tracing::warn!(
                        mismatches = mismatches.len(),
                        "validation failed, cleaning configured schemas"
                    );
                    self.clean_all().await?;
                    infos = classify(&resolved, &[], self.classify_options());
                } else {
                    return Err(MigrationError::Validation(mismatches));
                }
            }
        }

        self.check_blocking_states(&infos)?;

        let work: Vec<&ResolvedMigration> = infos
            .pending()
            .iter()
            .filter_map(|info| resolved.iter().find(|m| m.version == info.version))
            .collect();

        tracing::debug!(
            resolved = resolved.len(),
            pending = work.len(),
            "classified migrations"
        );

        let mut count = 0;
        for migration in work {
            self.apply_one(migration).await?;
            count += 1;
        }

        if count > 0 {
            tracing::info!(count, "schema migrated");
        } else {
            tracing::info!("schema is up to date");
        }
        Ok(count)
    }

    /// Blocking-state precedence: a failed row always wins, then a failed
    /// future row (unless tolerated), then an ignored resolved migration.
    fn check_blocking_states(&self, infos: &MigrationInfos) -> MigrateResult<()> {
        if let Some(info) = infos
            .all()
            .iter()
            .find(|i| i.state == MigrationState::Failed)
        {
            return Err(MigrationError::FailedMigration(info.version.clone()));
        }
        if !self.config.ignore_failed_future_migration
            && let Some(info) = infos
                .all()
                .iter()
                .find(|i| i.state == MigrationState::FutureFailed)
        {
            return Err(MigrationError::FutureFailedMigration(info.version.clone()));
        }
        if let Some(info) = infos
            .all()
            .iter()
            .find(|i| i.state == MigrationState::Ignored)
        {
            return Err(MigrationError::IgnoredMigration(info.version.clone()));
        }
        Ok(())
    }

    /// Execute one migration script as a single logical unit.
    async fn apply_one(&self, migration: &ResolvedMigration) -> MigrateResult<()> {
        let schema = self.config.default_schema();
        tracing::info!(
            version = %migration.version,
            script = %migration.script,
            "applying migration"
        );
        let started = Instant::now();

        if self.db.supports_ddl_transactions() {
            self.db.begin(&schema).await?;
            if let Err(err) = self.run_statements(&schema, migration).await {
                // The whole script rolls back; history stays untouched and
                // the migration reverts to pending.
                self.db.rollback(&schema).await?;
                return Err(err);
            }
            self.db.commit(&schema).await?;
        } else if let Err(err) = self.run_statements(&schema, migration).await {
            // Effects of the statements before the failure persist. Record
            // the half-applied attempt so operators can see where the
            // schema stopped; it blocks migration until repaired.
            let elapsed = started.elapsed().as_millis() as i64;
            self.history
                .append(self.history_row(migration, false, elapsed))
                .await?;
            return Err(err);
        }

        let elapsed = started.elapsed().as_millis() as i64;
        self.history
            .append(self.history_row(migration, true, elapsed))
            .await?;
        Ok(())
    }

    async fn run_statements(
        &self,
        schema: &SchemaName,
        migration: &ResolvedMigration,
    ) -> MigrateResult<()> {
        for statement in &migration.sql.statements {
            if let Err(err) = self.db.execute(schema, &statement.sql).await {
                return Err(MigrationError::ScriptExecution {
                    version: Some(migration.version.clone()),
                    script: migration.script.clone(),
                    line: statement.line,
                    statement: statement.sql.clone(),
                    source: Box::new(err),
                });
            }
        }
        Ok(())
    }

    fn history_row(
        &self,
        migration: &ResolvedMigration,
        success: bool,
        execution_time_ms: i64,
    ) -> AppliedMigration {
        AppliedMigration {
            installed_rank: 0,
            version: migration.version.clone(),
            description: migration.description.clone(),
            kind: MigrationKind::Sql,
            script: migration.script.clone(),
            checksum: Some(migration.checksum),
            installed_on: Utc::now(),
            execution_time_ms,
            success,
        }
    }

    async fn repair_under_lock(&self) -> MigrateResult<RepairReport> {
        self.history.ensure_ledger().await?;
        let resolved = self.resolve().await?;
        repair::repair(&self.history, &resolved).await
    }

    async fn baseline_under_lock(
        &self,
        version: &Version,
        description: &str,
    ) -> MigrateResult<()> {
        self.history.ensure_ledger().await?;
        baseline::baseline(&self.history, version, description).await
    }

    async fn clean_all(&self) -> MigrateResult<()> {
        for schema in &self.config.schemas {
            let schema = SchemaName::new(schema.clone());
            if !self.db.schema_exists(&schema).await? {
                continue;
            }
            self.db.clean_schema(&schema).await?;
            tracing::info!(schema = %schema, "cleaned schema");
        }
        self.history.clear().await?;
        self.history.ensure_ledger().await?;
        Ok(())
    }

    async fn resolve(&self) -> MigrateResult<Vec<ResolvedMigration>> {
        let sources = self.loader.load(&self.config.locations).await?;
        resolve(&sources, &self.config.naming(), &self.config.placeholders)
    }

    fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions {
            out_of_order: self.config.out_of_order,
        }
    }

    fn validate_options(&self) -> ValidateOptions {
        ValidateOptions {
            strict: self.config.strict_validation,
        }
    }

    async fn acquire_lock(&self) -> MigrateResult<()> {
        acquire_with_retry(
            self.lock.as_ref(),
            self.config.lock_retry_attempts,
            Duration::from_millis(self.config.lock_retry_interval_ms),
        )
        .await
    }

    async fn release_lock(&self) {
        if let Err(err) = self.lock.release().await {
            tracing::warn!(error = %err, "failed to release migration lock");
        }
    }
}
