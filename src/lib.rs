//! # waymark
//!
//! Forward-only schema migration engine.
//!
//! This crate provides functionality for:
//! - Resolving versioned SQL migration scripts from source locations
//! - Classifying each migration against a persistent history ledger
//! - Applying pending migrations with per-dialect transaction semantics
//! - Validating applied history against the current scripts
//! - Repairing the ledger and baselining existing schemas
//!
//! ## Architecture
//!
//! The engine reconciles the scripts it discovers with the ledger of what
//! was already attempted, then executes whatever is still pending, strictly
//! in version order:
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Script Files │────▶│ Resolver       │────▶│ Classifier  │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                                                    │
//!                              ┌─────────────────────┤
//!                              ▼                     ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ History Ledger │◀────│ Executor    │
//!                      └────────────────┘     └─────────────┘
//! ```
//!
//! The database itself sits behind the [`Database`] adapter trait; the only
//! capability the engine branches on is whether the dialect can roll back
//! DDL. On dialects that can, a failed script leaves no trace; on dialects
//! that cannot, the half-applied attempt is recorded in the ledger and
//! blocks further migration until [`MigrationEngine::repair`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use waymark::{MigrationConfig, MigrationEngine};
//!
//! async fn run() -> waymark::MigrateResult<()> {
//!     let config = MigrationConfig::new()
//!         .locations(["./migrations"])
//!         .schemas(["app"]);
//!
//!     // `db` is your dialect adapter, `history` your ledger store.
//!     let engine = MigrationEngine::new(config, db, history);
//!
//!     let applied = engine.migrate().await?;
//!     println!("applied {applied} migrations");
//!
//!     for info in engine.info().await?.all() {
//!         println!("{} {} {}", info.version, info.state, info.description);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Migration files
//!
//! Scripts are plain SQL files named by convention, scanned recursively
//! from each configured location:
//!
//! ```text
//! migrations/
//! ├── V1__Create_users.sql
//! ├── V1.1__Populate_users.sql
//! └── 2024/
//!     └── V2.0__Add_posts.sql
//! ```

pub mod baseline;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod history;
pub mod info;
pub mod loader;
pub mod lock;
pub mod repair;
pub mod resolver;
pub mod script;
pub mod validate;
pub mod version;

// Re-exports
pub use dialect::{Database, SchemaName};
pub use engine::{MigrationConfig, MigrationEngine};
pub use error::{MigrateResult, MigrationError};
pub use history::{
    AppliedMigration, HistoryPatch, HistoryStore, MemoryHistory, MigrationKind,
    POSTGRES_LEDGER_DDL,
};
pub use info::{ClassifyOptions, MigrationInfo, MigrationInfos, MigrationState, classify};
pub use loader::{FsLoader, ScriptLoader, ScriptSource};
pub use lock::{LocalLock, SchemaLock};
pub use repair::RepairReport;
pub use resolver::{NamingConvention, ResolvedMigration};
pub use script::{SqlScript, SqlStatement};
pub use validate::{ValidateOptions, ValidationMismatch};
pub use version::Version;
