//! # pg-clone
//!
//! Parallel PostgreSQL-to-PostgreSQL migration built on `pg_dump` and
//! `pg_restore`.
//!
//! The library sequences one run end to end:
//!
//! - **Verification** of both endpoints before anything is written
//! - **Extraction** with `pg_dump` into a custom-format archive
//! - **Parallel load** with `pg_restore --jobs`, telling ignorable warnings
//!   apart from fatal errors
//! - **Sequence resynchronization** so the next insert never collides
//! - **Progress** derived from the archive size and the restore log
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_clone::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> pg_clone::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let result = Orchestrator::new(config)?.run().await?;
//!     println!("Loaded {} rows into {} tables", result.rows_total, result.tables_total);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod inspect;
pub mod orchestrator;
pub mod plan;
pub mod prepare;
pub mod query;
pub mod resync;
pub mod stage;
pub mod tls;
pub mod tools;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, EndpointConfig, MigrationConfig, MigrationMode};
pub use error::{MigrateError, Result};
pub use inspect::{CountComparison, DatabaseSummary, MetadataInspector, TableInventory};
pub use orchestrator::{
    AutoConfirm, Confirmation, InspectReport, MigrationPhase, MigrationResult, Orchestrator,
    Preflight,
};
pub use plan::MigrationPlan;
pub use query::{PgExecutor, QueryExecutor};
pub use stage::{ProgressStyle, StageOutcome, StageStatus};
pub use tools::{Tool, Toolchain};
pub use verify::{EndpointRole, HealthCheckResult};
