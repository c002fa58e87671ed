//! Target preparation for data-only loads.
//!
//! Empties every base table in the target schema in one transaction with
//! triggers (and so FK enforcement) suspended, so table order never matters.

use futures::StreamExt;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::inspect::{MetadataInspector, TableCount};
use crate::query::{qualify_table, QueryExecutor};

/// What a truncation pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TruncationReport {
    pub tables: Vec<String>,
    /// Counts read back after the transaction committed.
    pub remaining: Vec<TableCount>,
}

impl TruncationReport {
    /// Every table reads back as empty.
    pub fn is_empty(&self) -> bool {
        self.remaining.iter().all(|t| t.rows == Some(0))
    }
}

/// Statements of the maintenance transaction that truncates `tables`.
pub fn truncate_statements(schema: &str, tables: &[String]) -> Vec<String> {
    let targets: Vec<String> = tables.iter().map(|t| qualify_table(schema, t)).collect();
    vec![
        "SET session_replication_role = 'replica'".to_string(),
        format!("TRUNCATE TABLE {} CASCADE", targets.join(", ")),
        "SET session_replication_role = 'origin'".to_string(),
    ]
}

/// Truncate every table in `schema` on the target.
///
/// On failure the transaction is rolled back on the same connection and the
/// error returned for the caller to downgrade to a warning.
pub async fn truncate_target(
    executor: &dyn QueryExecutor,
    schema: &str,
) -> Result<TruncationReport> {
    let inspector = MetadataInspector::new(executor, schema);
    let tables = inspector.list_tables().await?;
    if tables.is_empty() {
        info!("No tables in {}.{}, nothing to truncate", executor.name(), schema);
        return Ok(TruncationReport::default());
    }

    info!("Truncating {} table(s) on {}", tables.len(), executor.name());
    if let Err(e) = executor
        .execute_transaction(&truncate_statements(schema, &tables))
        .await
    {
        warn!("Truncation of {} rolled back: {}", executor.name(), e);
        return Err(e);
    }

    let remaining = inspector.per_table_counts().collect().await;
    Ok(TruncationReport { tables, remaining })
}
