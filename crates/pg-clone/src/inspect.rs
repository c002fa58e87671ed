//! Metadata inspection for pre-flight display and post-load summaries.
//!
//! Nothing here is on the hot path. Every query failure degrades the value
//! to "unknown" and is logged, so a partial report is still produced.

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::Result;
use crate::query::{qualify_table, quote_literal, scalar_i64, QueryExecutor};

/// Headline numbers for one database.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSummary {
    /// Database name as reported by the server, or the endpoint name if unknown.
    pub identifier: String,
    pub table_count: Option<i64>,
    /// Human-readable size (`pg_size_pretty`).
    pub storage_size: Option<String>,
}

/// Row count for one table. `rows` is `None` when the count query failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: Option<i64>,
}

impl TableCount {
    /// Count for display, `?` when unknown.
    pub fn rows_display(&self) -> String {
        self.rows.map_or_else(|| "?".to_string(), |r| r.to_string())
    }
}

/// All per-table counts plus totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableInventory {
    pub tables: Vec<TableCount>,
    /// Sum over tables with a known count.
    pub total_rows: i64,
    /// Tables whose count could not be read.
    pub unknown: usize,
}

impl TableInventory {
    pub fn from_counts(tables: Vec<TableCount>) -> Self {
        let total_rows = tables.iter().filter_map(|t| t.rows).sum();
        let unknown = tables.iter().filter(|t| t.rows.is_none()).count();
        Self {
            tables,
            total_rows,
            unknown,
        }
    }
}

/// Source-vs-target count for one table.
#[derive(Debug, Clone, Serialize)]
pub struct CountComparison {
    pub table: String,
    pub source_rows: Option<i64>,
    pub target_rows: Option<i64>,
}

impl CountComparison {
    /// Both counts known and equal.
    pub fn matches(&self) -> bool {
        matches!((self.source_rows, self.target_rows), (Some(s), Some(t)) if s == t)
    }
}

/// Queries table inventory, row counts and storage size for one endpoint.
pub struct MetadataInspector<'a> {
    executor: &'a dyn QueryExecutor,
    schema: String,
}

impl<'a> MetadataInspector<'a> {
    pub fn new(executor: &'a dyn QueryExecutor, schema: impl Into<String>) -> Self {
        Self {
            executor,
            schema: schema.into(),
        }
    }

    /// Database name, table count and size. Never fails.
    pub async fn summarize(&self) -> DatabaseSummary {
        let (identifier, storage_size) = match self
            .executor
            .query(
                "SELECT current_database(), pg_size_pretty(pg_database_size(current_database()))",
            )
            .await
        {
            Ok(rows) => {
                let row = rows.into_iter().next().unwrap_or_default();
                let mut cols = row.into_iter();
                (cols.next().flatten(), cols.next().flatten())
            }
            Err(e) => {
                warn!("{}: could not read database size: {}", self.executor.name(), e);
                (None, None)
            }
        };

        let table_count = match self.count_tables().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("{}: could not count tables: {}", self.executor.name(), e);
                None
            }
        };

        DatabaseSummary {
            identifier: identifier.unwrap_or_else(|| self.executor.name()),
            table_count,
            storage_size,
        }
    }

    async fn count_tables(&self) -> Result<i64> {
        let sql = format!(
            "SELECT count(*) FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE'",
            quote_literal(&self.schema)
        );
        scalar_i64(&self.executor.query(&sql).await?)
    }

    /// Base tables in the inspected schema, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE' ORDER BY table_name",
            quote_literal(&self.schema)
        );
        let rows = self.executor.query(&sql).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.into_iter().next().flatten())
            .collect())
    }

    /// Exact row count for one table.
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {}", qualify_table(&self.schema, table));
        scalar_i64(&self.executor.query(&sql).await?)
    }

    /// Lazily yields one count per table, issuing one query per table as it
    /// is polled. A failed catalog read yields nothing.
    pub fn per_table_counts(&self) -> impl Stream<Item = TableCount> + Send + '_ {
        stream::once(self.list_tables())
            .flat_map(move |listed| {
                let tables = listed.unwrap_or_else(|e| {
                    warn!("{}: could not list tables: {}", self.executor.name(), e);
                    Vec::new()
                });
                stream::iter(tables)
            })
            .then(move |table| async move {
                let rows = match self.count_rows(&table).await {
                    Ok(n) => Some(n),
                    Err(e) => {
                        warn!("{}: could not count {}: {}", self.executor.name(), table, e);
                        None
                    }
                };
                TableCount { table, rows }
            })
    }

    /// Drain `per_table_counts` into an inventory.
    pub async fn inventory(&self) -> TableInventory {
        TableInventory::from_counts(self.per_table_counts().collect().await)
    }
}

/// Pair up source and target counts by table name.
pub fn compare_counts(source: &TableInventory, target: &TableInventory) -> Vec<CountComparison> {
    let mut merged: BTreeMap<&str, (Option<i64>, Option<i64>)> = BTreeMap::new();
    for t in &source.tables {
        merged.entry(t.table.as_str()).or_default().0 = t.rows;
    }
    for t in &target.tables {
        merged.entry(t.table.as_str()).or_default().1 = t.rows;
    }
    merged
        .into_iter()
        .map(|(table, (source_rows, target_rows))| CountComparison {
            table: table.to_string(),
            source_rows,
            target_rows,
        })
        .collect()
}
