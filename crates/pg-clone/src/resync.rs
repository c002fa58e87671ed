//! Sequence resynchronization.
//!
//! pg_restore copies row data but leaves each owned sequence at whatever
//! value the archive recorded (or at 1 for data-only loads), so the next
//! insert into a freshly loaded table can collide with an existing key.
//! Every owned sequence is reset to `max(column) + 1`.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::query::{qualify_table, quote_ident, quote_literal, scalar_i64, QueryExecutor};

/// Columns owning a sequence, via serial (`a`) or identity (`i`) dependencies.
const OWNED_SEQUENCES_SQL: &str = "\
SELECT n.nspname, c.relname, a.attname, s.oid::regclass::text \
FROM pg_class s \
JOIN pg_depend d ON d.objid = s.oid AND d.classid = 'pg_class'::regclass \
  AND d.refclassid = 'pg_class'::regclass AND d.deptype IN ('a', 'i') \
JOIN pg_class c ON c.oid = d.refobjid \
JOIN pg_namespace n ON n.oid = c.relnamespace \
JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = d.refobjsubid \
WHERE s.relkind = 'S' \
  AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
  AND n.nspname NOT LIKE 'pg_toast%' \
ORDER BY n.nspname, c.relname, a.attname";

/// A column whose sequence needs resetting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedSequence {
    pub schema: String,
    pub table: String,
    pub column: String,
    /// Regclass text, already quoted as needed.
    pub sequence: String,
}

/// One applied reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceRecord {
    pub table: String,
    pub column: String,
    pub sequence: String,
    /// Value the next `nextval` will return.
    pub value: i64,
}

/// A column whose reset failed.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceFailure {
    pub table: String,
    pub column: String,
    pub sequence: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResyncReport {
    pub applied: Vec<SequenceRecord>,
    pub failed: Vec<SequenceFailure>,
    /// Set when the sequence catalog itself could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_error: Option<String>,
}

impl ResyncReport {
    pub fn resynced(&self) -> usize {
        self.applied.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.discovery_error.is_none()
    }
}

/// Next start for a column with maximum `max`; 1 for an empty table.
pub fn next_start(max: Option<i64>) -> i64 {
    max.map_or(1, |m| m.saturating_add(1))
}

/// Resets owned sequences on one endpoint. Failures are recorded, never raised.
pub struct SequenceResynchronizer<'a> {
    executor: &'a dyn QueryExecutor,
}

impl<'a> SequenceResynchronizer<'a> {
    pub fn new(executor: &'a dyn QueryExecutor) -> Self {
        Self { executor }
    }

    pub async fn discover(&self) -> Result<Vec<OwnedSequence>> {
        let rows = self.executor.query(OWNED_SEQUENCES_SQL).await?;
        rows.into_iter()
            .map(|row| {
                let mut cols = row.into_iter();
                let mut next = |what: &str| {
                    cols.next()
                        .flatten()
                        .ok_or_else(|| MigrateError::metadata(format!("sequence row missing {}", what)))
                };
                Ok(OwnedSequence {
                    schema: next("schema")?,
                    table: next("table")?,
                    column: next("column")?,
                    sequence: next("sequence")?,
                })
            })
            .collect()
    }

    /// Reset one sequence and return the applied record.
    pub async fn resync_one(&self, owned: &OwnedSequence) -> Result<SequenceRecord> {
        let max_sql = format!(
            "SELECT MAX({})::bigint FROM {}",
            quote_ident(&owned.column),
            qualify_table(&owned.schema, &owned.table)
        );
        let rows = self.executor.query(&max_sql).await?;
        let max = match rows.first().and_then(|r| r.first()).and_then(|c| c.as_deref()) {
            None => None,
            Some(_) => Some(scalar_i64(&rows)?),
        };
        let value = next_start(max);

        // is_called = false: the next nextval() returns exactly `value`
        let setval_sql = format!(
            "SELECT setval({}, {}, false)",
            quote_literal(&owned.sequence),
            value
        );
        self.executor.query(&setval_sql).await?;
        debug!("{} -> {}", owned.sequence, value);

        Ok(SequenceRecord {
            table: format!("{}.{}", owned.schema, owned.table),
            column: owned.column.clone(),
            sequence: owned.sequence.clone(),
            value,
        })
    }

    /// Reset every owned sequence, independently.
    pub async fn run(&self) -> ResyncReport {
        let mut report = ResyncReport::default();
        let owned = match self.discover().await {
            Ok(owned) => owned,
            Err(e) => {
                warn!("Could not list sequences on {}: {}", self.executor.name(), e);
                report.discovery_error = Some(e.to_string());
                return report;
            }
        };

        for seq in &owned {
            match self.resync_one(seq).await {
                Ok(record) => report.applied.push(record),
                Err(e) => {
                    warn!(
                        "Could not resync {} ({}.{}): {}",
                        seq.sequence, seq.table, seq.column, e
                    );
                    report.failed.push(SequenceFailure {
                        table: format!("{}.{}", seq.schema, seq.table),
                        column: seq.column.clone(),
                        sequence: seq.sequence.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Resynchronized {} sequence(s), {} failed",
            report.applied.len(),
            report.failed.len()
        );
        report
    }
}
