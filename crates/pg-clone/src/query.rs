//! Ad-hoc query execution against one endpoint.
//!
//! Results come back as text columns, the same shape `psql -At` prints, so
//! callers parse what they need and degrade gracefully on anything else.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use crate::config::EndpointConfig;
use crate::error::{MigrateError, Result};
use crate::tls::{SslMode, TlsBuilder};

/// One result row, each column as optional text (NULL is `None`).
pub type TextRow = Vec<Option<String>>;

/// Executes statements against a single endpoint.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Identifier shown in logs and summaries (no credentials).
    fn name(&self) -> String;

    /// Run a query and return every row as text columns.
    async fn query(&self, sql: &str) -> Result<Vec<TextRow>>;

    /// Run one or more statements that return no rows.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Run `statements` in one transaction on a single connection.
    /// Any failure rolls the whole transaction back.
    async fn execute_transaction(&self, statements: &[String]) -> Result<()>;
}

/// Parse the first column of the first row as an integer.
pub fn scalar_i64(rows: &[TextRow]) -> Result<i64> {
    let text = rows
        .first()
        .and_then(|r| r.first())
        .and_then(|c| c.as_deref())
        .ok_or_else(|| MigrateError::metadata("query returned no value"))?;
    text.trim()
        .parse::<i64>()
        .map_err(|e| MigrateError::metadata(format!("expected integer, got '{}': {}", text, e)))
}

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for PostgreSQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Schema-qualified, quoted table name.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// tokio-postgres backed executor with a small connection pool.
pub struct PgExecutor {
    pool: Pool,
    name: String,
}

impl PgExecutor {
    /// Create an executor. No connection is opened until the first query.
    pub fn new(endpoint: &EndpointConfig, connect_timeout: Duration) -> Result<Self> {
        let ssl_mode = SslMode::parse(&endpoint.ssl_mode)?;
        let mut pg_config = endpoint.pg_config(connect_timeout);
        pg_config.ssl_mode(ssl_mode.negotiation());

        let mut mgr_config = ManagerConfig::default();
        mgr_config.recycling_method = RecyclingMethod::Fast;

        let mgr = match TlsBuilder::new(ssl_mode).build()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => Manager::from_config(pg_config, NoTls, mgr_config),
        };

        let pool = Pool::builder(mgr)
            .max_size(2)
            .build()
            .map_err(|e| MigrateError::pool(e.to_string(), "creating query executor pool"))?;

        Ok(Self {
            pool,
            name: endpoint.display_name(),
        })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), format!("connecting to {}", self.name)))
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn query(&self, sql: &str) -> Result<Vec<TextRow>> {
        debug!("{}: {}", self.name, sql);
        let client = self.client().await?;
        let messages = client.simple_query(sql).await?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                rows.push(
                    (0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect(),
                );
            }
        }
        Ok(rows)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        debug!("{}: {}", self.name, sql);
        let client = self.client().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<()> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        for sql in statements {
            debug!("{} (tx): {}", self.name, sql);
            if let Err(e) = tx.batch_execute(sql).await {
                if let Err(rollback) = tx.rollback().await {
                    warn!("{}: rollback failed: {}", self.name, rollback);
                }
                return Err(e.into());
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted executor used by unit tests across the crate.

    use super::*;
    use std::sync::{Arc, Mutex};

    type Responder = Box<dyn Fn(&str) -> Option<Result<Vec<TextRow>>> + Send + Sync>;

    /// Answers queries from an ordered list of (substring, response) rules and
    /// records every statement it sees.
    pub struct ScriptedExecutor {
        name: String,
        responders: Vec<Responder>,
        log: Arc<Mutex<Vec<String>>>,
        fail_execute: bool,
        unreachable: bool,
    }

    impl ScriptedExecutor {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                responders: Vec::new(),
                log: Arc::new(Mutex::new(Vec::new())),
                fail_execute: false,
                unreachable: false,
            }
        }

        /// Every call fails as a refused connection.
        pub fn unreachable(mut self) -> Self {
            self.unreachable = true;
            self
        }

        /// `execute` calls fail after being recorded.
        pub fn failing_execute(mut self) -> Self {
            self.fail_execute = true;
            self
        }

        /// Respond to any query containing `needle` with `rows`.
        pub fn on(mut self, needle: &str, rows: Vec<Vec<&str>>) -> Self {
            let needle = needle.to_string();
            let rows: Vec<TextRow> = rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| Some(c.to_string())).collect())
                .collect();
            self.responders.push(Box::new(move |sql| {
                sql.contains(&needle).then(|| Ok(rows.clone()))
            }));
            self
        }

        /// Fail any query containing `needle`.
        pub fn fail_on(mut self, needle: &str) -> Self {
            let needle = needle.to_string();
            self.responders.push(Box::new(move |sql| {
                sql.contains(&needle)
                    .then(|| Err(MigrateError::metadata(format!("scripted failure: {}", needle))))
            }));
            self
        }

        /// Custom responder for stateful scripts.
        pub fn with(
            mut self,
            f: impl Fn(&str) -> Option<Result<Vec<TextRow>>> + Send + Sync + 'static,
        ) -> Self {
            self.responders.push(Box::new(f));
            self
        }

        /// Shared view of the statement log, for responders that depend on
        /// what ran before them.
        pub fn log_handle(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.log)
        }

        pub fn statements(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        fn name(&self) -> String {
            self.name.clone()
        }

        async fn query(&self, sql: &str) -> Result<Vec<TextRow>> {
            self.log.lock().unwrap().push(sql.to_string());
            if self.unreachable {
                return Err(MigrateError::pool("connection refused", self.name.clone()));
            }
            for responder in &self.responders {
                if let Some(result) = responder(sql) {
                    return result;
                }
            }
            Ok(Vec::new())
        }

        async fn execute(&self, sql: &str) -> Result<()> {
            self.log.lock().unwrap().push(sql.to_string());
            if self.unreachable {
                return Err(MigrateError::pool("connection refused", self.name.clone()));
            }
            if self.fail_execute {
                return Err(MigrateError::metadata("scripted execute failure"));
            }
            Ok(())
        }

        async fn execute_transaction(&self, statements: &[String]) -> Result<()> {
            if self.unreachable {
                return Err(MigrateError::pool("connection refused", self.name.clone()));
            }
            let mut log = self.log.lock().unwrap();
            log.push("BEGIN".to_string());
            for sql in statements {
                log.push(sql.clone());
                if self.fail_execute {
                    log.push("ROLLBACK".to_string());
                    return Err(MigrateError::metadata("scripted execute failure"));
                }
            }
            log.push("COMMIT".to_string());
            Ok(())
        }
    }
}
