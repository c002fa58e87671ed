//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl EndpointConfig {
    /// Build a tokio-postgres config for the query executor.
    pub fn pg_config(&self, connect_timeout: Duration) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&self.host);
        pg_config.port(self.port);
        pg_config.dbname(&self.database);
        pg_config.user(&self.user);
        if !self.password.is_empty() {
            pg_config.password(&self.password);
        }
        pg_config.application_name("pg-clone");
        pg_config.connect_timeout(connect_timeout);
        pg_config
    }

    /// libpq environment for pg_dump/pg_restore. Keeps the password off the argv.
    pub fn libpq_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![("PGSSLMODE", self.ssl_mode.clone())];
        if !self.password.is_empty() {
            env.push(("PGPASSWORD", self.password.clone()));
        }
        env
    }
}
