//! Configuration validation.

use super::{Config, EndpointConfig};
use crate::error::{MigrateError, Result};
use crate::tls::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_endpoint("source", &config.source)?;
    validate_endpoint("target", &config.target)?;

    // Cannot migrate to the same database
    if config.source.same_database(&config.target) {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    // Migration config validation - only check if explicitly set
    if let Some(0) = config.migration.jobs {
        return Err(MigrateError::Config(
            "migration.jobs must be at least 1".into(),
        ));
    }
    if config.migration.poll_interval_ms == 0 {
        return Err(MigrateError::Config(
            "migration.poll_interval_ms must be at least 1".into(),
        ));
    }
    if config.migration.schema.is_empty() {
        return Err(MigrateError::Config("migration.schema is required".into()));
    }

    Ok(())
}

fn validate_endpoint(role: &str, endpoint: &EndpointConfig) -> Result<()> {
    if endpoint.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", role)));
    }
    if endpoint.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", role)));
    }
    if endpoint.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", role)));
    }
    SslMode::parse(&endpoint.ssl_mode)
        .map_err(|e| MigrateError::Config(format!("{}.ssl_mode: {}", role, e)))?;
    Ok(())
}
