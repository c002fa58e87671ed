//! Connection verification and health checks.

use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{error, info};

use crate::error::{MigrateError, Result};
use crate::query::QueryExecutor;

/// Which side of the migration an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
    Source,
    Target,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Source => write!(f, "source"),
            EndpointRole::Target => write!(f, "target"),
        }
    }
}

/// Result of probing one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub role: EndpointRole,
    pub endpoint: String,
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Combined result for both endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source: EndpointHealth,
    pub target: EndpointHealth,
    pub healthy: bool,
}

/// Run a trivial round-trip query, never failing.
pub async fn probe(executor: &dyn QueryExecutor, role: EndpointRole) -> EndpointHealth {
    let start = Instant::now();
    let outcome = executor.query("SELECT 1").await;
    let latency_ms = start.elapsed().as_millis() as u64;

    EndpointHealth {
        role,
        endpoint: executor.name(),
        connected: outcome.is_ok(),
        latency_ms,
        error: outcome.err().map(|e| e.to_string()),
    }
}

/// Confirm an endpoint is reachable and queryable. Failure is fatal for the run.
pub async fn verify(executor: &dyn QueryExecutor, role: EndpointRole) -> Result<EndpointHealth> {
    let health = probe(executor, role).await;
    match health.error {
        None => {
            info!(
                "{} database reachable: {} ({}ms)",
                role, health.endpoint, health.latency_ms
            );
            Ok(health)
        }
        Some(ref message) => {
            error!("{} database unreachable: {}", role, health.endpoint);
            Err(MigrateError::connectivity(
                role.to_string(),
                health.endpoint.clone(),
                message.clone(),
            ))
        }
    }
}

/// Probe both endpoints without stopping at the first failure.
pub async fn health_check(
    source: &dyn QueryExecutor,
    target: &dyn QueryExecutor,
) -> HealthCheckResult {
    let source = probe(source, EndpointRole::Source).await;
    let target = probe(target, EndpointRole::Target).await;
    let healthy = source.connected && target.connected;
    HealthCheckResult {
        source,
        target,
        healthy,
    }
}
