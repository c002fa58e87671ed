//! Error types for the migration library.

use std::path::PathBuf;

use thiserror::Error;

/// Exit code for configuration errors (also used as the generic failure code).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when an endpoint cannot be reached.
pub const EXIT_CONNECTIVITY_ERROR: u8 = 2;
/// Exit code when the extract stage fails.
pub const EXIT_EXTRACTION_ERROR: u8 = 3;
/// Exit code when the load stage fails fatally.
pub const EXIT_LOAD_ERROR: u8 = 4;
/// Exit code when pg_dump or pg_restore cannot be found.
pub const EXIT_TOOL_MISSING: u8 = 5;
/// Exit code when the operator declines the destructive-action prompt.
pub const EXIT_DECLINED: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code after SIGINT/SIGTERM.
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Endpoint unreachable. Fatal, never retried.
    #[error("Cannot connect to {role} database {endpoint}: {message}")]
    Connectivity {
        role: String,
        endpoint: String,
        message: String,
    },

    /// pg_dump exited non-zero.
    #[error("Extraction failed: {message}\n  Diagnostics: {}", log.display())]
    Extraction { message: String, log: PathBuf },

    /// pg_restore exited non-zero and its diagnostics contain an error marker.
    #[error("Load failed: {message}\n  Diagnostics: {}", log.display())]
    LoadFatal { message: String, log: PathBuf },

    /// Inspection, count or resequence query failed. Always degraded by the caller.
    #[error("Metadata query failed: {0}")]
    MetadataQuery(String),

    /// A required external tool is not installed or not runnable.
    #[error("Required tool '{tool}' is not available: {message}")]
    ToolMissing { tool: String, message: String },

    /// The operator declined the destructive-action confirmation.
    #[error("Migration aborted: confirmation declined")]
    Declined,

    /// PostgreSQL client error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Connectivity error for the given endpoint role.
    pub fn connectivity(
        role: impl Into<String>,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::Connectivity {
            role: role.into(),
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a MetadataQuery error from anything displayable.
    pub fn metadata(message: impl std::fmt::Display) -> Self {
        MigrateError::MetadataQuery(message.to_string())
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Connectivity { .. } => EXIT_CONNECTIVITY_ERROR,
            MigrateError::Extraction { .. } => EXIT_EXTRACTION_ERROR,
            MigrateError::LoadFatal { .. } => EXIT_LOAD_ERROR,
            MigrateError::ToolMissing { .. } => EXIT_TOOL_MISSING,
            MigrateError::Declined => EXIT_DECLINED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_CONFIG_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
