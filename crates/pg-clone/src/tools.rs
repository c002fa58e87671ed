//! pg_dump / pg_restore invocation.
//!
//! Both tools are treated as black boxes: this module only knows which
//! flags express a migration plan and how to tell whether a tool runs.

use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{EndpointConfig, MigrationConfig};
use crate::error::{MigrateError, Result};
use crate::plan::MigrationPlan;
use crate::stage::{ProgressSignal, StageCommand, StageKind};

/// One external executable, optionally behind a wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    name: &'static str,
    program: String,
    leading_args: Vec<String>,
}

impl Tool {
    pub fn new(name: &'static str, program: impl Into<String>) -> Self {
        Self {
            name,
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Run the tool through another program, e.g. `sh script` or `docker exec`.
    pub fn wrapped(
        name: &'static str,
        program: impl Into<String>,
        leading_args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name,
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `--version` and return its first line.
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MigrateError::ToolMissing {
                tool: self.name.to_string(),
                message: format!("{}: {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(MigrateError::ToolMissing {
                tool: self.name.to_string(),
                message: format!(
                    "'{} --version' exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        debug!("{}: {}", self.name, version);
        Ok(version)
    }

    fn command(
        &self,
        kind: StageKind,
        args: Vec<String>,
        endpoint: &EndpointConfig,
        signal: ProgressSignal,
        diagnostics: &Path,
    ) -> StageCommand {
        let mut full_args = self.leading_args.clone();
        full_args.extend(args);
        StageCommand {
            kind,
            program: self.program.clone(),
            args: full_args,
            env: endpoint
                .libpq_env()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            signal,
            diagnostics: diagnostics.to_path_buf(),
        }
    }
}

/// Versions reported by the probe.
#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub pg_dump: String,
    pub pg_restore: String,
}

/// The extractor and loader pair.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pg_dump: Tool,
    pg_restore: Tool,
}

impl Toolchain {
    pub fn new(pg_dump: Tool, pg_restore: Tool) -> Self {
        Self {
            pg_dump,
            pg_restore,
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(
            Tool::new("pg_dump", config.pg_dump_path.clone()),
            Tool::new("pg_restore", config.pg_restore_path.clone()),
        )
    }

    /// Confirm both tools run. A missing tool is a pre-flight failure.
    pub async fn probe(&self) -> Result<ToolVersions> {
        let versions = ToolVersions {
            pg_dump: self.pg_dump.version().await?,
            pg_restore: self.pg_restore.version().await?,
        };
        info!("Using {} / {}", versions.pg_dump, versions.pg_restore);
        Ok(versions)
    }

    /// pg_dump into a custom-format archive that pg_restore can load in parallel.
    pub fn extract_command(
        &self,
        source: &EndpointConfig,
        plan: &MigrationPlan,
        artifact: &Path,
        diagnostics: &Path,
    ) -> StageCommand {
        let mut args = vec![
            "--format=custom".to_string(),
            "--no-owner".to_string(),
            "--no-privileges".to_string(),
        ];
        if plan.is_data_only() {
            args.push("--data-only".to_string());
        }
        args.extend(connection_args(source));
        args.push(format!("--file={}", artifact.display()));

        self.pg_dump.command(
            StageKind::Extract,
            args,
            source,
            ProgressSignal::ArtifactSize(artifact.to_path_buf()),
            diagnostics,
        )
    }

    /// Verbose parallel pg_restore; progress comes from its streamed log lines.
    pub fn load_command(
        &self,
        target: &EndpointConfig,
        plan: &MigrationPlan,
        artifact: &Path,
        diagnostics: &Path,
    ) -> StageCommand {
        let mut args = vec![
            "--verbose".to_string(),
            "--no-owner".to_string(),
            "--no-privileges".to_string(),
            format!("--jobs={}", plan.parallelism()),
        ];
        if plan.is_data_only() {
            args.push("--data-only".to_string());
            args.push("--disable-triggers".to_string());
        } else if plan.clean_target() {
            args.push("--clean".to_string());
            args.push("--if-exists".to_string());
        }
        args.extend(connection_args(target));
        args.push(artifact.display().to_string());

        self.pg_restore.command(
            StageKind::Load,
            args,
            target,
            ProgressSignal::DiagnosticsTail,
            diagnostics,
        )
    }
}

fn connection_args(endpoint: &EndpointConfig) -> Vec<String> {
    vec![
        format!("--host={}", endpoint.host),
        format!("--port={}", endpoint.port),
        format!("--username={}", endpoint.user),
        format!("--dbname={}", endpoint.database),
    ]
}
