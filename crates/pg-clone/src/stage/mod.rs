//! Stage runner: launches one external operation, watches it, classifies it.

mod classify;
mod monitor;

pub use classify::{classify, marker_lines, Classification, LOAD_ERROR_MARKER};
pub use monitor::{
    format_elapsed, Observation, ProgressMonitor, ProgressSink, ProgressStyle,
    RecordingSink, SignalSource, SilentSink, TerminalSink,
};

use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{MigrateError, Result};

/// The two child-process stages of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Extract,
    Load,
}

impl StageKind {
    fn label(&self) -> &'static str {
        match self {
            StageKind::Extract => "Extracting",
            StageKind::Load => "Loading",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Extract => write!(f, "extract"),
            StageKind::Load => write!(f, "load"),
        }
    }
}

/// Three-way stage result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    OkWithWarnings,
    Failed,
}

impl StageStatus {
    /// Whether the pipeline may continue past this stage.
    pub fn is_success(&self) -> bool {
        !matches!(self, StageStatus::Failed)
    }
}

/// Which side channel the monitor watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressSignal {
    /// Size of the file the stage writes.
    ArtifactSize(PathBuf),
    /// Lines the stage appends to its diagnostics.
    DiagnosticsTail,
}

/// A fully-specified external command for one stage.
#[derive(Clone)]
pub struct StageCommand {
    pub kind: StageKind,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub signal: ProgressSignal,
    /// File the child's stderr is appended to.
    pub diagnostics: PathBuf,
}

impl fmt::Debug for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("StageCommand")
            .field("kind", &self.kind)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("signal", &self.signal)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl StageCommand {
    /// Command line for logs. Environment values are never shown.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Result of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: StageKind,
    pub status: StageStatus,
    pub duration_seconds: f64,
    /// `None` when killed by a signal.
    pub exit_code: Option<i32>,
    pub detail: String,
    pub diagnostics: PathBuf,
    /// Final progress sample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_observation: Option<Observation>,
}

/// Launches stage commands as child processes with a progress monitor attached.
#[derive(Clone)]
pub struct StageRunner {
    poll_interval: Duration,
    progress: ProgressStyle,
    cancel: CancellationToken,
}

impl StageRunner {
    pub fn new(poll_interval: Duration, progress: ProgressStyle, cancel: CancellationToken) -> Self {
        Self {
            poll_interval,
            progress,
            cancel,
        }
    }

    /// Run a stage to completion and classify it.
    ///
    /// Blocks only on the child. Returns `Err` when the child cannot be
    /// started or the run is cancelled; a child that ran and failed is an
    /// `Ok` outcome with `StageStatus::Failed`.
    pub async fn run(&self, command: &StageCommand) -> Result<StageOutcome> {
        let sink = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&command.diagnostics)?;
        let offset = sink.metadata()?.len();

        info!("Starting {} stage: {}", command.kind, command.display());
        let started = Instant::now();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(sink))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(command, e))?;

        let source = match &command.signal {
            ProgressSignal::ArtifactSize(path) => SignalSource::ArtifactSize(path.clone()),
            ProgressSignal::DiagnosticsTail => SignalSource::LogTail {
                path: command.diagnostics.clone(),
                offset,
            },
        };
        let monitor = ProgressMonitor::new(command.kind.label(), source, self.poll_interval);
        let exited = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        let monitor_task = tokio::spawn(monitor.run(self.progress.sink(), exited.clone(), tx));

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = self.cancel.cancelled() => None,
        };

        let status = match waited {
            Some(status) => status,
            None => {
                warn!("Cancellation requested, stopping {} stage", command.kind);
                let _ = child.start_kill();
                let _ = child.wait().await;
                exited.cancel();
                let _ = monitor_task.await;
                return Err(MigrateError::Cancelled);
            }
        };

        // The monitor clears its line before anything else is printed.
        exited.cancel();
        if let Err(e) = monitor_task.await {
            debug!("Progress monitor task ended abnormally: {}", e);
        }

        let status = status?;
        let duration = started.elapsed();
        let diagnostics = read_from(&command.diagnostics, offset).await?;
        let classification = classify(command.kind, status.code(), &diagnostics);
        let last_observation = rx.borrow().clone();

        match classification.status {
            StageStatus::Ok => info!(
                "{} stage completed in {:.1}s",
                command.kind,
                duration.as_secs_f64()
            ),
            StageStatus::OkWithWarnings => warn!(
                "{} stage completed with warnings in {:.1}s: {} (see {})",
                command.kind,
                duration.as_secs_f64(),
                classification.detail,
                command.diagnostics.display()
            ),
            StageStatus::Failed => error!(
                "{} stage failed after {:.1}s: {}",
                command.kind,
                duration.as_secs_f64(),
                classification.detail
            ),
        }

        Ok(StageOutcome {
            stage: command.kind,
            status: classification.status,
            duration_seconds: duration.as_secs_f64(),
            exit_code: status.code(),
            detail: classification.detail,
            diagnostics: command.diagnostics.clone(),
            last_observation,
        })
    }
}

fn spawn_error(command: &StageCommand, e: std::io::Error) -> MigrateError {
    if e.kind() == std::io::ErrorKind::NotFound {
        MigrateError::ToolMissing {
            tool: command.program.clone(),
            message: e.to_string(),
        }
    } else {
        MigrateError::Io(e)
    }
}

/// Everything appended to `path` after `offset`.
async fn read_from(path: &Path, offset: u64) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let start = (offset as usize).min(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[start..]).into_owned())
}
