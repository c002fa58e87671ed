//! Migration state machine bookkeeping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// States of one migration run. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Idle,
    Verifying,
    Inspecting,
    Extracting,
    PreparingTarget,
    Loading,
    Resequencing,
    Summarizing,
    Done,
    Failed,
}

impl MigrationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Done | MigrationPhase::Failed)
    }

    /// Position in the happy path, for "Phase N" log lines.
    fn ordinal(&self) -> Option<usize> {
        match self {
            MigrationPhase::Verifying => Some(1),
            MigrationPhase::Inspecting => Some(2),
            MigrationPhase::Extracting => Some(3),
            MigrationPhase::PreparingTarget => Some(4),
            MigrationPhase::Loading => Some(5),
            MigrationPhase::Resequencing => Some(6),
            MigrationPhase::Summarizing => Some(7),
            _ => None,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            MigrationPhase::Idle => "idle",
            MigrationPhase::Verifying => "Verifying tools and endpoints",
            MigrationPhase::Inspecting => "Inspecting source and target",
            MigrationPhase::Extracting => "Extracting source with pg_dump",
            MigrationPhase::PreparingTarget => "Preparing target",
            MigrationPhase::Loading => "Loading target with pg_restore",
            MigrationPhase::Resequencing => "Resynchronizing sequences",
            MigrationPhase::Summarizing => "Summarizing target",
            MigrationPhase::Done => "done",
            MigrationPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationPhase::Idle => "idle",
            MigrationPhase::Verifying => "verifying",
            MigrationPhase::Inspecting => "inspecting",
            MigrationPhase::Extracting => "extracting",
            MigrationPhase::PreparingTarget => "preparing_target",
            MigrationPhase::Loading => "loading",
            MigrationPhase::Resequencing => "resequencing",
            MigrationPhase::Summarizing => "summarizing",
            MigrationPhase::Done => "done",
            MigrationPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One entry in the transition history.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTransition {
    pub phase: MigrationPhase,
    pub entered_at: DateTime<Utc>,
}

/// Tracks the current phase and every phase entered so far.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: MigrationPhase,
    history: Vec<PhaseTransition>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: MigrationPhase::Idle,
            history: vec![PhaseTransition {
                phase: MigrationPhase::Idle,
                entered_at: Utc::now(),
            }],
        }
    }

    pub fn current(&self) -> MigrationPhase {
        self.current
    }

    /// Move to `phase`. Ignored once a terminal phase was reached.
    pub fn enter(&mut self, phase: MigrationPhase) {
        if self.current.is_terminal() {
            return;
        }
        match phase.ordinal() {
            Some(n) => info!("Phase {}: {}", n, phase.description()),
            None => info!("Migration {}", phase.description()),
        }
        self.current = phase;
        self.history.push(PhaseTransition {
            phase,
            entered_at: Utc::now(),
        });
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }
}
