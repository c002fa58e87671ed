//! The immutable set of choices governing one migration run.

use serde::Serialize;

use crate::config::{MigrationConfig, MigrationMode};
use crate::error::{MigrateError, Result};

/// Migration plan, derived once from validated configuration.
///
/// Fields are private so a plan cannot change after the pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    mode: MigrationMode,
    parallelism: usize,
    clean_target: bool,
    retain_artifact: bool,
}

impl MigrationPlan {
    /// Build a plan, rejecting a zero worker count.
    pub fn new(
        mode: MigrationMode,
        parallelism: usize,
        clean_target: bool,
        retain_artifact: bool,
    ) -> Result<Self> {
        if parallelism == 0 {
            return Err(MigrateError::Config(
                "parallelism must be a positive integer".into(),
            ));
        }
        Ok(Self {
            mode,
            parallelism,
            clean_target,
            retain_artifact,
        })
    }

    /// Derive the plan from the `migration` config section.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        Self::new(
            config.mode,
            config.get_jobs(),
            config.clean,
            config.keep_dump,
        )
    }

    pub fn mode(&self) -> MigrationMode {
        self.mode
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn clean_target(&self) -> bool {
        self.clean_target
    }

    pub fn retain_artifact(&self) -> bool {
        self.retain_artifact
    }

    pub fn is_data_only(&self) -> bool {
        self.mode == MigrationMode::DataOnly
    }

    /// Whether `preparing_target` truncates. Full mode leaves cleanup to
    /// pg_restore's `--clean`.
    pub fn truncates_target(&self) -> bool {
        self.is_data_only() && self.clean_target
    }
}
