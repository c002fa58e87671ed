//! The intermediate dump file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Dump file owned by one run. Removed on drop unless retained.
#[derive(Debug)]
pub struct TransientArtifact {
    path: PathBuf,
    retain: bool,
}

impl TransientArtifact {
    /// Create an empty, uniquely named artifact in `dir`.
    ///
    /// Fails if the file already exists, so two runs never share one.
    pub fn create(dir: &Path, run_id: &str, retain: bool) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(artifact_file_name(run_id));
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        debug!("Created artifact {}", path.display());
        Ok(Self { path, retain })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes, 0 if the file is gone.
    pub fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Keep the file past the end of the run.
    pub fn keep(&mut self) {
        self.retain = true;
    }

    pub fn is_retained(&self) -> bool {
        self.retain
    }
}

impl Drop for TransientArtifact {
    fn drop(&mut self) {
        if self.retain {
            info!("Dump retained at {}", self.path.display());
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}

pub fn artifact_file_name(run_id: &str) -> String {
    format!("pg-clone-{}.dump", run_id)
}

/// Diagnostic log path for a run. Never deleted by the tool.
pub fn diagnostics_path(dir: &Path, run_id: &str) -> PathBuf {
    dir.join(format!("pg-clone-{}.log", run_id))
}
