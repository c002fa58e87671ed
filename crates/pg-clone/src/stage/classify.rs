//! Stage outcome classification.
//!
//! pg_restore exits non-zero both for fatal failures and for restores that
//! finished with only ignorable warnings, so a non-zero load is fatal only
//! when its diagnostics carry an explicit error marker. pg_dump has no such
//! ambiguity.

use super::{StageKind, StageStatus};

/// Marker pg_restore prefixes to every fatal diagnostic line.
pub const LOAD_ERROR_MARKER: &str = "pg_restore: error:";

/// Most diagnostic lines quoted in an outcome's detail.
const MAX_QUOTED_LINES: usize = 5;

/// Classification of one finished stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: StageStatus,
    /// Lines carrying the error marker (load stage only).
    pub error_lines: Vec<String>,
    /// Human-readable explanation.
    pub detail: String,
}

/// Classify a stage from its exit status and the diagnostics it wrote.
///
/// `exit_code` is `None` when the process was killed by a signal, which is
/// fatal for either stage.
pub fn classify(kind: StageKind, exit_code: Option<i32>, diagnostics: &str) -> Classification {
    if exit_code == Some(0) {
        return Classification {
            status: StageStatus::Ok,
            error_lines: Vec::new(),
            detail: "completed".to_string(),
        };
    }

    let exit = exit_code.map_or_else(
        || "killed by signal".to_string(),
        |c| format!("exit status {}", c),
    );

    match kind {
        StageKind::Extract => Classification {
            status: StageStatus::Failed,
            error_lines: Vec::new(),
            detail: with_excerpt(format!("pg_dump {}", exit), &tail_lines(diagnostics)),
        },
        StageKind::Load if exit_code.is_none() => Classification {
            status: StageStatus::Failed,
            error_lines: marker_lines(diagnostics),
            detail: format!("pg_restore {}", exit),
        },
        StageKind::Load => {
            let error_lines = marker_lines(diagnostics);
            if error_lines.is_empty() {
                Classification {
                    status: StageStatus::OkWithWarnings,
                    error_lines,
                    detail: format!("pg_restore {} with warnings only", exit),
                }
            } else {
                let detail = with_excerpt(
                    format!("pg_restore {}, {} error(s)", exit, error_lines.len()),
                    &error_lines,
                );
                Classification {
                    status: StageStatus::Failed,
                    error_lines,
                    detail,
                }
            }
        }
    }
}

/// Every diagnostic line containing the load error marker.
pub fn marker_lines(diagnostics: &str) -> Vec<String> {
    diagnostics
        .lines()
        .filter(|l| l.contains(LOAD_ERROR_MARKER))
        .map(|l| l.trim().to_string())
        .collect()
}

fn tail_lines(diagnostics: &str) -> Vec<String> {
    let lines: Vec<String> = diagnostics
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    let skip = lines.len().saturating_sub(MAX_QUOTED_LINES);
    lines.into_iter().skip(skip).collect()
}

fn with_excerpt(headline: String, lines: &[String]) -> String {
    if lines.is_empty() {
        return headline;
    }
    let quoted: Vec<&str> = lines
        .iter()
        .take(MAX_QUOTED_LINES)
        .map(String::as_str)
        .collect();
    format!("{}:\n    {}", headline, quoted.join("\n    "))
}
