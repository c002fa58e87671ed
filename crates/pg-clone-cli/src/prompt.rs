//! Operator-facing rendering: the pre-flight confirmation and run summaries.

use dialoguer::Confirm;
use pg_clone::inspect::{DatabaseSummary, TableInventory};
use pg_clone::orchestrator::EndpointInspection;
use pg_clone::verify::EndpointHealth;
use pg_clone::{
    Confirmation, CountComparison, HealthCheckResult, MigrateError, MigrationResult, Preflight,
    StageStatus,
};
use std::io::IsTerminal;

/// Asks on the terminal before anything is written.
pub struct PromptConfirm;

impl Confirmation for PromptConfirm {
    fn confirm(&self, preflight: &Preflight) -> pg_clone::Result<bool> {
        print_preflight(preflight);

        if !std::io::stdin().is_terminal() {
            return Err(MigrateError::Config(
                "stdin is not a terminal; pass --yes to run without confirmation".to_string(),
            ));
        }

        let prompt = if preflight.plan.clean_target() {
            format!(
                "Replace the contents of {} with {}?",
                preflight.target_endpoint, preflight.source_endpoint
            )
        } else {
            format!(
                "Load {} into {}?",
                preflight.source_endpoint, preflight.target_endpoint
            )
        };

        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| MigrateError::Config(format!("confirmation prompt failed: {}", e)))
    }
}

fn summary_line(summary: &DatabaseSummary) -> String {
    format!(
        "{} ({} tables, {})",
        summary.identifier,
        summary
            .table_count
            .map_or_else(|| "?".to_string(), |n| n.to_string()),
        summary.storage_size.as_deref().unwrap_or("size unknown")
    )
}

fn print_tables(tables: &TableInventory) {
    let width = tables
        .tables
        .iter()
        .map(|t| t.table.len())
        .max()
        .unwrap_or(0)
        .max(5);
    for t in &tables.tables {
        eprintln!("    {:<width$}  {:>12}", t.table, t.rows_display(), width = width);
    }
    eprintln!(
        "    {:<width$}  {:>12}",
        "total",
        tables.total_rows,
        width = width
    );
    if tables.unknown > 0 {
        eprintln!("    ({} table(s) could not be counted)", tables.unknown);
    }
}

fn print_preflight(preflight: &Preflight) {
    let plan = &preflight.plan;
    eprintln!();
    eprintln!("Migration plan:");
    eprintln!(
        "  Source: {}  {}",
        preflight.source_endpoint,
        summary_line(&preflight.source)
    );
    eprintln!(
        "  Target: {}  {}",
        preflight.target_endpoint,
        summary_line(&preflight.target)
    );
    eprintln!(
        "  Mode: {}  Jobs: {}  Clean target: {}  Keep dump: {}",
        plan.mode(),
        plan.parallelism(),
        yes_no(plan.clean_target()),
        yes_no(plan.retain_artifact())
    );
    eprintln!(
        "  Tools: {} / {}",
        preflight.tools.pg_dump, preflight.tools.pg_restore
    );
    if !preflight.source_tables.tables.is_empty() {
        eprintln!("  Source tables:");
        print_tables(&preflight.source_tables);
    }
    eprintln!();
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn stage_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Ok => "ok",
        StageStatus::OkWithWarnings => "ok (with warnings)",
        StageStatus::Failed => "failed",
    }
}

pub fn print_result(result: &MigrationResult) {
    let headline = if result.warnings.is_empty() {
        "Migration completed!"
    } else {
        "Migration completed with warnings."
    };
    println!("\n{}", headline);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Extract: {} ({:.1}s)",
        stage_label(result.extract.status),
        result.extract.duration_seconds
    );
    println!(
        "  Load: {} ({:.1}s, {} jobs)",
        stage_label(result.load.status),
        result.load.duration_seconds,
        result.jobs
    );
    if let Some(ref truncation) = result.truncation {
        println!("  Truncated: {} tables", truncation.tables.len());
    }
    println!("  Tables: {}", result.tables_total);
    println!("  Rows: {}", result.rows_total);
    println!(
        "  Sequences: {} resynchronized, {} failed",
        result.sequences_resynced, result.sequences_failed
    );
    if let Some(ref kept) = result.retained_artifact {
        println!("  Dump kept at: {}", kept.display());
    }
    println!("  Diagnostics: {}", result.diagnostics_log.display());
    for warning in &result.warnings {
        println!("  Warning: {}", warning);
    }
}

fn print_health(label: &str, health: &EndpointHealth) {
    println!(
        "  {} ({}): {} ({}ms)",
        label,
        health.endpoint,
        if health.connected { "OK" } else { "FAILED" },
        health.latency_ms
    );
    if let Some(ref err) = health.error {
        println!("    Error: {}", err);
    }
}

pub fn print_health_check(result: &HealthCheckResult) {
    println!("Health Check Results:");
    print_health("Source", &result.source);
    print_health("Target", &result.target);
    println!(
        "\n  Overall: {}",
        if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
    );
}

pub fn print_inspection(inspection: &EndpointInspection) {
    println!(
        "{} {}: {}",
        inspection.role,
        inspection.endpoint,
        summary_line(&inspection.summary)
    );
    for t in &inspection.tables.tables {
        println!("  {:<40} {:>12}", t.table, t.rows_display());
    }
    println!("  {:<40} {:>12}", "total", inspection.tables.total_rows);
}

fn rows(value: Option<i64>) -> String {
    value.map_or_else(|| "?".to_string(), |r| r.to_string())
}

pub fn print_comparison(results: &[CountComparison]) {
    for cmp in results {
        if cmp.matches() {
            println!("  {}: {} rows (match)", cmp.table, rows(cmp.source_rows));
        } else {
            println!(
                "  {}: source={} target={} (MISMATCH)",
                cmp.table,
                rows(cmp.source_rows),
                rows(cmp.target_rows)
            );
        }
    }
    let mismatched = results.iter().filter(|c| !c.matches()).count();
    println!(
        "\n{} table(s) checked, {} mismatch(es)",
        results.len(),
        mismatched
    );
}
