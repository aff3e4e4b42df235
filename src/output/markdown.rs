//! Markdown run report generation
//!
//! This module renders a finished run as a human-readable markdown report: run
//! metadata, task and record totals, per-sink counters, per-category pagination
//! results and abandoned tasks.

use crate::crawler::RunSummary;
use crate::state::PaginationState;
use crate::storage::RunRecord;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Path of the markdown report for `run_id` under `export_dir`
pub fn report_path(export_dir: &Path, run_id: i64) -> PathBuf {
    export_dir.join(format!("run_{}_summary.md", run_id))
}

/// Writes the markdown report of a run
///
/// # Arguments
///
/// * `run` - The run record, as stored after completion
/// * `summary` - The engine's run summary
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(io::Error)` - Failed to write the report
pub fn generate_markdown_summary(
    run: &RunRecord,
    summary: &RunSummary,
    output_path: &Path,
) -> std::io::Result<()> {
    let markdown = format_markdown_summary(run, summary);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run as markdown
pub fn format_markdown_summary(run: &RunRecord, summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Kongfz Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", run.id));
    md.push_str(&format!("- **Started**: {}\n", run.started_at));
    if let Some(finished) = &run.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        summary.elapsed.as_secs_f64()
    ));
    md.push_str(&format!("- **Status**: {}\n", run.status.to_db_string()));
    md.push_str(&format!("- **Config Hash**: {}\n\n", run.config_hash));

    md.push_str("## Tasks\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Completed | {} |\n", summary.tasks_completed));
    md.push_str(&format!("| Retried | {} |\n", summary.tasks_retried));
    md.push_str(&format!("| Abandoned | {} |\n\n", summary.tasks_abandoned()));

    md.push_str("## Records\n\n");
    md.push_str(&format!("- **Routed**: {}\n", summary.records_routed));
    md.push_str(&format!(
        "- **Category records**: {}\n",
        summary.categories_routed
    ));
    md.push_str(&format!("- **Dropped**: {}\n\n", summary.records_dropped));

    if !summary.sinks.is_empty() {
        md.push_str("| Sink | Stored | Duplicate | Failed |\n");
        md.push_str("|------|--------|-----------|--------|\n");
        for sink in &summary.sinks {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                sink.name, sink.stored, sink.duplicate, sink.failed
            ));
        }
        md.push('\n');
    }

    if !summary.categories.is_empty() {
        md.push_str("## Categories\n\n");
        md.push_str(&format!(
            "Exhausted: {}, failed: {}, unfinished: {}\n\n",
            summary.categories_in(PaginationState::Exhausted),
            summary.categories_in(PaginationState::Failed),
            summary.unfinished_categories().count()
        ));
        md.push_str("| Category | State | Pages | Records |\n");
        md.push_str("|----------|-------|-------|---------|\n");
        for progress in &summary.categories {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                progress.category, progress.state, progress.pages_fetched, progress.records_seen
            ));
        }
        md.push('\n');
    }

    if !summary.abandoned.is_empty() {
        md.push_str("## Abandoned Tasks\n\n");
        md.push_str("| Kind | Target | Retries | Error |\n");
        md.push_str("|------|--------|---------|-------|\n");
        for task in &summary.abandoned {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                task.kind, task.target, task.attempt, task.error
            ));
        }
        md.push('\n');
    }

    md
}
