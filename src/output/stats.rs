//! Statistics generation from the crawl database and run summaries
//!
//! This module provides the console reports: database statistics for `--stats` and
//! the end-of-run summary.

use crate::crawler::RunSummary;
use crate::output::dedup_sink::RECORD_SCOPE;
use crate::state::PaginationState;
use crate::storage::{CategoryProgress, RunRecord, Storage};
use crate::KongfzError;

/// Number of recent runs listed by `--stats`
const RECENT_RUNS: u32 = 5;

/// Database statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,

    /// Total number of stored documents
    pub total_documents: u64,

    /// Documents per category, largest first
    pub documents_by_category: Vec<(String, u64)>,

    /// Number of catalog categories stored from the menu
    pub total_categories: u64,

    /// Number of record keys known to the dedup sink
    pub known_records: u64,

    /// Category progress of the most recent run
    pub latest_progress: Vec<CategoryProgress>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(KongfzError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, KongfzError> {
    let recent_runs = storage.list_runs(RECENT_RUNS)?;
    let total_documents = storage.count_documents()?;
    let documents_by_category = storage.get_category_breakdown()?;
    let total_categories = storage.count_categories()?;
    let known_records = storage.count_keys(RECORD_SCOPE)?;

    let latest_progress = match recent_runs.first() {
        Some(run) => storage.get_category_progress(run.id)?,
        None => Vec::new(),
    };

    Ok(CrawlStatistics {
        recent_runs,
        total_documents,
        documents_by_category,
        total_categories,
        known_records,
        latest_progress,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Documents stored: {}", stats.total_documents);
    println!("  Catalog categories stored: {}", stats.total_categories);
    println!("  Records known to dedup: {}", stats.known_records);
    println!("  Categories with documents: {}", stats.documents_by_category.len());
    println!();

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &stats.recent_runs {
            println!(
                "  #{} {} [{}] completed={} retried={} abandoned={} records={}",
                run.id,
                run.started_at,
                run.status.to_db_string(),
                run.totals.tasks_completed,
                run.totals.tasks_retried,
                run.totals.tasks_abandoned,
                run.totals.records_routed
            );
        }
        println!();
    }

    if !stats.documents_by_category.is_empty() {
        println!("Documents by Category:");
        for (category, count) in &stats.documents_by_category {
            let percentage = if stats.total_documents > 0 {
                (*count as f64 / stats.total_documents as f64) * 100.0
            } else {
                0.0
            };
            let name = if category.is_empty() { "(none)" } else { category };
            println!("  {}: {} ({:.1}%)", name, count, percentage);
        }
        println!();
    }

    if !stats.latest_progress.is_empty() {
        println!("Latest Run Categories:");
        for progress in &stats.latest_progress {
            println!(
                "  {} [{}] pages={} records={}",
                progress.category, progress.state, progress.pages_fetched, progress.records_seen
            );
        }
    }
}

/// Prints the end-of-run summary to stdout
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Crawl Summary ===\n");

    if summary.stopped {
        println!("Run stopped before the frontier drained.\n");
    }

    println!("Tasks:");
    println!("  Completed: {}", summary.tasks_completed);
    println!("  Retried: {}", summary.tasks_retried);
    println!("  Abandoned: {}", summary.tasks_abandoned());
    println!();

    println!("Records:");
    println!("  Routed: {}", summary.records_routed);
    println!("  Category records: {}", summary.categories_routed);
    println!("  Dropped: {}", summary.records_dropped);
    for sink in &summary.sinks {
        println!(
            "  {}: stored={} duplicate={} failed={}",
            sink.name, sink.stored, sink.duplicate, sink.failed
        );
    }
    println!();

    println!("Categories:");
    println!("  Exhausted: {}", summary.categories_in(PaginationState::Exhausted));
    println!("  Failed: {}", summary.categories_in(PaginationState::Failed));
    let unfinished: Vec<_> = summary.unfinished_categories().collect();
    println!("  Unfinished: {}", unfinished.len());
    for progress in unfinished {
        println!("    - {} ({})", progress.category, progress.source_url);
    }
    println!();

    if !summary.abandoned.is_empty() {
        println!("Abandoned Tasks:");
        for task in summary.abandoned.iter().take(20) {
            println!("  [{}] {}: {}", task.kind, task.target, task.error);
        }
        if summary.abandoned.len() > 20 {
            println!("  ... and {} more", summary.abandoned.len() - 20);
        }
        println!();
    }

    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
}
