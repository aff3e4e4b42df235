//! Output module: record sinks and crawl reports
//!
//! This module handles:
//! - The `Sink` lifecycle and the three record sinks (dedup, document, CSV export)
//! - Category records, taken by the dedup and document sinks only
//! - Console statistics for `--stats` and end-of-run summaries
//! - Markdown run reports

mod csv_export;
mod dedup_sink;
mod document;
mod markdown;
pub mod stats;
mod traits;

pub use csv_export::{export_file_path, CsvExportSink};
pub use dedup_sink::{category_key, record_key, DedupSink, RECORD_SCOPE};
pub use document::DocumentSink;
pub use markdown::{format_markdown_summary, generate_markdown_summary, report_path};
pub use stats::{load_statistics, print_run_summary, print_statistics, CrawlStatistics};
pub use traits::{Delivery, Sink, SinkError, SinkResult};

use crate::config::{OutputConfig, SinkKind};
use crate::storage::SharedStorage;
use std::path::Path;
use std::sync::Arc;

/// Builds the configured sinks, in delivery order
///
/// # Arguments
///
/// * `config` - The output configuration
/// * `storage` - Shared database used by the dedup and document sinks
pub fn build_sinks(config: &OutputConfig, storage: &SharedStorage) -> Vec<Box<dyn Sink>> {
    config
        .sinks
        .iter()
        .map(|kind| -> Box<dyn Sink> {
            match kind {
                SinkKind::Dedup => Box::new(DedupSink::new(Arc::clone(storage))),
                SinkKind::Document => Box::new(DocumentSink::new(Arc::clone(storage))),
                SinkKind::Export => Box::new(CsvExportSink::new(Path::new(&config.export_dir))),
            }
        })
        .collect()
}
