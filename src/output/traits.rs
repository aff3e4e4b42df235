//! Sink traits and error types
//!
//! A sink is a durable destination for item and category records. The router drives
//! every sink through the same explicit lifecycle: `open` once before the crawl,
//! `on_record` / `on_category` for each record, `close` once after the crawl.

use crate::model::{CategoryRecord, ItemRecord};
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur while delivering records to a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Sink {0} used before open")]
    NotOpen(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// What a sink did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The record was written
    Stored,

    /// The sink has already seen this record; later sinks are skipped
    Duplicate,

    /// The sink does not take records of this kind
    Skipped,
}

/// A destination for item records
///
/// Sinks are shared between crawl workers, so every method takes `&self`.
pub trait Sink: Send + Sync {
    /// Short name used in logs and run summaries
    fn name(&self) -> &str;

    /// Prepares the sink before the first record
    fn open(&self) -> SinkResult<()>;

    /// Delivers one item record
    fn on_record(&self, record: &ItemRecord) -> SinkResult<Delivery>;

    /// Delivers one category record; sinks that only take items skip it
    fn on_category(&self, _record: &CategoryRecord) -> SinkResult<Delivery> {
        Ok(Delivery::Skipped)
    }

    /// Flushes and releases the sink after the last record
    fn close(&self) -> SinkResult<()>;
}
