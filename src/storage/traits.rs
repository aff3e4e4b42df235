//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{CategoryRecord, ItemRecord};
use crate::storage::{CategoryProgress, RunRecord, RunStatus, RunTotals};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler. Callers share
/// one backend between the dedup filter and the sinks behind a mutex.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Gets up to `limit` runs, newest first
    fn list_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>>;

    /// Marks a run as finished with its final status and totals
    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()>;

    /// Records the final pagination state of a category for a run
    fn record_category_progress(
        &mut self,
        run_id: i64,
        progress: &CategoryProgress,
    ) -> StorageResult<()>;

    /// Gets the category progress rows of a run
    fn get_category_progress(&self, run_id: i64) -> StorageResult<Vec<CategoryProgress>>;

    // ===== Documents =====

    /// Inserts a record or merges it into the stored document with the same key
    ///
    /// Empty incoming fields never erase stored values, so applying the same record
    /// twice leaves the document identical to a single application.
    fn upsert_document(&mut self, record: &ItemRecord) -> StorageResult<()>;

    /// Gets a document by its natural key
    fn get_document(&self, key: &str) -> StorageResult<Option<ItemRecord>>;

    /// Gets total document count
    fn count_documents(&self) -> StorageResult<u64>;

    /// Gets document counts per category, largest first
    fn get_category_breakdown(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Categories =====

    /// Inserts a category or refreshes the stored row with the same URL
    fn upsert_category(&mut self, record: &CategoryRecord) -> StorageResult<()>;

    /// Gets a category by its URL
    fn get_category(&self, url: &str) -> StorageResult<Option<CategoryRecord>>;

    fn count_categories(&self) -> StorageResult<u64>;

    // ===== Dedup Keys =====

    /// Admits `key` into `scope`
    ///
    /// # Returns
    ///
    /// * `true` - The key was not present and has been recorded
    /// * `false` - The key was already present
    fn admit_key(&mut self, scope: &str, key: &str) -> StorageResult<bool>;

    /// Checks whether `key` is present in `scope`
    fn contains_key(&self, scope: &str, key: &str) -> StorageResult<bool>;

    /// Counts keys in `scope`
    fn count_keys(&self, scope: &str) -> StorageResult<u64>;

    /// Removes every key in `scope`, returning how many were removed
    fn clear_scope(&mut self, scope: &str) -> StorageResult<u64>;
}
