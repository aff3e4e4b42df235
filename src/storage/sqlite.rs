//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{CategoryRecord, ItemRecord};
use crate::state::PaginationState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{CategoryProgress, RunRecord, RunStatus, RunTotals};
use crate::KongfzError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage handle shared by the dedup filter, the sinks and the runner
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, \
     tasks_completed, tasks_retried, tasks_abandoned, records_routed";

const DOCUMENT_COLUMNS: &str = "title, author, publisher, condition_grade, price, listed_at, \
     seller_name, image_url, image_large_url, detail_url, source_url, category, crawled_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(KongfzError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, KongfzError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Several crawler processes may share one database file
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, KongfzError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Wraps this storage for sharing between tasks
    pub fn into_shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        totals: RunTotals {
            tasks_completed: row.get::<_, i64>(5)? as u64,
            tasks_retried: row.get::<_, i64>(6)? as u64,
            tasks_abandoned: row.get::<_, i64>(7)? as u64,
            records_routed: row.get::<_, i64>(8)? as u64,
        },
    })
}

fn parse_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<ItemRecord> {
    let crawled_at = parse_timestamp(row, 12)?;

    Ok(ItemRecord {
        title: row.get(0)?,
        author: row.get(1)?,
        publisher: row.get(2)?,
        condition_grade: row.get(3)?,
        price: row.get(4)?,
        listed_at: row.get(5)?,
        seller_name: row.get(6)?,
        image_url: row.get(7)?,
        image_large_url: row.get(8)?,
        detail_url: row.get(9)?,
        source_url: row.get(10)?,
        category: row.get(11)?,
        crawled_at,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                row_to_run,
            )
            .optional()?;

        Ok(run)
    }

    fn list_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![limit], row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, tasks_completed = ?3,
             tasks_retried = ?4, tasks_abandoned = ?5, records_routed = ?6
             WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                totals.tasks_completed as i64,
                totals.tasks_retried as i64,
                totals.tasks_abandoned as i64,
                totals.records_routed as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn record_category_progress(
        &mut self,
        run_id: i64,
        progress: &CategoryProgress,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO category_progress
             (run_id, category, source_url, state, pages_fetched, records_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                progress.category,
                progress.source_url,
                progress.state.to_db_string(),
                progress.pages_fetched,
                progress.records_seen as i64
            ],
        )?;
        Ok(())
    }

    fn get_category_progress(&self, run_id: i64) -> StorageResult<Vec<CategoryProgress>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, source_url, state, pages_fetched, records_seen
             FROM category_progress WHERE run_id = ?1 ORDER BY category",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(category, source_url, state, pages_fetched, records_seen)| {
                let state = PaginationState::from_db_string(&state).ok_or_else(|| {
                    StorageError::Serialization(format!("Unknown pagination state '{}'", state))
                })?;
                Ok(CategoryProgress {
                    category,
                    source_url,
                    state,
                    pages_fetched,
                    records_seen: records_seen as u64,
                })
            })
            .collect()
    }

    // ===== Documents =====

    fn upsert_document(&mut self, record: &ItemRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO documents (doc_key, title, author, publisher, condition_grade, price,
                 listed_at, seller_name, image_url, image_large_url, detail_url, source_url,
                 category, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(doc_key) DO UPDATE SET
                 title = COALESCE(NULLIF(excluded.title, ''), documents.title),
                 author = COALESCE(NULLIF(excluded.author, ''), documents.author),
                 publisher = COALESCE(NULLIF(excluded.publisher, ''), documents.publisher),
                 condition_grade = COALESCE(NULLIF(excluded.condition_grade, ''), documents.condition_grade),
                 price = COALESCE(NULLIF(excluded.price, ''), documents.price),
                 listed_at = COALESCE(NULLIF(excluded.listed_at, ''), documents.listed_at),
                 seller_name = COALESCE(NULLIF(excluded.seller_name, ''), documents.seller_name),
                 image_url = COALESCE(NULLIF(excluded.image_url, ''), documents.image_url),
                 image_large_url = COALESCE(NULLIF(excluded.image_large_url, ''), documents.image_large_url),
                 detail_url = COALESCE(NULLIF(excluded.detail_url, ''), documents.detail_url),
                 source_url = COALESCE(NULLIF(excluded.source_url, ''), documents.source_url),
                 category = COALESCE(NULLIF(excluded.category, ''), documents.category),
                 crawled_at = excluded.crawled_at",
            params![
                record.natural_key(),
                record.title,
                record.author,
                record.publisher,
                record.condition_grade,
                record.price,
                record.listed_at,
                record.seller_name,
                record.image_url,
                record.image_large_url,
                record.detail_url,
                record.source_url,
                record.category,
                record.crawled_at_string(),
            ],
        )?;
        Ok(())
    }

    fn get_document(&self, key: &str) -> StorageResult<Option<ItemRecord>> {
        let document = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM documents WHERE doc_key = ?1",
                    DOCUMENT_COLUMNS
                ),
                params![key],
                row_to_document,
            )
            .optional()?;

        Ok(document)
    }

    fn count_documents(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn get_category_breakdown(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) as count FROM documents
             GROUP BY category ORDER BY count DESC, category",
        )?;

        let breakdown = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(breakdown)
    }

    // ===== Categories =====

    fn upsert_category(&mut self, record: &CategoryRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO categories (url, name, parent, crawled_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET
                 name = COALESCE(NULLIF(excluded.name, ''), categories.name),
                 parent = COALESCE(NULLIF(excluded.parent, ''), categories.parent),
                 crawled_at = excluded.crawled_at",
            params![
                record.url,
                record.name,
                record.parent,
                record.crawled_at_string()
            ],
        )?;
        Ok(())
    }

    fn get_category(&self, url: &str) -> StorageResult<Option<CategoryRecord>> {
        let category = self
            .conn
            .query_row(
                "SELECT name, url, parent, crawled_at FROM categories WHERE url = ?1",
                params![url],
                |row| {
                    Ok(CategoryRecord {
                        name: row.get(0)?,
                        url: row.get(1)?,
                        parent: row.get(2)?,
                        crawled_at: parse_timestamp(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(category)
    }

    fn count_categories(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Dedup Keys =====

    fn admit_key(&mut self, scope: &str, key: &str) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO dedup_keys (scope, key, first_seen_at) VALUES (?1, ?2, ?3)",
            params![scope, key, now],
        )?;
        Ok(inserted == 1)
    }

    fn contains_key(&self, scope: &str, key: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM dedup_keys WHERE scope = ?1 AND key = ?2",
                params![scope, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn count_keys(&self, scope: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dedup_keys WHERE scope = ?1",
            params![scope],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn clear_scope(&mut self, scope: &str) -> StorageResult<u64> {
        let removed = self
            .conn
            .execute("DELETE FROM dedup_keys WHERE scope = ?1", params![scope])?;
        Ok(removed as u64)
    }
}
