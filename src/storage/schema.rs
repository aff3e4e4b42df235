//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    tasks_completed INTEGER NOT NULL DEFAULT 0,
    tasks_retried INTEGER NOT NULL DEFAULT 0,
    tasks_abandoned INTEGER NOT NULL DEFAULT 0,
    records_routed INTEGER NOT NULL DEFAULT 0
);

-- Catalog items, one row per natural key (detail URL, or listing URL)
CREATE TABLE IF NOT EXISTS documents (
    doc_key TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    publisher TEXT NOT NULL DEFAULT '',
    condition_grade TEXT NOT NULL DEFAULT '',
    price TEXT NOT NULL DEFAULT '',
    listed_at TEXT NOT NULL DEFAULT '',
    seller_name TEXT NOT NULL DEFAULT '',
    image_url TEXT NOT NULL DEFAULT '',
    image_large_url TEXT NOT NULL DEFAULT '',
    detail_url TEXT NOT NULL DEFAULT '',
    source_url TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    crawled_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category);

-- Catalog menu categories, one row per category URL
CREATE TABLE IF NOT EXISTS categories (
    url TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent TEXT NOT NULL DEFAULT '',
    crawled_at TEXT NOT NULL
);

-- Dedup key sets; admission is a single INSERT OR IGNORE
CREATE TABLE IF NOT EXISTS dedup_keys (
    scope TEXT NOT NULL,
    key TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    PRIMARY KEY (scope, key)
);

-- Final pagination state of every category touched by a run
CREATE TABLE IF NOT EXISTS category_progress (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    category TEXT NOT NULL,
    source_url TEXT NOT NULL,
    state TEXT NOT NULL,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    records_seen INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (run_id, source_url)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
