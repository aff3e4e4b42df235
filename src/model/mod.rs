//! Crawl data model
//!
//! - `CrawlTask` / `TaskKind`: units of crawl work and their priority bands
//! - `CategoryLabel`: immutable category identity shared by downstream tasks
//! - `ItemRecord`: a normalized catalog item, plus its CSV projection
//! - `CategoryRecord`: a menu category as persisted by the sinks

mod record;
mod task;

pub use record::{
    normalize_price, normalize_text, CategoryRecord, ExportRow, ItemRecord, RawRecord,
    EXPORT_COLUMNS,
};
pub use task::{CategoryLabel, CrawlTask, TaskKind};
