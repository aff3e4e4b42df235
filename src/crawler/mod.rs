//! Crawler module: crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - Dedup filters, retry policy and the banded frontier
//! - Per-category pagination state
//! - Fetching through ordered request and response stages
//! - Extraction of links, records and next pages
//! - Routing records to sinks
//! - The worker engine and the run coordinator

mod coordinator;
mod dedup;
mod engine;
mod extract;
mod fetcher;
mod frontier;
mod pagination;
mod pipeline;
mod retry;
mod router;
mod summary;

pub use coordinator::{run_crawl, Coordinator, RunOptions};
pub use dedup::{DedupEntry, DedupFilter, MemoryDedup, SqliteDedup};
pub use engine::{CrawlEngine, CrawlOutcome, EngineOptions, StopHandle};
pub use extract::{CatalogExtractor, DiscoveredLink, Extraction, Extractor};
pub use fetcher::{build_http_client, FetchRequest, FetchResponse, Fetcher, HttpFetcher};
pub use frontier::{Admission, FrontierQueue};
pub use pagination::{CategoryPagination, PageDecision, PaginationController};
pub use pipeline::{
    is_login_url, BrowserHeaders, FetchPipeline, LoginRedirect, RequestStage, ResponseStage,
    SessionCookies, StatusCheck,
};
pub use retry::{classify, FailureClass, RetryDecision, RetryPolicy};
pub use router::{ItemRouter, RouteReport};
pub use summary::{AbandonedTask, RunSummary, SinkStats};
