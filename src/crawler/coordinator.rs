//! Crawler coordinator - wiring and bookkeeping around one crawl run
//!
//! This module assembles a [`CrawlEngine`] from configuration and records the run:
//! - Initializing storage and the run row
//! - Choosing the dedup filter (per-run memory or persistent scope)
//! - Building sinks, session, fetch pipeline and extractor
//! - Persisting category progress and final totals
//! - Writing the markdown run report

use crate::config::Config;
use crate::crawler::dedup::{DedupFilter, MemoryDedup, SqliteDedup};
use crate::crawler::engine::{CrawlEngine, EngineOptions, StopHandle};
use crate::crawler::extract::CatalogExtractor;
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::pipeline::FetchPipeline;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::router::ItemRouter;
use crate::crawler::summary::RunSummary;
use crate::output::{build_sinks, generate_markdown_summary, report_path, RECORD_SCOPE};
use crate::session::build_session_provider;
use crate::storage::{RunStatus, SharedStorage, SqliteStorage, Storage};
use crate::url::normalize_url;
use crate::KongfzError;
use std::path::Path;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

/// Per-invocation options layered over the configuration file
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Forget dedup keys of earlier runs before starting
    pub fresh: bool,

    /// Overrides `crawler.max-pages`
    pub max_pages: Option<u32>,

    /// Hash of the configuration file, stored with the run
    pub config_hash: String,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    storage: SharedStorage,
    engine: Arc<CrawlEngine>,
    seeds: Vec<Url>,
    run_id: i64,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `options` - Per-invocation overrides
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(KongfzError)` - Failed to initialize
    pub fn new(config: Config, options: RunOptions) -> Result<Self, KongfzError> {
        let seeds = config
            .crawler
            .seeds
            .iter()
            .map(|seed| normalize_url(seed))
            .collect::<Result<Vec<_>, _>>()?;

        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let run_id = storage.create_run(&options.config_hash)?;
        tracing::info!(run_id, "Created crawl run");
        let storage = storage.into_shared();

        let dedup = build_dedup(&config, &storage, run_id, options.fresh)?;

        let router = ItemRouter::new(build_sinks(&config.output, &storage));
        let session = build_session_provider(&config.session)?;
        let fetcher = HttpFetcher::from_config(
            &config.http,
            Duration::from_secs(config.crawler.fetch_timeout),
        )?;
        let pipeline = FetchPipeline::standard(Arc::new(fetcher), session);
        let extractor = CatalogExtractor::from_config(&config)?;

        let max_pages = options.max_pages.unwrap_or(config.crawler.max_pages);
        let engine = CrawlEngine::new(
            pipeline,
            Arc::new(extractor),
            router,
            dedup,
            RetryPolicy::from_config(&config.retry),
            max_pages,
            EngineOptions::from_config(&config),
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            engine: Arc::new(engine),
            seeds,
            run_id,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Handle that stops the crawl gracefully, e.g. on Ctrl-C
    pub fn stop_handle(&self) -> StopHandle {
        self.engine.stop_handle()
    }

    fn storage(&self) -> MutexGuard<'_, SqliteStorage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the crawl and records its outcome
    ///
    /// The run is marked `Completed` when the frontier drained, `Interrupted` when it
    /// was stopped and `Failed` when the engine could not start.
    pub async fn run(self) -> Result<RunSummary, KongfzError> {
        tracing::info!(run_id = self.run_id, seeds = self.seeds.len(), "Starting crawl run");

        let result = Arc::clone(&self.engine).run(self.seeds.clone()).await;
        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(run_id = self.run_id, error = %e, "Crawl run failed");
                self.storage()
                    .complete_run(self.run_id, RunStatus::Failed, &Default::default())?;
                return Err(e);
            }
        };

        let status = if summary.stopped {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        let run = {
            let mut storage = self.storage();
            for progress in &summary.categories {
                storage.record_category_progress(self.run_id, progress)?;
            }
            storage.complete_run(self.run_id, status, &summary.totals())?;
            storage.get_run(self.run_id)?
        };

        let path = report_path(Path::new(&self.config.output.export_dir), self.run_id);
        match generate_markdown_summary(&run, &summary, &path) {
            Ok(()) => tracing::info!(path = %path.display(), "Wrote run report"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to write run report"),
        }

        Ok(summary)
    }
}

/// Chooses the dedup filter of a run
///
/// Persistent filters share the configured scope across runs, or get a scope of
/// their own per run when none is configured.
fn build_dedup(
    config: &Config,
    storage: &SharedStorage,
    run_id: i64,
    fresh: bool,
) -> Result<Arc<dyn DedupFilter>, KongfzError> {
    if fresh {
        let mut db = storage.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cleared = db.clear_scope(RECORD_SCOPE)?;
        if let Some(scope) = config.dedup.scope.as_deref() {
            cleared += db.clear_scope(scope)?;
        }
        tracing::info!(keys = cleared, "Fresh run, cleared dedup keys");
    }

    if !config.dedup.persistent {
        return Ok(Arc::new(MemoryDedup::new()));
    }

    let scope = config
        .dedup
        .scope
        .clone()
        .unwrap_or_else(|| format!("run-{}", run_id));
    let known = storage
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .count_keys(&scope)?;
    tracing::info!(scope = %scope, known, "Using persistent dedup filter");
    Ok(Arc::new(SqliteDedup::new(Arc::clone(storage), scope)))
}

/// Runs a complete crawl with the given configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `options` - Per-invocation overrides
///
/// # Returns
///
/// * `Ok(RunSummary)` - Crawl finished (or was stopped)
/// * `Err(KongfzError)` - Crawl failed with an error
///
/// # Example
///
/// ```no_run
/// use kongfz_crawler::config::load_config;
/// use kongfz_crawler::crawler::{run_crawl, RunOptions};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let summary = run_crawl(config, RunOptions::default()).await?;
/// println!("{} records", summary.records_routed);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, options: RunOptions) -> Result<RunSummary, KongfzError> {
    Coordinator::new(config, options)?.run().await
}
