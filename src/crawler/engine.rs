//! Crawl engine: the worker loop tying frontier, fetch, extraction, pagination,
//! routing and retries together
//!
//! Workers share one frontier behind a mutex that also counts in-flight tasks, so
//! "frontier empty and nothing in flight" is observed atomically and ends the run.
//! Workers only suspend while fetching and while sleeping for politeness or backoff.
//! Each task runs on its own tokio task; one that panics is abandoned like any other
//! failed task.

use crate::config::Config;
use crate::crawler::dedup::DedupFilter;
use crate::crawler::extract::{DiscoveredLink, Extractor};
use crate::crawler::frontier::{Admission, FrontierQueue};
use crate::crawler::pagination::{PageDecision, PaginationController};
use crate::crawler::pipeline::FetchPipeline;
use crate::crawler::retry::{classify, FailureClass, RetryDecision, RetryPolicy};
use crate::crawler::router::ItemRouter;
use crate::crawler::summary::{AbandonedTask, RunSummary};
use crate::model::{CategoryLabel, CategoryRecord, CrawlTask, ItemRecord, TaskKind};
use crate::state::HostPacer;
use crate::{KongfzError, TaskError};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use url::Url;

/// Longest time an idle worker sleeps before re-checking the frontier
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Completed tasks between progress log lines
const PROGRESS_INTERVAL: u64 = 25;

/// Result of fetching and extracting one task
#[derive(Debug)]
pub enum CrawlOutcome {
    Success {
        links: Vec<DiscoveredLink>,
        records: Vec<ItemRecord>,
        categories: Vec<CategoryRecord>,
        next_page: Option<Url>,
    },
    Transient(TaskError),
    Permanent(TaskError),
}

impl CrawlOutcome {
    /// Wraps a failure according to its retry classification
    pub fn failure(error: TaskError) -> Self {
        match classify(&error) {
            FailureClass::Transient => Self::Transient(error),
            FailureClass::Permanent => Self::Permanent(error),
        }
    }
}

/// Tuning of the worker loop
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of concurrent workers
    pub concurrency: usize,

    /// Minimum time between requests to the same host
    pub politeness_delay: Duration,

    /// Hard timeout of one fetch
    pub fetch_timeout: Duration,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.crawler.concurrency.max(1) as usize,
            politeness_delay: Duration::from_millis(config.crawler.politeness_delay),
            fetch_timeout: Duration::from_secs(config.crawler.fetch_timeout),
        }
    }
}

struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

/// Asks a running engine to stop
///
/// Workers stop dequeuing; in-flight fetches complete but enqueue nothing new.
#[derive(Clone)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(StopInner {
                stopped: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop requested, finishing in-flight tasks");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

struct WorkState {
    frontier: FrontierQueue,
    in_flight: usize,
}

/// State of one run shared by its workers
struct RunContext {
    work: Mutex<WorkState>,
    wake: Notify,
    completed: AtomicU64,
    retried: AtomicU64,
    routed: AtomicU64,
    categories_routed: AtomicU64,
    dropped: AtomicU64,
    abandoned: Mutex<Vec<AbandonedTask>>,
}

impl RunContext {
    fn work(&self) -> MutexGuard<'_, WorkState> {
        self.work.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Next {
    Task(CrawlTask),
    Wait(Duration),
    Done,
}

/// The crawl orchestration engine
pub struct CrawlEngine {
    pipeline: FetchPipeline,
    extractor: Arc<dyn Extractor>,
    router: ItemRouter,
    dedup: Arc<dyn DedupFilter>,
    retry: RetryPolicy,
    pagination: PaginationController,
    pacer: HostPacer,
    options: EngineOptions,
    stop: StopHandle,
}

impl CrawlEngine {
    /// Creates an engine
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Fetcher wrapped in its request and response stages
    /// * `extractor` - Turns responses into links, records and next pages
    /// * `router` - Sinks receiving every extracted record
    /// * `dedup` - Admission filter of the frontier
    /// * `retry` - Classification and backoff of failures
    /// * `max_pages` - Listing page cap per category
    /// * `options` - Worker loop tuning
    pub fn new(
        pipeline: FetchPipeline,
        extractor: Arc<dyn Extractor>,
        router: ItemRouter,
        dedup: Arc<dyn DedupFilter>,
        retry: RetryPolicy,
        max_pages: u32,
        options: EngineOptions,
    ) -> Self {
        Self {
            pipeline,
            extractor,
            router,
            dedup,
            retry,
            pagination: PaginationController::new(max_pages),
            pacer: HostPacer::new(options.politeness_delay),
            options,
            stop: StopHandle::new(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn pagination(&self) -> &PaginationController {
        &self.pagination
    }

    /// Crawls from `seeds` until the frontier drains or the engine is stopped
    ///
    /// Sinks are opened before the first task and closed after the last one. Task
    /// failures never end the run; only a sink that cannot be opened or a seed that
    /// cannot be admitted does.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished (or was stopped)
    /// * `Err(KongfzError)` - The run could not start
    pub async fn run(self: Arc<Self>, seeds: Vec<Url>) -> Result<RunSummary, KongfzError> {
        let started = Instant::now();
        self.router.open_all()?;

        let mut frontier = FrontierQueue::new(Arc::clone(&self.dedup));
        for seed in seeds {
            let label = Arc::new(CategoryLabel::root(&seed));
            let task = CrawlTask::category(seed, label);
            match frontier.enqueue(task) {
                Ok(admission) => tracing::debug!(?admission, "Seed offered to frontier"),
                Err(e) => {
                    self.router.close_all();
                    return Err(e.into());
                }
            }
        }

        let ctx = Arc::new(RunContext {
            work: Mutex::new(WorkState {
                frontier,
                in_flight: 0,
            }),
            wake: Notify::new(),
            completed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            routed: AtomicU64::new(0),
            categories_routed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            abandoned: Mutex::new(Vec::new()),
        });

        tracing::info!(
            workers = self.options.concurrency,
            max_pages = self.pagination.max_pages(),
            sinks = ?self.router.sink_names(),
            "Crawl started"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.options.concurrency {
            let engine = Arc::clone(&self);
            let ctx = Arc::clone(&ctx);
            workers.spawn(engine.worker(worker_id, ctx));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Crawl worker terminated abnormally");
            }
        }

        let close_failures = self.router.close_all();
        if close_failures > 0 {
            tracing::warn!(sinks = close_failures, "Some sinks failed to close");
        }

        let abandoned = std::mem::take(
            &mut *ctx.abandoned.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let summary = RunSummary {
            tasks_completed: ctx.completed.load(Ordering::Relaxed),
            tasks_retried: ctx.retried.load(Ordering::Relaxed),
            abandoned,
            records_routed: ctx.routed.load(Ordering::Relaxed),
            categories_routed: ctx.categories_routed.load(Ordering::Relaxed),
            records_dropped: ctx.dropped.load(Ordering::Relaxed),
            sinks: self.router.sink_stats(),
            categories: self.pagination.snapshot(),
            stopped: self.stop.is_stopped(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            completed = summary.tasks_completed,
            retried = summary.tasks_retried,
            abandoned = summary.tasks_abandoned(),
            records = summary.records_routed,
            elapsed_secs = summary.elapsed.as_secs(),
            "Crawl finished"
        );
        Ok(summary)
    }

    async fn worker(self: Arc<Self>, worker_id: usize, ctx: Arc<RunContext>) {
        tracing::trace!(worker_id, "Worker started");
        loop {
            let notified = ctx.wake.notified();
            let next = {
                let mut work = ctx.work();
                if self.stop.is_stopped() {
                    Next::Done
                } else if let Some(task) = work.frontier.dequeue() {
                    work.in_flight += 1;
                    Next::Task(task)
                } else if work.frontier.is_empty() && work.in_flight == 0 {
                    Next::Done
                } else {
                    Next::Wait(work.frontier.time_until_ready().unwrap_or(IDLE_POLL).min(IDLE_POLL))
                }
            };

            match next {
                Next::Done => {
                    ctx.wake.notify_waiters();
                    break;
                }
                Next::Wait(wait) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.stop.stopped() => {}
                    }
                }
                Next::Task(task) => {
                    let processing = tokio::spawn({
                        let engine = Arc::clone(&self);
                        let ctx = Arc::clone(&ctx);
                        let task = task.clone();
                        async move { engine.process(&ctx, task).await }
                    });
                    if let Err(e) = processing.await {
                        let error = if e.is_panic() {
                            format!("task panicked: {}", panic_message(e.into_panic()))
                        } else {
                            e.to_string()
                        };
                        tracing::error!(task = %task, error = %error, "Task processing aborted");
                        self.abandon(&ctx, &task, error);
                    }
                    ctx.work().in_flight -= 1;
                    ctx.wake.notify_waiters();
                }
            }
        }
        tracing::trace!(worker_id, "Worker finished");
    }

    async fn process(&self, ctx: &RunContext, task: CrawlTask) {
        if let Some(host) = task.target.host_str() {
            self.pacer.wait_turn(host).await;
        }

        tracing::debug!(task = %task, attempt = task.attempt, "Fetching");
        match self.fetch_and_extract(&task).await {
            CrawlOutcome::Success {
                links,
                records,
                categories,
                next_page,
            } => {
                let routed = self.handle_success(ctx, &task, links, records, categories, next_page);
                if let Err(e) = routed {
                    self.handle_failure(ctx, task, e);
                }
            }
            CrawlOutcome::Transient(e) | CrawlOutcome::Permanent(e) => {
                self.handle_failure(ctx, task, e);
            }
        }
    }

    /// Fetches a task under the hard timeout and extracts the response
    pub async fn fetch_and_extract(&self, task: &CrawlTask) -> CrawlOutcome {
        let response =
            match tokio::time::timeout(self.options.fetch_timeout, self.pipeline.execute(task)).await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return CrawlOutcome::failure(e),
                Err(_) => {
                    return CrawlOutcome::Transient(TaskError::Timeout {
                        url: task.target.to_string(),
                    })
                }
            };

        match self.extractor.extract(task, &response) {
            Ok(extraction) => CrawlOutcome::Success {
                links: extraction.links,
                records: extraction.records,
                categories: extraction.categories,
                next_page: extraction.next_page,
            },
            Err(e) => CrawlOutcome::failure(e),
        }
    }

    /// Applies a successful outcome
    ///
    /// Links are admitted first; a dedup store failure there fails the whole outcome
    /// before any record is routed. Admission consults the dedup filter without
    /// holding the frontier lock.
    fn handle_success(
        &self,
        ctx: &RunContext,
        task: &CrawlTask,
        links: Vec<DiscoveredLink>,
        records: Vec<ItemRecord>,
        categories: Vec<CategoryRecord>,
        next_page: Option<Url>,
    ) -> Result<(), TaskError> {
        let stopping = self.stop.is_stopped();

        if !stopping && !links.is_empty() {
            let mut admitted = Vec::new();
            let mut failure = None;
            for link in links {
                let link_task = link.into_task();
                match FrontierQueue::admit(self.dedup.as_ref(), &link_task) {
                    Ok(Admission::Queued) => admitted.push(link_task),
                    Ok(_) => {}
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            let queued = admitted.len();
            if queued > 0 {
                let mut work = ctx.work();
                for link_task in admitted {
                    work.frontier.push_admitted(link_task);
                }
            }
            tracing::debug!(task = %task, queued, "Links admitted");
            if let Some(e) = failure {
                return Err(e);
            }
        }

        for category in &categories {
            let report = self.router.route_category(category);
            ctx.categories_routed.fetch_add(1, Ordering::Relaxed);
            if report.is_dropped() {
                ctx.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        for record in &records {
            let report = self.router.route(record);
            ctx.routed.fetch_add(1, Ordering::Relaxed);
            if report.is_dropped() {
                ctx.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let continuation = match task.kind {
            TaskKind::Category => match (next_page, task.category.as_ref()) {
                (Some(first_page), Some(label)) if !stopping => {
                    self.pagination.start(label, first_page)
                }
                _ => None,
            },
            TaskKind::Listing => {
                match self.pagination.advance(task, records.len(), next_page, stopping) {
                    PageDecision::Continue(next) => Some(next),
                    _ => None,
                }
            }
            TaskKind::Detail => None,
        };
        if let Some(next) = continuation {
            let admission = ctx.work().frontier.enqueue(next);
            if let Err(e) = admission {
                tracing::warn!(task = %task, error = %e, "Failed to queue next listing page");
            }
        }

        let completed = ctx.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if completed % PROGRESS_INTERVAL == 0 {
            let work = ctx.work();
            tracing::info!(
                completed,
                frontier = work.frontier.size(),
                in_flight = work.in_flight,
                records = ctx.routed.load(Ordering::Relaxed),
                "Progress"
            );
        }
        Ok(())
    }

    fn handle_failure(&self, ctx: &RunContext, task: CrawlTask, error: TaskError) {
        match self.retry.decide(&error, task.attempt) {
            RetryDecision::Retry { delay, attempt } => {
                if self.stop.is_stopped() {
                    tracing::info!(task = %task, error = %error, "Not retrying after stop");
                    return;
                }
                tracing::info!(
                    task = %task,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying task"
                );
                ctx.retried.fetch_add(1, Ordering::Relaxed);
                ctx.work().frontier.requeue(task.retried(), delay);
            }
            RetryDecision::Abandon { reason } => {
                tracing::warn!(task = %task, identity = %task.identity(), error = %error, reason = %reason, "Task abandoned");
                self.abandon(ctx, &task, error.to_string());
            }
        }
    }

    fn abandon(&self, ctx: &RunContext, task: &CrawlTask, error: String) {
        self.pagination.fail(task);
        ctx.abandoned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AbandonedTask {
                target: task.target.to_string(),
                kind: task.kind,
                attempt: task.attempt,
                error,
            });
    }
}

/// Text of a panic payload
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
