//! Frontier of pending crawl tasks
//!
//! Tasks are kept in three FIFO bands, one per [`TaskKind`], and dequeued in band
//! priority order (Category, then Listing, then Detail). Retried tasks are held
//! back until their backoff delay has elapsed.

use crate::crawler::dedup::DedupFilter;
use crate::model::{CrawlTask, TaskKind};
use crate::TaskError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of offering a task to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The task was queued
    Queued,

    /// The dedup filter has already seen the task's identity
    Duplicate,

    /// A listing task beyond its category's page cap
    OverPageLimit,
}

#[derive(Debug)]
struct Pending {
    task: CrawlTask,
    ready_at: Option<Instant>,
}

impl Pending {
    fn is_ready(&self, now: Instant) -> bool {
        self.ready_at.map_or(true, |at| at <= now)
    }
}

/// Ordered collection of pending crawl tasks
pub struct FrontierQueue {
    dedup: Arc<dyn DedupFilter>,
    bands: [VecDeque<Pending>; 3],
}

impl FrontierQueue {
    /// Creates an empty frontier admitting tasks through `dedup`
    pub fn new(dedup: Arc<dyn DedupFilter>) -> Self {
        Self {
            dedup,
            bands: Default::default(),
        }
    }

    /// Offers a new task to the frontier
    ///
    /// Category and Detail tasks are queued only when the dedup filter admits their
    /// identity. Listing continuations skip the filter and are bounded by their page
    /// cap instead.
    ///
    /// # Returns
    ///
    /// * `Ok(Admission)` - Whether the task was queued
    /// * `Err(TaskError::StoreUnavailable)` - The dedup filter could not be reached
    pub fn enqueue(&mut self, task: CrawlTask) -> Result<Admission, TaskError> {
        let admission = Self::admit(self.dedup.as_ref(), &task)?;
        if admission == Admission::Queued {
            self.push_admitted(task);
        }
        Ok(admission)
    }

    /// Runs the admission checks of [`enqueue`](Self::enqueue) without touching a queue
    ///
    /// A task answered with [`Admission::Queued`] has been recorded by the filter and
    /// must be handed to [`push_admitted`](Self::push_admitted).
    pub fn admit(dedup: &dyn DedupFilter, task: &CrawlTask) -> Result<Admission, TaskError> {
        if task.kind == TaskKind::Listing && task.page_index > task.max_pages {
            tracing::debug!(task = %task, "Listing page beyond page cap rejected");
            return Ok(Admission::OverPageLimit);
        }

        if task.kind.requires_dedup() && !dedup.admit(&task.identity())? {
            tracing::trace!(task = %task, "Duplicate task skipped");
            return Ok(Admission::Duplicate);
        }
        Ok(Admission::Queued)
    }

    /// Queues a task that already passed [`admit`](Self::admit)
    pub fn push_admitted(&mut self, task: CrawlTask) {
        self.push(task, None);
    }

    /// Re-inserts a retried task, to be released after `delay`
    ///
    /// The task's identity was admitted when it was first enqueued, so the dedup
    /// filter is not consulted again.
    pub fn requeue(&mut self, task: CrawlTask, delay: Duration) {
        let ready_at = (!delay.is_zero()).then(|| Instant::now() + delay);
        self.push(task, ready_at);
    }

    fn push(&mut self, task: CrawlTask, ready_at: Option<Instant>) {
        self.bands[task.kind.band()].push_back(Pending { task, ready_at });
    }

    /// Removes and returns the next ready task
    ///
    /// Returns None when the frontier is empty or every remaining task is still
    /// waiting out its backoff.
    pub fn dequeue(&mut self) -> Option<CrawlTask> {
        self.dequeue_at(Instant::now())
    }

    /// Like [`dequeue`](Self::dequeue), with an explicit clock
    pub fn dequeue_at(&mut self, now: Instant) -> Option<CrawlTask> {
        for band in self.bands.iter_mut() {
            if let Some(pos) = band.iter().position(|p| p.is_ready(now)) {
                return band.remove(pos).map(|p| p.task);
            }
        }
        None
    }

    /// How long until some queued task becomes ready
    ///
    /// * `None` - The frontier is empty
    /// * `Some(Duration::ZERO)` - A task can be dequeued now
    pub fn time_until_ready(&self) -> Option<Duration> {
        let now = Instant::now();
        self.bands
            .iter()
            .flatten()
            .map(|p| match p.ready_at {
                Some(at) => at.saturating_duration_since(now),
                None => Duration::ZERO,
            })
            .min()
    }

    /// Number of queued tasks, including delayed retries
    pub fn size(&self) -> usize {
        self.bands.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.iter().all(VecDeque::is_empty)
    }

    /// Number of queued tasks of one kind
    pub fn band_size(&self, kind: TaskKind) -> usize {
        self.bands[kind.band()].len()
    }
}
