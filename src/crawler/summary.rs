//! Run summary returned by the crawl engine

use crate::model::TaskKind;
use crate::state::PaginationState;
use crate::storage::{CategoryProgress, RunTotals};
use std::time::Duration;

/// A task the engine gave up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedTask {
    /// Target URL of the task
    pub target: String,
    pub kind: TaskKind,
    /// Retry count when the task was abandoned
    pub attempt: u32,
    /// Final error
    pub error: String,
}

/// Delivery counters of one sink
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub name: String,
    pub stored: u64,
    pub duplicate: u64,
    pub failed: u64,
}

/// Outcome of a whole crawl run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub tasks_completed: u64,
    pub tasks_retried: u64,
    pub abandoned: Vec<AbandonedTask>,

    /// Item records handed to the router
    pub records_routed: u64,

    /// Category records handed to the router
    pub categories_routed: u64,

    /// Records every sink failed to accept
    pub records_dropped: u64,

    pub sinks: Vec<SinkStats>,
    pub categories: Vec<CategoryProgress>,

    /// Whether the run was cut short by its stop handle
    pub stopped: bool,

    pub elapsed: Duration,
}

impl RunSummary {
    pub fn tasks_abandoned(&self) -> u64 {
        self.abandoned.len() as u64
    }

    /// Number of categories that ended in `state`
    pub fn categories_in(&self, state: PaginationState) -> usize {
        self.categories.iter().filter(|c| c.state == state).count()
    }

    /// Categories that never reached a terminal state
    pub fn unfinished_categories(&self) -> impl Iterator<Item = &CategoryProgress> {
        self.categories.iter().filter(|c| !c.state.is_terminal())
    }

    /// Counters of the sink called `name`
    pub fn sink(&self, name: &str) -> Option<&SinkStats> {
        self.sinks.iter().find(|s| s.name == name)
    }

    /// Totals stored with the run record
    pub fn totals(&self) -> RunTotals {
        RunTotals {
            tasks_completed: self.tasks_completed,
            tasks_retried: self.tasks_retried,
            tasks_abandoned: self.tasks_abandoned(),
            records_routed: self.records_routed,
        }
    }
}
