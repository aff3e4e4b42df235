//! Per-category pagination state machine
//!
//! Each category owns one [`CategoryPagination`] behind its own mutex, so reports for
//! independent categories never contend or interfere. Pagination ends on an empty
//! page, on the page cap, or when a page is abandoned after retries.

use crate::model::{CategoryLabel, CrawlTask, TaskKind};
use crate::state::PaginationState;
use crate::storage::CategoryProgress;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Pagination progress of one category
#[derive(Debug, Clone)]
pub struct CategoryPagination {
    pub label: Arc<CategoryLabel>,
    pub state: PaginationState,
    /// Page currently being fetched (0 before the first listing task)
    pub current_page: u32,
    pub pages_fetched: u32,
    pub records_seen: u64,
    pub continuations: u32,
}

impl CategoryPagination {
    fn new(label: Arc<CategoryLabel>) -> Self {
        Self {
            label,
            state: PaginationState::Init,
            current_page: 0,
            pages_fetched: 0,
            records_seen: 0,
            continuations: 0,
        }
    }

    fn transition(&mut self, next: PaginationState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                category = %self.label.name,
                from = %self.state,
                to = %next,
                "Ignoring illegal pagination transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    pub fn progress(&self) -> CategoryProgress {
        CategoryProgress {
            category: self.label.name.clone(),
            source_url: self.label.source_url.to_string(),
            state: self.state,
            pages_fetched: self.pages_fetched,
            records_seen: self.records_seen,
        }
    }
}

/// Result of reporting a fetched listing page
#[derive(Debug, Clone)]
pub enum PageDecision {
    /// More pages remain; the continuation task must be enqueued
    Continue(CrawlTask),

    /// The category is done
    Exhausted,

    /// More pages remain but the run is stopping; the category stays unfinished
    Halted,

    /// The report was stale or the category is already terminal
    Ignored,
}

/// Drives how many listing pages each category fetches
pub struct PaginationController {
    max_pages: u32,
    categories: Mutex<HashMap<String, Arc<Mutex<CategoryPagination>>>>,
}

impl PaginationController {
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages,
            categories: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    fn entry(&self, label: &Arc<CategoryLabel>) -> Arc<Mutex<CategoryPagination>> {
        let mut categories = self
            .categories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            categories
                .entry(label.key())
                .or_insert_with(|| Arc::new(Mutex::new(CategoryPagination::new(Arc::clone(label))))),
        )
    }

    fn existing(&self, label: &CategoryLabel) -> Option<Arc<Mutex<CategoryPagination>>> {
        let categories = self
            .categories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        categories.get(&label.key()).cloned()
    }

    /// Starts pagination of a category at `first_page`
    ///
    /// Moves the category from `Init` to `Fetching` and returns the page 1 listing
    /// task. Returns None if the category was already started.
    pub fn start(&self, label: &Arc<CategoryLabel>, first_page: Url) -> Option<CrawlTask> {
        let entry = self.entry(label);
        let mut category = entry.lock().unwrap_or_else(PoisonError::into_inner);

        if category.state != PaginationState::Init {
            return None;
        }
        category.transition(PaginationState::Fetching);
        category.current_page = 1;

        tracing::debug!(category = %label.name, max_pages = self.max_pages, "Pagination started");
        Some(CrawlTask::listing(
            first_page,
            Arc::clone(label),
            1,
            self.max_pages,
        ))
    }

    /// Reports a successfully fetched listing page
    ///
    /// # Arguments
    ///
    /// * `task` - The listing task that was fetched
    /// * `records` - Number of item records the page yielded
    /// * `next_page` - Next-page target, if the page indicated one
    /// * `stopping` - Whether the run is stopping; no continuation is emitted then and
    ///   the category stays `Fetching` on the page just reported
    pub fn advance(
        &self,
        task: &CrawlTask,
        records: usize,
        next_page: Option<Url>,
        stopping: bool,
    ) -> PageDecision {
        let Some(label) = task.category.as_ref().filter(|_| task.kind == TaskKind::Listing) else {
            return PageDecision::Ignored;
        };
        let Some(entry) = self.existing(label) else {
            return PageDecision::Ignored;
        };
        let mut category = entry.lock().unwrap_or_else(PoisonError::into_inner);

        if category.state != PaginationState::Fetching || category.current_page != task.page_index
        {
            tracing::debug!(task = %task, state = %category.state, "Stale pagination report ignored");
            return PageDecision::Ignored;
        }

        category.pages_fetched += 1;
        category.records_seen += records as u64;

        let page = task.page_index;
        match next_page {
            Some(_) if stopping && records > 0 && page < task.max_pages => {
                tracing::debug!(category = %label.name, page, "Pagination halted by stop");
                PageDecision::Halted
            }
            Some(next) if records > 0 && page < task.max_pages => {
                category.transition(PaginationState::HasMore);
                category.transition(PaginationState::Fetching);
                category.current_page = page + 1;
                category.continuations += 1;
                PageDecision::Continue(CrawlTask::listing(
                    next,
                    Arc::clone(label),
                    page + 1,
                    task.max_pages,
                ))
            }
            _ => {
                category.transition(PaginationState::Exhausted);
                tracing::info!(
                    category = %label.name,
                    pages = category.pages_fetched,
                    records = category.records_seen,
                    "Category exhausted"
                );
                PageDecision::Exhausted
            }
        }
    }

    /// Reports that a category page or listing page was abandoned
    ///
    /// A Category task failure moves the category from `Init` to `Failed`; a Listing
    /// failure on the current page moves it from `Fetching` to `Failed`. Records
    /// already routed are kept.
    ///
    /// # Returns
    ///
    /// `true` if the category transitioned to `Failed`
    pub fn fail(&self, task: &CrawlTask) -> bool {
        let Some(label) = task.category.as_ref() else {
            return false;
        };

        let entry = match task.kind {
            TaskKind::Category => self.entry(label),
            TaskKind::Listing => match self.existing(label) {
                Some(entry) => entry,
                None => return false,
            },
            TaskKind::Detail => return false,
        };
        let mut category = entry.lock().unwrap_or_else(PoisonError::into_inner);

        let applies = match task.kind {
            TaskKind::Category => category.state == PaginationState::Init,
            _ => {
                category.state == PaginationState::Fetching
                    && category.current_page == task.page_index
            }
        };
        if !applies {
            return false;
        }

        let failed = category.transition(PaginationState::Failed);
        if failed {
            tracing::warn!(
                category = %label.name,
                page = task.page_index,
                pages = category.pages_fetched,
                "Category pagination failed"
            );
        }
        failed
    }

    /// Current state of a category, if it is known
    pub fn state(&self, label: &CategoryLabel) -> Option<PaginationState> {
        self.existing(label)
            .map(|entry| entry.lock().unwrap_or_else(PoisonError::into_inner).state)
    }

    /// Number of continuation tasks emitted for a category
    pub fn continuations(&self, label: &CategoryLabel) -> u32 {
        self.existing(label)
            .map(|entry| {
                entry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .continuations
            })
            .unwrap_or(0)
    }

    /// Progress of every known category, sorted by name
    pub fn snapshot(&self) -> Vec<CategoryProgress> {
        let entries: Vec<_> = self
            .categories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut progress: Vec<_> = entries
            .iter()
            .map(|entry| entry.lock().unwrap_or_else(PoisonError::into_inner).progress())
            .collect();
        progress.sort_by(|a, b| a.category.cmp(&b.category).then(a.source_url.cmp(&b.source_url)));
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn label(id: u32) -> Arc<CategoryLabel> {
        Arc::new(CategoryLabel::new(
            format!("Category {}", id),
            url(&format!("https://book.example.com/category/{}/", id)),
            None,
        ))
    }

    fn page_url(page: u32) -> Url {
        url(&format!("https://search.example.com/list?catId=43&page={}", page))
    }

    #[test]
    fn test_start_moves_to_fetching() {
        let controller = PaginationController::new(3);
        let label = label(43);

        let task = controller.start(&label, page_url(1)).unwrap();
        assert_eq!(task.kind, TaskKind::Listing);
        assert_eq!(task.page_index, 1);
        assert_eq!(task.max_pages, 3);
        assert_eq!(controller.state(&label), Some(PaginationState::Fetching));

        // Starting twice emits nothing
        assert!(controller.start(&label, page_url(1)).is_none());
    }

    #[test]
    fn test_pages_until_empty() {
        let controller = PaginationController::new(3);
        let label = label(43);

        let page1 = controller.start(&label, page_url(1)).unwrap();
        let page2 = match controller.advance(&page1, 20, Some(page_url(2)), false) {
            PageDecision::Continue(task) => task,
            other => panic!("expected continuation, got {:?}", other),
        };
        assert_eq!(page2.page_index, 2);

        let page3 = match controller.advance(&page2, 20, Some(page_url(3)), false) {
            PageDecision::Continue(task) => task,
            other => panic!("expected continuation, got {:?}", other),
        };
        assert_eq!(page3.page_index, 3);

        assert!(matches!(
            controller.advance(&page3, 0, Some(page_url(4)), false),
            PageDecision::Exhausted
        ));
        assert_eq!(controller.state(&label), Some(PaginationState::Exhausted));
        assert_eq!(controller.continuations(&label), 2);

        let progress = controller.snapshot();
        assert_eq!(progress[0].pages_fetched, 3);
        assert_eq!(progress[0].records_seen, 40);
    }

    #[test]
    fn test_empty_first_page_exhausts() {
        let controller = PaginationController::new(10);
        let label = label(1);
        let page1 = controller.start(&label, page_url(1)).unwrap();

        assert!(matches!(
            controller.advance(&page1, 0, Some(page_url(2)), false),
            PageDecision::Exhausted
        ));
        assert_eq!(controller.continuations(&label), 0);
    }

    #[test]
    fn test_page_cap_exhausts() {
        let controller = PaginationController::new(1);
        let label = label(1);
        let page1 = controller.start(&label, page_url(1)).unwrap();

        assert!(matches!(
            controller.advance(&page1, 20, Some(page_url(2)), false),
            PageDecision::Exhausted
        ));
    }

    #[test]
    fn test_missing_next_page_exhausts() {
        let controller = PaginationController::new(5);
        let label = label(1);
        let page1 = controller.start(&label, page_url(1)).unwrap();

        assert!(matches!(
            controller.advance(&page1, 20, None, false),
            PageDecision::Exhausted
        ));
    }

    #[test]
    fn test_listing_failure_keeps_progress() {
        let controller = PaginationController::new(5);
        let label = label(1);
        let page1 = controller.start(&label, page_url(1)).unwrap();
        let page2 = match controller.advance(&page1, 20, Some(page_url(2)), false) {
            PageDecision::Continue(task) => task,
            other => panic!("expected continuation, got {:?}", other),
        };

        assert!(controller.fail(&page2));
        assert_eq!(controller.state(&label), Some(PaginationState::Failed));
        assert_eq!(controller.snapshot()[0].records_seen, 20);

        // Terminal: later reports are ignored
        assert!(!controller.fail(&page2));
        assert!(matches!(
            controller.advance(&page2, 20, Some(page_url(3)), false),
            PageDecision::Ignored
        ));
    }

    #[test]
    fn test_stopping_emits_no_continuation() {
        let controller = PaginationController::new(5);
        let halted = label(1);
        let last = label(2);
        let page1 = controller.start(&halted, page_url(1)).unwrap();
        let only = controller.start(&last, page_url(1)).unwrap();

        assert!(matches!(
            controller.advance(&page1, 20, Some(page_url(2)), true),
            PageDecision::Halted
        ));
        assert_eq!(controller.continuations(&halted), 0);
        assert_eq!(controller.state(&halted), Some(PaginationState::Fetching));
        let progress = controller.snapshot();
        assert_eq!(progress[0].pages_fetched, 1);
        assert_eq!(progress[0].records_seen, 20);

        // An empty page still exhausts its category
        assert!(matches!(
            controller.advance(&only, 0, Some(page_url(2)), true),
            PageDecision::Exhausted
        ));
    }

    #[test]
    fn test_category_page_failure() {
        let controller = PaginationController::new(5);
        let label = label(7);
        let task = CrawlTask::category(label.source_url.clone(), Arc::clone(&label));

        assert!(controller.fail(&task));
        assert_eq!(controller.state(&label), Some(PaginationState::Failed));
        assert!(controller.start(&label, page_url(1)).is_none());
    }

    #[test]
    fn test_stale_report_ignored() {
        let controller = PaginationController::new(5);
        let label = label(1);
        let page1 = controller.start(&label, page_url(1)).unwrap();
        controller.advance(&page1, 20, Some(page_url(2)), false);

        // Page 1 reported again
        assert!(matches!(
            controller.advance(&page1, 20, Some(page_url(2)), false),
            PageDecision::Ignored
        ));
        assert_eq!(controller.continuations(&label), 1);
    }

    #[test]
    fn test_detail_failure_untouched() {
        let controller = PaginationController::new(5);
        let label = label(1);
        controller.start(&label, page_url(1)).unwrap();

        let detail = CrawlTask::detail(url("https://book.example.com/1/2/"), Some(Arc::clone(&label)));
        assert!(!controller.fail(&detail));
        assert_eq!(controller.state(&label), Some(PaginationState::Fetching));
    }

    #[test]
    fn test_categories_are_independent() {
        let controller = PaginationController::new(5);
        let a = label(1);
        let b = label(2);
        let a1 = controller.start(&a, page_url(1)).unwrap();
        controller.start(&b, page_url(1)).unwrap();

        controller.fail(&a1);
        assert_eq!(controller.state(&a), Some(PaginationState::Failed));
        assert_eq!(controller.state(&b), Some(PaginationState::Fetching));
        assert_eq!(controller.snapshot().len(), 2);
    }
}
