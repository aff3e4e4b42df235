use crate::url::fingerprint;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// What a crawl task fetches
///
/// The declaration order is the frontier priority order: categories are surfaced
/// first so catalog breadth is discovered before depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// A catalog category page (HTML) that links to sub-categories and listings
    Category,

    /// One page of a category listing (JSON API)
    Listing,

    /// An item detail page (HTML)
    Detail,
}

impl TaskKind {
    /// Index of the frontier priority band for this kind
    pub fn band(&self) -> usize {
        match self {
            Self::Category => 0,
            Self::Listing => 1,
            Self::Detail => 2,
        }
    }

    /// Whether tasks of this kind pass through the dedup filter on enqueue
    ///
    /// Listing continuations share their category's identity and are bounded by the
    /// page cap instead.
    pub fn requires_dedup(&self) -> bool {
        matches!(self, Self::Category | Self::Detail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Listing => "listing",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog category discovered during the crawl
///
/// Labels are immutable once created and shared by reference with every task and
/// record that descends from the category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLabel {
    /// Display name of the category
    pub name: String,

    /// URL of the category page; identifies the category's pagination state
    pub source_url: Url,

    /// Name of the parent category, if any
    pub parent: Option<String>,
}

impl CategoryLabel {
    pub fn new(name: impl Into<String>, source_url: Url, parent: Option<String>) -> Self {
        Self {
            name: name.into(),
            source_url,
            parent,
        }
    }

    /// Label for a crawl seed (the catalog root)
    pub fn root(seed: &Url) -> Self {
        Self::new(seed.host_str().unwrap_or("root"), seed.clone(), None)
    }

    /// Key identifying this category's pagination state
    pub fn key(&self) -> String {
        fingerprint(&self.source_url)
    }
}

/// One unit of crawl work
#[derive(Debug, Clone)]
pub struct CrawlTask {
    /// URL to fetch
    pub target: Url,

    /// What the target is
    pub kind: TaskKind,

    /// Category this task belongs to
    pub category: Option<Arc<CategoryLabel>>,

    /// Listing page number (1-based); 0 for non-listing tasks
    pub page_index: u32,

    /// Listing page cap for the owning category; 0 for non-listing tasks
    pub max_pages: u32,

    /// Number of retries already scheduled for this task
    pub attempt: u32,
}

impl CrawlTask {
    /// Creates a category task whose own label is `category`
    pub fn category(target: Url, category: Arc<CategoryLabel>) -> Self {
        Self {
            target,
            kind: TaskKind::Category,
            category: Some(category),
            page_index: 0,
            max_pages: 0,
            attempt: 0,
        }
    }

    /// Creates a listing-page task
    pub fn listing(
        target: Url,
        category: Arc<CategoryLabel>,
        page_index: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            target,
            kind: TaskKind::Listing,
            category: Some(category),
            page_index,
            max_pages,
            attempt: 0,
        }
    }

    /// Creates an item detail task
    pub fn detail(target: Url, category: Option<Arc<CategoryLabel>>) -> Self {
        Self {
            target,
            kind: TaskKind::Detail,
            category,
            page_index: 0,
            max_pages: 0,
            attempt: 0,
        }
    }

    /// Dedup identity: fingerprint of the normalized target
    pub fn identity(&self) -> String {
        fingerprint(&self.target)
    }

    /// Name of the owning category, if any
    pub fn category_name(&self) -> Option<&str> {
        self.category.as_deref().map(|c| c.name.as_str())
    }

    /// Returns a copy of this task for its next retry
    pub fn retried(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

impl fmt::Display for CrawlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TaskKind::Listing => write!(
                f,
                "{} {} (page {}/{})",
                self.kind, self.target, self.page_index, self.max_pages
            ),
            _ => write!(f, "{} {}", self.kind, self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_priority_order() {
        assert!(TaskKind::Category < TaskKind::Listing);
        assert!(TaskKind::Listing < TaskKind::Detail);
        assert_eq!(TaskKind::Category.band(), 0);
        assert_eq!(TaskKind::Detail.band(), 2);
    }

    #[test]
    fn test_requires_dedup() {
        assert!(TaskKind::Category.requires_dedup());
        assert!(TaskKind::Detail.requires_dedup());
        assert!(!TaskKind::Listing.requires_dedup());
    }

    #[test]
    fn test_identity_ignores_fragment() {
        let a = CrawlTask::detail(url("https://example.com/book/1#top"), None);
        let b = CrawlTask::detail(url("https://example.com/book/1"), None);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_retried_increments_attempt_only() {
        let label = Arc::new(CategoryLabel::root(&url("https://example.com/")));
        let task = CrawlTask::listing(url("https://example.com/list?page=2"), label, 2, 5);
        let retry = task.retried().retried();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.page_index, 2);
        assert_eq!(retry.max_pages, 5);
        assert_eq!(retry.target, task.target);
    }

    #[test]
    fn test_category_label_shared() {
        let label = Arc::new(CategoryLabel::new(
            "Literature",
            url("https://example.com/category/3"),
            Some("root".to_string()),
        ));
        let task = CrawlTask::category(label.source_url.clone(), Arc::clone(&label));
        assert_eq!(task.category_name(), Some("Literature"));
        assert_eq!(Arc::strong_count(&label), 2);
    }

    #[test]
    fn test_display() {
        let label = Arc::new(CategoryLabel::root(&url("https://example.com/")));
        let task = CrawlTask::listing(url("https://example.com/list"), label, 1, 10);
        assert_eq!(task.to_string(), "listing https://example.com/list (page 1/10)");
    }
}
