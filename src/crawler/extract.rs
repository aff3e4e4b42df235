//! Field extraction from fetched catalog pages
//!
//! This module turns a fetched response into what the engine consumes:
//! - Links to new tasks (sub-categories, item detail pages)
//! - Normalized item records, and a category record per menu entry
//! - The next-page target of a category's pagination
//!
//! Category and detail pages are HTML. Listing pages come from a JSON API; an HTML
//! listing is read as a fallback and paginates through its explicit "next" link.

use crate::config::Config;
use crate::crawler::fetcher::FetchResponse;
use crate::model::{CategoryLabel, CategoryRecord, CrawlTask, ItemRecord, RawRecord, TaskKind};
use crate::url::extract_category_id;
use crate::{ConfigError, TaskError};
use chrono::Utc;
use scraper::{Html, Selector};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use url::Url;

/// Catalog menu entries on category pages
static CATEGORY_LINKS: LazyLock<Option<Selector>> = LazyLock::new(|| {
    Selector::parse("div.cagetory-box div.list-group div.list-group-item div.item-text a").ok()
});

static HEADING: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("h1").ok());

static BODY: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("body").ok());

/// Product entries of an HTML listing page
static LISTING_ITEMS: LazyLock<Option<Selector>> = LazyLock::new(|| {
    Selector::parse("div.product-item, div.book-item, li.item").ok()
});

static ITEM_TITLE: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("h3 a, h4 a, a.title, div.title a").ok());

static ITEM_PRICE: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse(".price").ok());

static ITEM_SELLER: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse(".seller, a.shop").ok());

static NEXT_LINK: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("a.next, li.next a").ok());

static ANCHOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("a").ok());

/// Anchor text of a "next page" link
const NEXT_PAGE_TEXT: &str = "下一页";

/// Field labels on item detail pages
const AUTHOR_LABELS: &[&str] = &["作者"];
const PUBLISHER_LABELS: &[&str] = &["出版社", "出版人"];
const CONDITION_LABELS: &[&str] = &["品相"];
const PRICE_LABELS: &[&str] = &["售价", "价格"];
const SELLER_LABELS: &[&str] = &["店铺", "书店"];

/// A link to a new crawl task
#[derive(Debug, Clone)]
pub struct DiscoveredLink {
    pub url: Url,
    pub kind: TaskKind,
    /// Category the new task belongs to; for Category links, its own label
    pub label: Option<Arc<CategoryLabel>>,
}

impl DiscoveredLink {
    /// Converts the link into a crawl task
    ///
    /// Category links without a label get one named after their URL.
    pub fn into_task(self) -> CrawlTask {
        match self.kind {
            TaskKind::Detail => CrawlTask::detail(self.url, self.label),
            _ => {
                let label = self
                    .label
                    .unwrap_or_else(|| Arc::new(CategoryLabel::root(&self.url)));
                CrawlTask::category(self.url, label)
            }
        }
    }
}

/// What one fetched page yielded
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub links: Vec<DiscoveredLink>,
    pub records: Vec<ItemRecord>,
    pub categories: Vec<CategoryRecord>,
    pub next_page: Option<Url>,
}

/// Extraction collaborator of the crawl engine
pub trait Extractor: Send + Sync {
    /// Extracts links, records and the next-page target from a response
    ///
    /// # Returns
    ///
    /// * `Ok(Extraction)` - What the page yielded (possibly nothing)
    /// * `Err(TaskError::Schema)` - The payload does not have the expected shape
    fn extract(&self, task: &CrawlTask, response: &FetchResponse) -> Result<Extraction, TaskError>;
}

/// Extractor for the kongfz book catalog
#[derive(Debug, Clone)]
pub struct CatalogExtractor {
    listing_api: Url,
    user_area: String,
    follow_details: bool,
}

impl CatalogExtractor {
    pub fn new(listing_api: Url, user_area: impl Into<String>, follow_details: bool) -> Self {
        Self {
            listing_api,
            user_area: user_area.into(),
            follow_details,
        }
    }

    /// Builds the extractor from configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let listing_api = Url::parse(&config.http.listing_api)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.http.listing_api, e)))?;
        Ok(Self::new(
            listing_api,
            config.http.user_area.clone(),
            config.crawler.follow_details,
        ))
    }

    /// Listing API URL of `page` in category `cat_id`
    ///
    /// # Examples
    ///
    /// ```
    /// use kongfz_crawler::crawler::CatalogExtractor;
    /// use url::Url;
    ///
    /// let extractor = CatalogExtractor::new(
    ///     Url::parse("https://search.example.com/list").unwrap(),
    ///     "1006000000",
    ///     false,
    /// );
    /// assert_eq!(
    ///     extractor.listing_url("43", 2).as_str(),
    ///     "https://search.example.com/list?catId=43&page=2&userArea=1006000000"
    /// );
    /// ```
    pub fn listing_url(&self, cat_id: &str, page: u32) -> Url {
        let mut url = self.listing_api.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("catId", cat_id)
            .append_pair("page", &page.to_string())
            .append_pair("userArea", &self.user_area);
        url
    }

    fn extract_category(&self, task: &CrawlTask, response: &FetchResponse) -> Extraction {
        let document = Html::parse_document(&response.body);
        let parent = task.category_name().map(String::from);

        let crawled_at = Utc::now();
        let mut links = Vec::new();
        let mut categories = Vec::new();
        if let Some(selector) = CATEGORY_LINKS.as_ref() {
            for element in document.select(selector) {
                let name = element.text().collect::<Vec<_>>().join(" ");
                let name = crate::model::normalize_text(&name);
                let Some(url) = element
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_link(href, &response.final_url))
                else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }

                let label = Arc::new(CategoryLabel::new(name, url.clone(), parent.clone()));
                categories.push(CategoryRecord::from_label(&label, crawled_at));
                links.push(DiscoveredLink {
                    url,
                    kind: TaskKind::Category,
                    label: Some(label),
                });
            }
        }

        let next_page = extract_category_id(response.final_url.as_str())
            .or_else(|| extract_category_id(task.target.as_str()))
            .map(|cat_id| self.listing_url(&cat_id, 1));

        tracing::debug!(
            task = %task,
            categories = links.len(),
            has_listing = next_page.is_some(),
            "Category page extracted"
        );
        Extraction {
            links,
            records: Vec::new(),
            categories,
            next_page,
        }
    }

    fn extract_listing(
        &self,
        task: &CrawlTask,
        response: &FetchResponse,
    ) -> Result<Extraction, TaskError> {
        let envelope: ListingEnvelope = match serde_json::from_str(&response.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                return self
                    .extract_html_listing(task, response)
                    .ok_or_else(|| TaskError::Schema {
                        url: task.target.to_string(),
                        message: e.to_string(),
                    })
            }
        };

        if !envelope.is_ok() {
            tracing::warn!(
                task = %task,
                message = envelope.message.as_deref().unwrap_or("unknown"),
                "Listing API reported failure, treating page as empty"
            );
            return Ok(Extraction::default());
        }

        let items = envelope
            .data
            .and_then(|data| data.item_response)
            .map(|response| response.list)
            .unwrap_or_default();

        let crawled_at = Utc::now();
        let category = task.category_name().unwrap_or_default().to_string();
        let mut records = Vec::with_capacity(items.len());
        let mut links = Vec::new();

        for item in items {
            let detail_url = item.link.map(|link| link.pc).unwrap_or_default();
            if self.follow_details && !detail_url.is_empty() {
                if let Ok(url) = Url::parse(&detail_url) {
                    links.push(DiscoveredLink {
                        url,
                        kind: TaskKind::Detail,
                        label: task.category.clone(),
                    });
                }
            }

            let raw = RawRecord {
                title: item.title,
                author: item.author,
                publisher: item.press,
                condition_grade: item.quality,
                price: item.price,
                listed_at: item.show_time_text,
                seller_name: item.shop_name,
                image_url: item.img_url,
                image_large_url: item.img_big_url,
                detail_url,
                source_url: task.target.to_string(),
                category: category.clone(),
            };
            records.push(ItemRecord::from_raw(raw, crawled_at));
        }

        let next_page = if records.is_empty() {
            None
        } else {
            Some(with_page(&task.target, task.page_index + 1))
        };

        tracing::debug!(task = %task, records = records.len(), "Listing page extracted");
        Ok(Extraction {
            links,
            records,
            categories: Vec::new(),
            next_page,
        })
    }

    /// Reads a listing page served as HTML
    ///
    /// Returns None when the page has neither product entries nor a next link, so a
    /// block page or captcha still fails as a schema error.
    fn extract_html_listing(&self, task: &CrawlTask, response: &FetchResponse) -> Option<Extraction> {
        let document = Html::parse_document(&response.body);
        let base = &response.final_url;

        let items: Vec<_> = LISTING_ITEMS
            .as_ref()
            .map(|selector| document.select(selector).collect())
            .unwrap_or_default();
        let next_page = next_page_link(&document, base);
        if items.is_empty() && next_page.is_none() {
            return None;
        }

        let crawled_at = Utc::now();
        let category = task.category_name().unwrap_or_default().to_string();
        let mut records = Vec::with_capacity(items.len());
        let mut links = Vec::new();

        for item in items {
            let title_link = ITEM_TITLE.as_ref().and_then(|s| item.select(s).next());
            let Some(title_link) = title_link else {
                continue;
            };
            let detail_url = title_link
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base));
            match &detail_url {
                Some(url) if self.follow_details => links.push(DiscoveredLink {
                    url: url.clone(),
                    kind: TaskKind::Detail,
                    label: task.category.clone(),
                }),
                _ => {}
            }

            let raw = RawRecord {
                title: title_link.text().collect(),
                price: first_text(&item, &ITEM_PRICE),
                seller_name: first_text(&item, &ITEM_SELLER),
                detail_url: detail_url.map(String::from).unwrap_or_default(),
                source_url: task.target.to_string(),
                category: category.clone(),
                ..Default::default()
            };
            records.push(ItemRecord::from_raw(raw, crawled_at));
        }

        tracing::debug!(
            task = %task,
            records = records.len(),
            has_next = next_page.is_some(),
            "HTML listing page extracted"
        );
        Some(Extraction {
            links,
            records,
            categories: Vec::new(),
            next_page,
        })
    }

    fn extract_detail(&self, task: &CrawlTask, response: &FetchResponse) -> Extraction {
        let document = Html::parse_document(&response.body);

        let title = HEADING
            .as_ref()
            .and_then(|selector| document.select(selector).next())
            .map(|element| element.text().collect::<String>())
            .unwrap_or_default();

        let texts: Vec<String> = BODY
            .as_ref()
            .and_then(|selector| document.select(selector).next())
            .map(|body| {
                body.text()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let raw = RawRecord {
            title,
            author: labelled_value(&texts, AUTHOR_LABELS),
            publisher: labelled_value(&texts, PUBLISHER_LABELS),
            condition_grade: labelled_value(&texts, CONDITION_LABELS),
            price: labelled_value(&texts, PRICE_LABELS),
            seller_name: labelled_value(&texts, SELLER_LABELS),
            detail_url: task.target.to_string(),
            source_url: task.target.to_string(),
            category: task.category_name().unwrap_or_default().to_string(),
            ..Default::default()
        };

        if raw.title.trim().is_empty() {
            tracing::debug!(task = %task, "Detail page has no title, skipping record");
            return Extraction::default();
        }

        Extraction {
            records: vec![ItemRecord::from_raw(raw, Utc::now())],
            ..Default::default()
        }
    }
}

impl Extractor for CatalogExtractor {
    fn extract(&self, task: &CrawlTask, response: &FetchResponse) -> Result<Extraction, TaskError> {
        match task.kind {
            TaskKind::Category => Ok(self.extract_category(task, response)),
            TaskKind::Listing => self.extract_listing(task, response),
            TaskKind::Detail => Ok(self.extract_detail(task, response)),
        }
    }
}

/// Returns `url` with its `page` query parameter set to `page`
///
/// The parameter keeps its position; it is appended when missing.
fn with_page(url: &Url, page: u32) -> Url {
    let page = page.to_string();
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    match pairs.iter_mut().find(|(key, _)| key == "page") {
        Some((_, value)) => *value = page,
        None => pairs.push(("page".to_string(), page)),
    }

    let mut next = url.clone();
    next.query_pairs_mut().clear().extend_pairs(pairs);
    next
}

/// Resolves a menu href to an absolute http(s) URL
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}

/// Target of the page's explicit "next" link
fn next_page_link(document: &Html, base: &Url) -> Option<Url> {
    let by_class = NEXT_LINK
        .as_ref()
        .and_then(|selector| document.select(selector).next());
    let by_text = || {
        ANCHOR.as_ref().and_then(|selector| {
            document
                .select(selector)
                .find(|a| a.text().collect::<String>().trim() == NEXT_PAGE_TEXT)
        })
    };

    by_class
        .or_else(by_text)
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_link(href, base))
}

/// Trimmed text of the first element under `element` matching `selector`
fn first_text(element: &scraper::ElementRef<'_>, selector: &LazyLock<Option<Selector>>) -> String {
    selector
        .as_ref()
        .and_then(|s| element.select(s).next())
        .map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Value of the first text chunk starting with one of `labels`
///
/// The value follows the label in the same chunk (`作者：鲁迅`) or, when the label
/// stands alone (`<span>作者：</span><a>鲁迅</a>`), is the next chunk.
fn labelled_value(texts: &[String], labels: &[&str]) -> String {
    for (index, text) in texts.iter().enumerate() {
        let Some(rest) = labels.iter().find_map(|label| text.strip_prefix(label)) else {
            continue;
        };
        let rest = rest.trim_start_matches([':', '：', ' ']).trim();
        if !rest.is_empty() {
            return rest.to_string();
        }
        return texts.get(index + 1).cloned().unwrap_or_default();
    }
    String::new()
}

#[derive(Debug, Deserialize)]
struct ListingEnvelope {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<ListingData>,
}

impl ListingEnvelope {
    fn is_ok(&self) -> bool {
        match &self.status {
            Value::Number(n) => n.as_i64() == Some(1),
            Value::String(s) => s == "1",
            Value::Bool(b) => *b,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(rename = "itemResponse", default)]
    item_response: Option<ItemResponse>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    #[serde(default)]
    list: Vec<ListingItem>,
}

#[derive(Debug, Deserialize)]
struct ListingItem {
    #[serde(default, deserialize_with = "text")]
    title: String,
    #[serde(default, deserialize_with = "text")]
    author: String,
    #[serde(default, deserialize_with = "text")]
    press: String,
    #[serde(default, deserialize_with = "text")]
    quality: String,
    #[serde(default, deserialize_with = "text")]
    price: String,
    #[serde(rename = "showTimeText", default, deserialize_with = "text")]
    show_time_text: String,
    #[serde(rename = "shopName", default, deserialize_with = "text")]
    shop_name: String,
    #[serde(rename = "imgUrl", default, deserialize_with = "text")]
    img_url: String,
    #[serde(rename = "imgBigUrl", default, deserialize_with = "text")]
    img_big_url: String,
    #[serde(default)]
    link: Option<ItemLink>,
}

#[derive(Debug, Deserialize)]
struct ItemLink {
    #[serde(default, deserialize_with = "text")]
    pc: String,
}

/// Accepts a string, a number or null as text
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn extractor(follow_details: bool) -> CatalogExtractor {
        CatalogExtractor::new(
            Url::parse("https://search.example.com/category/list").unwrap(),
            "1006000000",
            follow_details,
        )
    }

    fn response(url: &str, body: &str) -> FetchResponse {
        FetchResponse {
            status: 200,
            final_url: Url::parse(url).unwrap(),
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }

    fn category_task(url: &str, name: &str) -> CrawlTask {
        let url = Url::parse(url).unwrap();
        CrawlTask::category(url.clone(), Arc::new(CategoryLabel::new(name, url, None)))
    }

    fn listing_task(page: u32) -> CrawlTask {
        let category = Url::parse("https://book.example.com/category/43/").unwrap();
        let label = Arc::new(CategoryLabel::new("History", category, None));
        let target = extractor(false).listing_url("43", page);
        CrawlTask::listing(target, label, page, 10)
    }

    const MENU: &str = r#"
        <html><body>
          <div class="cagetory-box">
            <div class="list-group">
              <div class="list-group-item">
                <div class="item-text"><a href="/category/43/">历史</a> <a href="https://book.example.com/category/7/"> 文学 </a></div>
              </div>
              <div class="list-group-item">
                <div class="item-text"><a href="javascript:void(0)">更多</a><a href="/category/9/"></a></div>
              </div>
            </div>
          </div>
          <a href="/unrelated">Not in the menu</a>
        </body></html>
    "#;

    #[test]
    fn test_category_menu_links() {
        let task = category_task("https://www.example.com/", "www.example.com");
        let extraction = extractor(false)
            .extract(&task, &response("https://www.example.com/", MENU))
            .unwrap();

        let names: Vec<_> = extraction
            .links
            .iter()
            .map(|l| l.label.as_ref().unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["历史", "文学"]);
        assert_eq!(
            extraction.links[0].url.as_str(),
            "https://www.example.com/category/43/"
        );
        assert!(extraction.links.iter().all(|l| l.kind == TaskKind::Category));
        assert_eq!(
            extraction.links[0].label.as_ref().unwrap().parent.as_deref(),
            Some("www.example.com")
        );
        assert!(extraction.next_page.is_none());
        assert!(extraction.records.is_empty());

        let categories: Vec<_> = extraction
            .categories
            .iter()
            .map(|c| (c.name.as_str(), c.url.as_str(), c.parent.as_str()))
            .collect();
        assert_eq!(
            categories,
            vec![
                ("历史", "https://www.example.com/category/43/", "www.example.com"),
                ("文学", "https://book.example.com/category/7/", "www.example.com"),
            ]
        );
    }

    #[test]
    fn test_category_with_id_points_at_first_listing_page() {
        let task = category_task("https://book.example.com/category/43/", "History");
        let extraction = extractor(false)
            .extract(&task, &response("https://book.example.com/category/43/", "<html></html>"))
            .unwrap();

        assert_eq!(
            extraction.next_page.unwrap().as_str(),
            "https://search.example.com/category/list?catId=43&page=1&userArea=1006000000"
        );
    }

    fn listing_body(count: usize) -> String {
        let items: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{"title":" Book {i} ","author":"Author","press":"Press","quality":"九品",
                        "price":{price},"showTimeText":"2024-01-0{d}","shopName":"Shop",
                        "imgUrl":"https://img.example.com/{i}.jpg","imgBigUrl":"https://img.example.com/{i}_b.jpg",
                        "link":{{"pc":"https://book.example.com/43/{i}/"}}}}"#,
                    i = i,
                    price = if i % 2 == 0 { "35.5".to_string() } else { "\"￥1,020.00\"".to_string() },
                    d = i % 9 + 1,
                )
            })
            .collect();
        format!(
            r#"{{"status":1,"data":{{"itemResponse":{{"list":[{}]}}}}}}"#,
            items.join(",")
        )
    }

    #[test]
    fn test_listing_records() {
        let task = listing_task(2);
        let extraction = extractor(false)
            .extract(&task, &response(task.target.as_str(), &listing_body(3)))
            .unwrap();

        assert_eq!(extraction.records.len(), 3);
        let first = &extraction.records[0];
        assert_eq!(first.title, "Book 0");
        assert_eq!(first.price, "35.5");
        assert_eq!(extraction.records[1].price, "1020.00");
        assert_eq!(first.detail_url, "https://book.example.com/43/0/");
        assert_eq!(first.source_url, task.target.as_str());
        assert_eq!(first.category, "History");
        assert!(extraction.links.is_empty());

        let next = extraction.next_page.unwrap();
        assert_eq!(
            next.as_str(),
            "https://search.example.com/category/list?catId=43&page=3&userArea=1006000000"
        );
    }

    #[test]
    fn test_listing_follows_details_when_enabled() {
        let task = listing_task(1);
        let extraction = extractor(true)
            .extract(&task, &response(task.target.as_str(), &listing_body(2)))
            .unwrap();

        assert_eq!(extraction.links.len(), 2);
        assert!(extraction.links.iter().all(|l| l.kind == TaskKind::Detail));
        assert_eq!(
            extraction.links[0].label.as_ref().unwrap().name,
            "History"
        );
    }

    #[test]
    fn test_listing_status_failure_is_empty_page() {
        let task = listing_task(1);
        let extraction = extractor(false)
            .extract(
                &task,
                &response(task.target.as_str(), r#"{"status":0,"message":"busy"}"#),
            )
            .unwrap();

        assert!(extraction.records.is_empty());
        assert!(extraction.next_page.is_none());
    }

    #[test]
    fn test_listing_empty_list_has_no_next_page() {
        let task = listing_task(3);
        let extraction = extractor(false)
            .extract(&task, &response(task.target.as_str(), &listing_body(0)))
            .unwrap();

        assert!(extraction.records.is_empty());
        assert!(extraction.next_page.is_none());
    }

    #[test]
    fn test_listing_malformed_json_is_schema_error() {
        let task = listing_task(1);
        let err = extractor(false)
            .extract(&task, &response(task.target.as_str(), "<html>blocked</html>"))
            .unwrap_err();

        assert!(matches!(err, TaskError::Schema { .. }));
    }

    const HTML_LISTING: &str = r#"
        <html><body>
          <div class="product-item">
            <h3><a href="/43/501/">Call to Arms</a></h3>
            <span class="price">￥45.00</span>
            <a class="shop" href="/shop/9">Riverside</a>
          </div>
          <div class="product-item">
            <h3><a href="https://book.example.com/43/502/">Wandering</a></h3>
          </div>
          <ul class="pager"><li class="next"><a href="/category/43/?page=3">下一页</a></li></ul>
        </body></html>
    "#;

    #[test]
    fn test_html_listing_follows_next_link() {
        let category = Url::parse("https://book.example.com/category/43/").unwrap();
        let label = Arc::new(CategoryLabel::new("History", category.clone(), None));
        let page2 = Url::parse("https://book.example.com/category/43/?page=2").unwrap();
        let task = CrawlTask::listing(page2.clone(), label, 2, 10);

        let extraction = extractor(true)
            .extract(&task, &response(page2.as_str(), HTML_LISTING))
            .unwrap();

        assert_eq!(extraction.records.len(), 2);
        let first = &extraction.records[0];
        assert_eq!(first.title, "Call to Arms");
        assert_eq!(first.price, "45.00");
        assert_eq!(first.seller_name, "Riverside");
        assert_eq!(first.detail_url, "https://book.example.com/43/501/");
        assert_eq!(first.category, "History");
        assert_eq!(extraction.links.len(), 2);
        assert_eq!(
            extraction.next_page.unwrap().as_str(),
            "https://book.example.com/category/43/?page=3"
        );
    }

    #[test]
    fn test_html_listing_next_link_by_text() {
        let task = listing_task(1);
        let body = r#"<html><body><div class="book-item"><h4><a href="/43/9/">Old Tales</a></h4></div>
            <a href="/list?page=2">下一页</a></body></html>"#;
        let extraction = extractor(false)
            .extract(&task, &response("https://book.example.com/list?page=1", body))
            .unwrap();

        assert_eq!(extraction.records.len(), 1);
        assert_eq!(
            extraction.next_page.unwrap().as_str(),
            "https://book.example.com/list?page=2"
        );
    }

    #[test]
    fn test_html_listing_last_page_has_no_next() {
        let task = listing_task(4);
        let body = r#"<div class="product-item"><h3><a href="/43/1/">Last</a></h3></div>"#;
        let extraction = extractor(false)
            .extract(&task, &response("https://book.example.com/list?page=4", body))
            .unwrap();

        assert_eq!(extraction.records.len(), 1);
        assert!(extraction.next_page.is_none());
    }

    #[test]
    fn test_detail_labelled_fields() {
        let html = r#"
            <html><body>
              <h1> 呐喊 </h1>
              <ul>
                <li><span>作者：</span><a href="/a">鲁迅</a></li>
                <li>出版社：北新书局</li>
                <li>品相： 八品</li>
              </ul>
              <div class="price"><span>售价</span><b>￥1,200.00</b></div>
              <div>店铺：<a href="/shop">Riverside</a></div>
            </body></html>
        "#;
        let task = CrawlTask::detail(Url::parse("https://book.example.com/43/1/").unwrap(), None);
        let extraction = extractor(false)
            .extract(&task, &response("https://book.example.com/43/1/", html))
            .unwrap();

        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        assert_eq!(record.title, "呐喊");
        assert_eq!(record.author, "鲁迅");
        assert_eq!(record.publisher, "北新书局");
        assert_eq!(record.condition_grade, "八品");
        assert_eq!(record.price, "1200.00");
        assert_eq!(record.seller_name, "Riverside");
        assert_eq!(record.detail_url, "https://book.example.com/43/1/");
    }

    #[test]
    fn test_detail_without_title_yields_nothing() {
        let task = CrawlTask::detail(Url::parse("https://book.example.com/43/1/").unwrap(), None);
        let extraction = extractor(false)
            .extract(&task, &response("https://book.example.com/43/1/", "<html><body></body></html>"))
            .unwrap();
        assert!(extraction.records.is_empty());
    }

    #[test]
    fn test_with_page_keeps_other_params() {
        let url = Url::parse("https://api.example.com/list?userArea=1&page=7&catId=4").unwrap();
        assert_eq!(
            with_page(&url, 8).as_str(),
            "https://api.example.com/list?userArea=1&page=8&catId=4"
        );

        let url = Url::parse("https://api.example.com/list?catId=4").unwrap();
        assert_eq!(
            with_page(&url, 2).as_str(),
            "https://api.example.com/list?catId=4&page=2"
        );
    }
}
