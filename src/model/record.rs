use chrono::{DateTime, SecondsFormat, Utc};
use crate::model::CategoryLabel;
use serde::{Deserialize, Serialize};

/// Field values of an item as they come off the site, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub condition_grade: String,
    pub price: String,
    pub listed_at: String,
    pub seller_name: String,
    pub image_url: String,
    pub image_large_url: String,
    pub detail_url: String,
    pub source_url: String,
    pub category: String,
}

/// A normalized catalog item
///
/// Records are created once at extraction time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub condition_grade: String,
    /// Plain decimal string, e.g. `1234.50`
    pub price: String,
    pub listed_at: String,
    pub seller_name: String,
    pub image_url: String,
    pub image_large_url: String,
    pub detail_url: String,
    pub source_url: String,
    pub category: String,
    pub crawled_at: DateTime<Utc>,
}

impl ItemRecord {
    /// Builds a record from raw site values, normalizing text and price fields
    pub fn from_raw(raw: RawRecord, crawled_at: DateTime<Utc>) -> Self {
        Self {
            title: normalize_text(&raw.title),
            author: normalize_text(&raw.author),
            publisher: normalize_text(&raw.publisher),
            condition_grade: raw.condition_grade.trim().to_string(),
            price: normalize_price(&raw.price),
            listed_at: raw.listed_at.trim().to_string(),
            seller_name: raw.seller_name.trim().to_string(),
            image_url: raw.image_url.trim().to_string(),
            image_large_url: raw.image_large_url.trim().to_string(),
            detail_url: raw.detail_url.trim().to_string(),
            source_url: raw.source_url.trim().to_string(),
            category: raw.category.trim().to_string(),
            crawled_at,
        }
    }

    /// Natural key of the record: its detail URL, or the listing URL when the item
    /// has no detail page
    pub fn natural_key(&self) -> &str {
        if self.detail_url.is_empty() {
            &self.source_url
        } else {
            &self.detail_url
        }
    }

    /// Crawl time as stored and exported
    pub fn crawled_at_string(&self) -> String {
        self.crawled_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// A catalog category as persisted by the sinks
///
/// One is emitted for every category link found in the catalog menu; the category
/// URL is its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    pub url: String,
    /// Name of the parent category, empty for top-level entries
    pub parent: String,
    pub crawled_at: DateTime<Utc>,
}

impl CategoryRecord {
    /// Builds the record of a category label; the URL loses its fragment
    pub fn from_label(label: &CategoryLabel, crawled_at: DateTime<Utc>) -> Self {
        let mut url = label.source_url.clone();
        url.set_fragment(None);
        Self {
            name: normalize_text(&label.name),
            url: url.into(),
            parent: label.parent.clone().unwrap_or_default(),
            crawled_at,
        }
    }

    pub fn crawled_at_string(&self) -> String {
        self.crawled_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Strips currency symbols, thousands separators and any other non-numeric
/// characters from a price
///
/// # Examples
///
/// ```
/// use kongfz_crawler::model::normalize_price;
///
/// assert_eq!(normalize_price("￥1,234.50"), "1234.50");
/// assert_eq!(normalize_price(""), "");
/// ```
pub fn normalize_price(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

/// Trims a text field and collapses embedded whitespace runs to single spaces
///
/// # Examples
///
/// ```
/// use kongfz_crawler::model::normalize_text;
///
/// assert_eq!(normalize_text("  Title\n\tLine2 "), "Title Line2");
/// ```
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One row of the CSV export, in its fixed column order
#[derive(Debug, Serialize)]
pub struct ExportRow<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub press: &'a str,
    pub quality: &'a str,
    pub price: &'a str,
    pub show_time: &'a str,
    pub shop_name: &'a str,
    pub img_url: &'a str,
    pub img_big_url: &'a str,
    pub book_link: &'a str,
    pub crawl_time: String,
    pub source_url: &'a str,
}

impl<'a> From<&'a ItemRecord> for ExportRow<'a> {
    fn from(record: &'a ItemRecord) -> Self {
        Self {
            title: &record.title,
            author: &record.author,
            press: &record.publisher,
            quality: &record.condition_grade,
            price: &record.price,
            show_time: &record.listed_at,
            shop_name: &record.seller_name,
            img_url: &record.image_url,
            img_big_url: &record.image_large_url,
            book_link: &record.detail_url,
            crawl_time: record.crawled_at_string(),
            source_url: &record.source_url,
        }
    }
}

/// Header of the CSV export
pub const EXPORT_COLUMNS: [&str; 12] = [
    "title",
    "author",
    "press",
    "quality",
    "price",
    "show_time",
    "shop_name",
    "img_url",
    "img_big_url",
    "book_link",
    "crawl_time",
    "source_url",
];
