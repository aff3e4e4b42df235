//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the catalog site and its listing API
//! and run the full crawl cycle end-to-end.

use kongfz_crawler::config::{
    Config, CrawlerConfig, DedupConfig, HttpConfig, OutputConfig, RetryConfig, SessionConfig,
    SinkKind,
};
use kongfz_crawler::crawler::{
    Coordinator, FetchRequest, Fetcher, HttpFetcher, RunOptions, RunSummary,
};
use kongfz_crawler::model::{CategoryLabel, CrawlTask};
use kongfz_crawler::storage::{RunStatus, SqliteStorage, Storage};
use kongfz_crawler::{PaginationState, TaskError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling `base_url` with every sink enabled
fn create_test_config(base_url: &str, dir: &TempDir) -> Config {
    Config {
        crawler: CrawlerConfig {
            seeds: vec![format!("{}/", base_url)],
            max_pages: 5,
            concurrency: 2,
            politeness_delay: 0,
            fetch_timeout: 5,
            follow_details: false,
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: 10,
            max_delay: 50,
        },
        http: HttpConfig {
            user_agent: "TestBot/1.0".to_string(),
            listing_api: format!("{}/list", base_url),
            user_area: "1".to_string(),
        },
        session: SessionConfig::default(),
        dedup: DedupConfig::default(),
        output: OutputConfig {
            database_path: db_path(dir).to_string_lossy().into_owned(),
            export_dir: export_dir(dir).to_string_lossy().into_owned(),
            sinks: vec![SinkKind::Dedup, SinkKind::Document, SinkKind::Export],
        },
    }
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("crawl.db")
}

fn export_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("data")
}

fn menu_page(base_url: &str) -> String {
    format!(
        r#"<html><body><div class="cagetory-box"><div class="list-group">
        <div class="list-group-item"><div class="item-text">
          <a href="{base}/category/43/">History</a>
        </div></div>
        </div></div></body></html>"#,
        base = base_url
    )
}

fn listing_body(base_url: &str, page: u32, count: usize) -> String {
    let items: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"title":"Book {p}-{i}","author":"Author {i}","price":"￥1{i}.00",
                    "shopName":"Shop","link":{{"pc":"{base}/book/{p}{i}/"}}}}"#,
                p = page,
                i = i,
                base = base_url
            )
        })
        .collect();
    format!(
        r#"{{"status":1,"data":{{"itemResponse":{{"list":[{}]}}}}}}"#,
        items.join(",")
    )
}

/// Mounts the catalog root and the History category page
async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(menu_page(&server.uri())))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/category/43/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(server)
        .await;
}

async fn mount_listing(server: &MockServer, page: u32, count: usize) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("catId", "43"))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_body(&server.uri(), page, count))
                .insert_header("content-type", "application/json"),
        )
        .mount(server)
        .await;
}

async fn run(config: Config, options: RunOptions) -> (i64, RunSummary) {
    let coordinator = Coordinator::new(config, options).expect("Failed to create coordinator");
    let run_id = coordinator.run_id();
    let summary = coordinator.run().await.expect("Crawl failed");
    (run_id, summary)
}

fn open_storage(dir: &TempDir) -> SqliteStorage {
    SqliteStorage::new(&db_path(dir)).expect("Failed to open DB")
}

fn csv_exports(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().map(|ext| ext == "csv").unwrap_or(false))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_full_crawl_routes_records_to_every_sink() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_listing(&server, 1, 3).await;
    mount_listing(&server, 2, 3).await;
    mount_listing(&server, 3, 0).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);
    let (run_id, summary) = run(config, RunOptions::default()).await;

    assert_eq!(summary.records_routed, 6);
    assert_eq!(summary.categories_routed, 1);
    assert_eq!(summary.records_dropped, 0);
    assert!(summary.abandoned.is_empty());
    // Six items plus the History category record
    assert_eq!(summary.sink("dedup").unwrap().stored, 7);
    assert_eq!(summary.sink("document").unwrap().stored, 7);
    assert_eq!(summary.sink("export").unwrap().stored, 6);

    let storage = open_storage(&dir);
    assert_eq!(storage.count_documents().unwrap(), 6);
    assert_eq!(storage.count_categories().unwrap(), 1);
    let category = storage
        .get_category(&format!("{}/category/43/", server.uri()))
        .unwrap()
        .expect("category stored");
    assert_eq!(category.name, "History");

    let key = format!("{}/book/10/", server.uri());
    let document = storage.get_document(&key).unwrap().expect("document stored");
    assert_eq!(document.title, "Book 1-0");
    assert_eq!(document.price, "10.00");
    assert_eq!(document.category, "History");

    let run = storage.get_run(run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.totals.records_routed, 6);

    let progress = storage.get_category_progress(run_id).unwrap();
    let history = progress
        .iter()
        .find(|p| p.category == "History")
        .expect("History progress recorded");
    assert_eq!(history.state, PaginationState::Exhausted);
    assert_eq!(history.pages_fetched, 3);
    assert_eq!(history.records_seen, 6);

    let exports = csv_exports(&export_dir(&dir));
    assert_eq!(exports.len(), 1);
    let content = std::fs::read_to_string(&exports[0]).unwrap();
    assert_eq!(content.lines().count(), 7);

    let report = export_dir(&dir).join(format!("run_{}_summary.md", run_id));
    assert!(report.exists(), "run report written");
}

#[tokio::test]
async fn test_page_cap_limits_listing_requests() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    for page in 1..=4 {
        mount_listing(&server, page, 2).await;
    }

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);
    let (_, summary) = run(
        config,
        RunOptions {
            max_pages: Some(2),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(summary.records_routed, 4);
    let listing_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/list")
        .count();
    assert_eq!(listing_requests, 2);
}

#[tokio::test]
async fn test_second_run_skips_known_records() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_listing(&server, 1, 2).await;
    mount_listing(&server, 2, 0).await;

    let dir = TempDir::new().unwrap();
    let (_, first) = run(create_test_config(&server.uri(), &dir), RunOptions::default()).await;
    assert_eq!(first.sink("dedup").unwrap().duplicate, 0);

    let (_, second) = run(create_test_config(&server.uri(), &dir), RunOptions::default()).await;
    assert_eq!(second.records_routed, 2);
    assert_eq!(second.records_dropped, 0);
    assert_eq!(second.sink("dedup").unwrap().duplicate, 3);
    assert_eq!(second.sink("document").unwrap().stored, 0);
    assert_eq!(second.sink("export").unwrap().stored, 0);

    let (_, fresh) = run(
        create_test_config(&server.uri(), &dir),
        RunOptions {
            fresh: true,
            ..Default::default()
        },
    )
    .await;
    assert_eq!(fresh.sink("dedup").unwrap().duplicate, 0);
    assert_eq!(fresh.sink("document").unwrap().stored, 3);
}

#[tokio::test]
async fn test_menu_leaves_one_document_per_category() {
    let server = MockServer::start().await;
    let menu = format!(
        r#"<html><body><div class="cagetory-box"><div class="list-group">
        <div class="list-group-item"><div class="item-text">
          <a href="{base}/category/43/">History</a>
          <a href="{base}/category/7/">Literature</a>
        </div></div>
        <div class="list-group-item"><div class="item-text">
          <a href="{base}/category/43/#top">History</a>
        </div></div>
        </div></div></body></html>"#,
        base = server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(menu))
        .mount(&server)
        .await;
    for category in ["/category/43/", "/category/7/"] {
        Mock::given(method("GET"))
            .and(path(category))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_body(&server.uri(), 1, 0))
                .insert_header("content-type", "application/json"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (_, summary) = run(create_test_config(&server.uri(), &dir), RunOptions::default()).await;

    assert_eq!(summary.categories_routed, 3);
    let storage = open_storage(&dir);
    assert_eq!(storage.count_categories().unwrap(), 2);
    assert_eq!(storage.count_documents().unwrap(), 0);
    let literature = storage
        .get_category(&format!("{}/category/7/", server.uri()))
        .unwrap()
        .expect("category stored");
    assert_eq!(literature.name, "Literature");
    assert_eq!(literature.parent, "127.0.0.1");
}

#[tokio::test]
async fn test_persistent_scope_skips_visited_targets() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_listing(&server, 1, 1).await;
    mount_listing(&server, 2, 0).await;

    let dir = TempDir::new().unwrap();
    let persistent = |dir: &TempDir| {
        let mut config = create_test_config(&server.uri(), dir);
        config.dedup = DedupConfig {
            persistent: true,
            scope: Some("catalog".to_string()),
        };
        config
    };

    let (_, first) = run(persistent(&dir), RunOptions::default()).await;
    assert_eq!(first.tasks_completed, 4);

    let (_, second) = run(persistent(&dir), RunOptions::default()).await;
    assert_eq!(second.tasks_completed, 0);
    assert_eq!(second.records_routed, 0);
}

#[tokio::test]
async fn test_transient_listing_failure_is_retried() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_listing(&server, 1, 2).await;
    mount_listing(&server, 2, 0).await;

    let dir = TempDir::new().unwrap();
    let (run_id, summary) = run(create_test_config(&server.uri(), &dir), RunOptions::default()).await;

    assert_eq!(summary.tasks_retried, 2);
    assert!(summary.abandoned.is_empty());
    assert_eq!(summary.records_routed, 2);

    let run = open_storage(&dir).get_run(run_id).unwrap();
    assert_eq!(run.totals.tasks_retried, 2);
}

#[tokio::test]
async fn test_missing_category_is_abandoned_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(menu_page(&server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/category/43/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (run_id, summary) = run(create_test_config(&server.uri(), &dir), RunOptions::default()).await;

    assert_eq!(summary.abandoned.len(), 1);
    assert_eq!(summary.tasks_retried, 0);
    assert_eq!(summary.categories_in(PaginationState::Failed), 1);

    let progress = open_storage(&dir).get_category_progress(run_id).unwrap();
    assert!(progress
        .iter()
        .any(|p| p.category == "History" && p.state == PaginationState::Failed));
}

#[tokio::test]
async fn test_login_redirect_expires_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(menu_page(&server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/category/43/"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/login/", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir);
    config
        .session
        .cookies
        .insert("PHPSESSID".to_string(), "stale".to_string());
    let (_, summary) = run(config, RunOptions::default()).await;

    assert_eq!(summary.abandoned.len(), 1);
    assert!(summary.abandoned[0].error.contains("Session expired"));
    assert_eq!(summary.tasks_retried, 0);
}

#[tokio::test]
async fn test_detail_pages_enrich_documents() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_listing(&server, 1, 1).await;
    mount_listing(&server, 2, 0).await;
    Mock::given(method("GET"))
        .and(path("/book/10/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><h1>Book 1-0</h1>
               <div><span>出版社：</span><a>Zhonghua</a></div>
               <div>品相：九品</div></body></html>"#,
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir);
    config.crawler.follow_details = true;
    let (_, summary) = run(config, RunOptions::default()).await;

    assert_eq!(summary.records_routed, 2);
    assert_eq!(summary.records_dropped, 0);

    let key = format!("{}/book/10/", server.uri());
    let document = open_storage(&dir)
        .get_document(&key)
        .unwrap()
        .expect("document stored");
    assert_eq!(document.author, "Author 0");
    assert_eq!(document.price, "10.00");
    assert_eq!(document.publisher, "Zhonghua");
    assert_eq!(document.condition_grade, "九品");
}

#[tokio::test]
async fn test_stop_before_run_marks_interrupted() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(create_test_config(&server.uri(), &dir), RunOptions::default())
        .expect("Failed to create coordinator");
    let run_id = coordinator.run_id();
    coordinator.stop_handle().stop();

    let summary = coordinator.run().await.expect("Crawl failed");
    assert!(summary.stopped);
    assert_eq!(summary.tasks_completed, 0);

    let run = open_storage(&dir).get_run(run_id).unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_http_fetcher_sends_cookies_and_reports_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", format!("{}/new", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .and(header("cookie", "PHPSESSID=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::from_config(&HttpConfig::default(), Duration::from_secs(5)).unwrap();
    let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
    let task = CrawlTask::detail(url, None);
    let mut request = FetchRequest::for_task(&task);
    request
        .cookies
        .insert("PHPSESSID".to_string(), "abc".to_string());

    let response = fetcher.fetch(&request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.final_url.path(), "/new");
    assert_eq!(response.body, "moved");
}

#[tokio::test]
async fn test_http_fetcher_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let fetcher =
        HttpFetcher::from_config(&HttpConfig::default(), Duration::from_millis(200)).unwrap();
    let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
    let label = Arc::new(CategoryLabel::root(&url));
    let task = CrawlTask::category(url, label);

    let result = fetcher.fetch(&FetchRequest::for_task(&task)).await;
    assert!(matches!(result, Err(TaskError::Timeout { .. })));
}
