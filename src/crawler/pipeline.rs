//! Ordered request and response stages around the fetcher
//!
//! Request stages shape the outgoing request (headers, cookies); response stages
//! inspect what came back and turn it into a task error when needed. Stages run in
//! the order they were added.

use crate::crawler::fetcher::{FetchRequest, FetchResponse, Fetcher};
use crate::model::{CrawlTask, TaskKind};
use crate::session::SessionProvider;
use crate::TaskError;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use std::sync::Arc;

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const JSON_ACCEPT: &str = "application/json, text/plain, */*";
const LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Shapes an outgoing request
pub trait RequestStage: Send + Sync {
    fn name(&self) -> &str;

    fn prepare(&self, task: &CrawlTask, request: &mut FetchRequest) -> Result<(), TaskError>;
}

/// Inspects a received response
pub trait ResponseStage: Send + Sync {
    fn name(&self) -> &str;

    fn inspect(&self, request: &FetchRequest, response: &FetchResponse) -> Result<(), TaskError>;
}

/// Browser-like headers chosen by task kind
///
/// Listing requests go to a JSON API and carry the category page as referer.
pub struct BrowserHeaders;

impl RequestStage for BrowserHeaders {
    fn name(&self) -> &str {
        "browser-headers"
    }

    fn prepare(&self, task: &CrawlTask, request: &mut FetchRequest) -> Result<(), TaskError> {
        let headers = &mut request.headers;
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(LANGUAGE));

        match task.kind {
            TaskKind::Listing => {
                headers.insert(ACCEPT, HeaderValue::from_static(JSON_ACCEPT));
                headers.insert(
                    HeaderName::from_static("x-requested-with"),
                    HeaderValue::from_static("XMLHttpRequest"),
                );
                if let Some(label) = task.category.as_deref() {
                    if let Ok(referer) = HeaderValue::from_str(label.source_url.as_str()) {
                        headers.insert(REFERER, referer);
                    }
                }
            }
            TaskKind::Category | TaskKind::Detail => {
                headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
            }
        }
        Ok(())
    }
}

/// Attaches the current session cookies
///
/// An expired session is refreshed once; if it stays expired the task fails with
/// [`TaskError::AuthExpired`].
pub struct SessionCookies {
    session: Arc<dyn SessionProvider>,
}

impl SessionCookies {
    pub fn new(session: Arc<dyn SessionProvider>) -> Self {
        Self { session }
    }
}

impl RequestStage for SessionCookies {
    fn name(&self) -> &str {
        "session-cookies"
    }

    fn prepare(&self, _task: &CrawlTask, request: &mut FetchRequest) -> Result<(), TaskError> {
        let cookies = match self.session.session_cookies() {
            Some(cookies) => Some(cookies),
            None => match self.session.refresh() {
                Ok(true) => self.session.session_cookies(),
                Ok(false) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Session refresh failed");
                    None
                }
            },
        };

        match cookies {
            Some(cookies) => {
                request.cookies = cookies;
                Ok(())
            }
            None => Err(TaskError::AuthExpired {
                url: request.url.to_string(),
            }),
        }
    }
}

/// Detects redirects to the login page
///
/// Landing on the login page means the session was rejected; the session is marked
/// expired so later tasks try a refresh first.
pub struct LoginRedirect {
    session: Arc<dyn SessionProvider>,
}

impl LoginRedirect {
    pub fn new(session: Arc<dyn SessionProvider>) -> Self {
        Self { session }
    }
}

/// Whether a URL points at a login page
pub fn is_login_url(url: &url::Url) -> bool {
    let host_is_login = url
        .host_str()
        .map(|host| host.starts_with("login."))
        .unwrap_or(false);
    host_is_login || url.path().contains("/login")
}

impl ResponseStage for LoginRedirect {
    fn name(&self) -> &str {
        "login-redirect"
    }

    fn inspect(&self, request: &FetchRequest, response: &FetchResponse) -> Result<(), TaskError> {
        if is_login_url(&response.final_url) && !is_login_url(&request.url) {
            self.session.mark_expired();
            return Err(TaskError::AuthExpired {
                url: request.url.to_string(),
            });
        }
        Ok(())
    }
}

/// Turns non-2xx statuses into [`TaskError::HttpStatus`]
pub struct StatusCheck;

impl ResponseStage for StatusCheck {
    fn name(&self) -> &str {
        "status-check"
    }

    fn inspect(&self, request: &FetchRequest, response: &FetchResponse) -> Result<(), TaskError> {
        if response.is_success() {
            Ok(())
        } else {
            Err(TaskError::HttpStatus {
                url: request.url.to_string(),
                code: response.status,
            })
        }
    }
}

/// A fetcher wrapped in ordered request and response stages
pub struct FetchPipeline {
    fetcher: Arc<dyn Fetcher>,
    request_stages: Vec<Box<dyn RequestStage>>,
    response_stages: Vec<Box<dyn ResponseStage>>,
}

impl FetchPipeline {
    /// Creates a pipeline without stages
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            request_stages: Vec::new(),
            response_stages: Vec::new(),
        }
    }

    /// Creates the default pipeline: browser headers and session cookies on the way
    /// out, login detection and status check on the way back
    pub fn standard(fetcher: Arc<dyn Fetcher>, session: Arc<dyn SessionProvider>) -> Self {
        Self::new(fetcher)
            .with_request_stage(BrowserHeaders)
            .with_request_stage(SessionCookies::new(Arc::clone(&session)))
            .with_response_stage(LoginRedirect::new(session))
            .with_response_stage(StatusCheck)
    }

    pub fn with_request_stage(mut self, stage: impl RequestStage + 'static) -> Self {
        self.request_stages.push(Box::new(stage));
        self
    }

    pub fn with_response_stage(mut self, stage: impl ResponseStage + 'static) -> Self {
        self.response_stages.push(Box::new(stage));
        self
    }

    /// Prepares, sends and inspects the request for `task`
    pub async fn execute(&self, task: &CrawlTask) -> Result<FetchResponse, TaskError> {
        let mut request = FetchRequest::for_task(task);
        for stage in &self.request_stages {
            stage.prepare(task, &mut request)?;
        }

        let response = self.fetcher.fetch(&request).await?;

        for stage in &self.response_stages {
            if let Err(e) = stage.inspect(&request, &response) {
                tracing::debug!(stage = stage.name(), url = %request.url, error = %e, "Response rejected");
                return Err(e);
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CategoryLabel;
    use crate::session::{CookieSet, SessionError, StaticSession};
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use url::Url;

    /// Fetcher answering every request with one canned response and remembering
    /// the last request
    struct CannedFetcher {
        status: u16,
        final_url: Option<Url>,
        last: Mutex<Option<FetchRequest>>,
    }

    impl CannedFetcher {
        fn new(status: u16) -> Self {
            Self {
                status,
                final_url: None,
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TaskError> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(FetchResponse {
                status: self.status,
                final_url: self.final_url.clone().unwrap_or_else(|| request.url.clone()),
                headers: HeaderMap::new(),
                body: String::new(),
            })
        }
    }

    /// Session that is expired until refreshed
    struct RefreshableSession {
        fresh: AtomicBool,
    }

    impl SessionProvider for RefreshableSession {
        fn session_cookies(&self) -> Option<CookieSet> {
            if self.fresh.load(Ordering::SeqCst) {
                let mut cookies = CookieSet::new();
                cookies.insert("token".to_string(), "new".to_string());
                Some(cookies)
            } else {
                None
            }
        }

        fn mark_expired(&self) {
            self.fresh.store(false, Ordering::SeqCst);
        }

        fn refresh(&self) -> Result<bool, SessionError> {
            self.fresh.store(true, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn listing_task() -> CrawlTask {
        let category = Url::parse("https://book.example.com/category/43/").unwrap();
        let label = Arc::new(CategoryLabel::new("History", category, None));
        CrawlTask::listing(
            Url::parse("https://search.example.com/list?catId=43&page=1").unwrap(),
            label,
            1,
            3,
        )
    }

    fn detail_task() -> CrawlTask {
        CrawlTask::detail(Url::parse("https://book.example.com/43/1/").unwrap(), None)
    }

    fn static_session(cookies: &[(&str, &str)]) -> Arc<dyn SessionProvider> {
        let cookies = cookies
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(StaticSession::new(cookies))
    }

    #[tokio::test]
    async fn test_listing_request_headers_and_cookies() {
        let fetcher = Arc::new(CannedFetcher::new(200));
        let pipeline = FetchPipeline::standard(fetcher.clone(), static_session(&[("PHPSESSID", "abc")]));

        pipeline.execute(&listing_task()).await.unwrap();

        let request = fetcher.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.headers[ACCEPT], JSON_ACCEPT);
        assert_eq!(request.headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(request.headers[REFERER], "https://book.example.com/category/43/");
        assert_eq!(request.cookies.get("PHPSESSID").map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn test_detail_request_accepts_html() {
        let fetcher = Arc::new(CannedFetcher::new(200));
        let pipeline = FetchPipeline::standard(fetcher.clone(), Arc::new(StaticSession::anonymous()));

        pipeline.execute(&detail_task()).await.unwrap();

        let request = fetcher.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.headers[ACCEPT], HTML_ACCEPT);
        assert!(request.headers.get(REFERER).is_none());
    }

    #[tokio::test]
    async fn test_status_check_rejects_non_success() {
        let pipeline = FetchPipeline::standard(
            Arc::new(CannedFetcher::new(503)),
            Arc::new(StaticSession::anonymous()),
        );

        let err = pipeline.execute(&detail_task()).await.unwrap_err();
        assert!(matches!(err, TaskError::HttpStatus { code: 503, .. }));
    }

    #[tokio::test]
    async fn test_login_redirect_expires_session() {
        let mut fetcher = CannedFetcher::new(200);
        fetcher.final_url = Some(Url::parse("https://login.example.com/?returnUrl=x").unwrap());
        let session = static_session(&[("PHPSESSID", "abc")]);
        let pipeline = FetchPipeline::standard(Arc::new(fetcher), Arc::clone(&session));

        let err = pipeline.execute(&detail_task()).await.unwrap_err();
        assert!(matches!(err, TaskError::AuthExpired { .. }));
        assert!(session.session_cookies().is_none());

        // A static session cannot be refreshed, so later tasks fail before fetching
        let err = pipeline.execute(&detail_task()).await.unwrap_err();
        assert!(matches!(err, TaskError::AuthExpired { .. }));
    }

    #[tokio::test]
    async fn test_expired_session_refreshed_before_request() {
        let fetcher = Arc::new(CannedFetcher::new(200));
        let session = Arc::new(RefreshableSession {
            fresh: AtomicBool::new(false),
        });
        let pipeline = FetchPipeline::standard(fetcher.clone(), session);

        pipeline.execute(&detail_task()).await.unwrap();

        let request = fetcher.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.cookies.get("token").map(String::as_str), Some("new"));
    }

    #[test]
    fn test_is_login_url() {
        assert!(is_login_url(&Url::parse("https://login.kongfz.com/").unwrap()));
        assert!(is_login_url(&Url::parse("https://www.example.com/user/login?x=1").unwrap()));
        assert!(!is_login_url(&Url::parse("https://book.kongfz.com/43/1/").unwrap()));
    }
}
