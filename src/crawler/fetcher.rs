//! HTTP fetcher implementation
//!
//! This module handles the transport side of a crawl task:
//! - Building the HTTP client with browser-like defaults
//! - Sending GET requests with the headers and cookies prepared by the pipeline
//! - Following redirects and reporting the final URL
//! - Classifying transport failures into task errors
//!
//! Non-2xx responses are returned as responses; deciding what a status means is the
//! job of the response stages.

use crate::config::HttpConfig;
use crate::model::{CrawlTask, TaskKind};
use crate::session::{cookie_header, CookieSet};
use crate::TaskError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// A prepared HTTP request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub kind: TaskKind,
    pub headers: HeaderMap,
    pub cookies: CookieSet,
}

impl FetchRequest {
    /// Creates a bare request for a task's target
    pub fn for_task(task: &CrawlTask) -> Self {
        Self {
            url: task.target.clone(),
            kind: task.kind,
            headers: HeaderMap::new(),
            cookies: CookieSet::new(),
        }
    }
}

/// A received HTTP response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Final URL after redirects
    pub final_url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport collaborator of the crawl engine
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Sends `request` and returns the response, whatever its status
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResponse)` - A response was received
    /// * `Err(TaskError::Timeout)` - The request timed out
    /// * `Err(TaskError::Network)` - Any other transport failure
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TaskError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The HTTP configuration
/// * `timeout` - Overall timeout of one request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use kongfz_crawler::config::HttpConfig;
/// use kongfz_crawler::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&HttpConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the client from configuration
    pub fn from_config(config: &HttpConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }
}

fn transport_error(url: &Url, error: reqwest::Error) -> TaskError {
    if error.is_timeout() {
        TaskError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        TaskError::Network {
            url: url.to_string(),
            message: format!("connection failed: {}", error),
        }
    } else {
        TaskError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TaskError> {
        let mut headers = request.headers.clone();
        if !request.cookies.is_empty() {
            match HeaderValue::from_str(&cookie_header(&request.cookies)) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(_) => {
                    tracing::warn!(url = %request.url, "Session cookies are not a valid header, sending none")
                }
            }
        }

        let response = self
            .client
            .get(request.url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| transport_error(&request.url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&request.url, e))?;

        tracing::debug!(url = %request.url, status, bytes = body.len(), "Fetched");
        Ok(FetchResponse {
            status,
            final_url,
            headers,
            body,
        })
    }
}
