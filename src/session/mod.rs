//! Session module supplying authenticated cookies to the fetch pipeline
//!
//! Logging in happens out-of-band (a browser-driven login that exports its cookies).
//! The crawler only consumes a cookie set through [`SessionProvider`] and marks it
//! expired when the site bounces a request to its login page.

mod cookie_file;
mod static_session;

pub use cookie_file::CookieFileSession;
pub use static_session::StaticSession;

use crate::config::SessionConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Cookie name to value
pub type CookieSet = BTreeMap<String, String>;

/// Errors raised while loading session cookies
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to read cookie file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed cookie file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Supplies the current session cookies
pub trait SessionProvider: Send + Sync {
    /// Returns the current cookie set, or None once the session has expired
    fn session_cookies(&self) -> Option<CookieSet>;

    /// Marks the current cookie set as no longer accepted by the site
    fn mark_expired(&self);

    /// Tries to obtain a fresh cookie set
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A new cookie set is available
    /// * `Ok(false)` - Nothing new to load; the session stays expired
    /// * `Err(SessionError)` - The cookie source could not be read
    fn refresh(&self) -> Result<bool, SessionError>;
}

/// Formats a cookie set as a `Cookie` request header value
///
/// # Examples
///
/// ```
/// use kongfz_crawler::session::{cookie_header, CookieSet};
///
/// let mut cookies = CookieSet::new();
/// cookies.insert("PHPSESSID".to_string(), "abc".to_string());
/// cookies.insert("kfz_uuid".to_string(), "def".to_string());
/// assert_eq!(cookie_header(&cookies), "PHPSESSID=abc; kfz_uuid=def");
/// ```
pub fn cookie_header(cookies: &CookieSet) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Builds the session provider described by the configuration
///
/// A cookie file takes precedence over inline cookies.
pub fn build_session_provider(
    config: &SessionConfig,
) -> Result<Arc<dyn SessionProvider>, SessionError> {
    match &config.cookies_file {
        Some(path) => {
            let session = CookieFileSession::load(path)?;
            tracing::info!(path = %path, cookies = session.cookie_count(), "Loaded session cookies");
            Ok(Arc::new(session))
        }
        None => Ok(Arc::new(StaticSession::new(config.cookies.clone()))),
    }
}
