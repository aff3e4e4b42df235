use super::{CookieSet, SessionError, SessionProvider};
use std::sync::atomic::{AtomicBool, Ordering};

/// Fixed cookies taken from the configuration
///
/// An empty cookie set means anonymous crawling. Once expired, a static session
/// cannot be refreshed.
#[derive(Debug, Default)]
pub struct StaticSession {
    cookies: CookieSet,
    expired: AtomicBool,
}

impl StaticSession {
    pub fn new(cookies: CookieSet) -> Self {
        Self {
            cookies,
            expired: AtomicBool::new(false),
        }
    }

    /// A session without cookies
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl SessionProvider for StaticSession {
    fn session_cookies(&self) -> Option<CookieSet> {
        if self.expired.load(Ordering::Acquire) {
            None
        } else {
            Some(self.cookies.clone())
        }
    }

    fn mark_expired(&self) {
        if !self.expired.swap(true, Ordering::AcqRel) {
            tracing::warn!("Session cookies rejected by the site");
        }
    }

    fn refresh(&self) -> Result<bool, SessionError> {
        Ok(false)
    }
}
