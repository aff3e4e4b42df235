use super::{CookieSet, SessionError, SessionProvider};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

/// One entry of a browser cookie export; other fields are ignored
#[derive(Debug, Deserialize)]
struct ExportedCookie {
    name: String,
    value: String,
}

#[derive(Debug)]
struct LoadedCookies {
    cookies: CookieSet,
    modified: Option<SystemTime>,
    expired: bool,
}

/// Cookies read from a JSON export written by an out-of-band login
///
/// The file holds `[{"name": "...", "value": "..."}, ...]`. After the site rejects
/// the session, [`SessionProvider::refresh`] reloads the file once it has been
/// rewritten.
#[derive(Debug)]
pub struct CookieFileSession {
    path: PathBuf,
    state: RwLock<LoadedCookies>,
}

impl CookieFileSession {
    /// Loads the cookie file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let (cookies, modified) = read_cookie_file(&path)?;
        Ok(Self {
            path,
            state: RwLock::new(LoadedCookies {
                cookies,
                modified,
                expired: false,
            }),
        })
    }

    pub fn cookie_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cookies
            .len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_cookie_file(path: &Path) -> Result<(CookieSet, Option<SystemTime>), SessionError> {
    let io_err = |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let content = std::fs::read_to_string(path).map_err(io_err)?;
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();

    let exported: Vec<ExportedCookie> =
        serde_json::from_str(&content).map_err(|source| SessionError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let cookies = exported
        .into_iter()
        .map(|cookie| (cookie.name, cookie.value))
        .collect();

    Ok((cookies, modified))
}

impl SessionProvider for CookieFileSession {
    fn session_cookies(&self) -> Option<CookieSet> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.expired {
            None
        } else {
            Some(state.cookies.clone())
        }
    }

    fn mark_expired(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.expired {
            state.expired = true;
            tracing::warn!(path = %self.path.display(), "Session cookies rejected by the site");
        }
    }

    fn refresh(&self) -> Result<bool, SessionError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.expired {
            return Ok(true);
        }

        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();
        if modified.is_some() && modified == state.modified {
            return Ok(false);
        }

        let (cookies, modified) = read_cookie_file(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            cookies = cookies.len(),
            "Reloaded session cookies"
        );
        *state = LoadedCookies {
            cookies,
            modified,
            expired: false,
        };
        Ok(true)
    }
}
