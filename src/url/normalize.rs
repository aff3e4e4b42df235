use crate::UrlError;
use url::Url;

/// Normalizes a URL into the form its dedup identity is computed from
///
/// Two catalog URLs that differ only in host case, dot segments, repeated or trailing
/// slashes, fragment or query parameter order normalize to the same URL. Values of
/// repeated query keys keep their relative order. An empty query (`?`) is dropped.
///
/// # Errors
///
/// * `UrlError::Parse` - The input is not an absolute URL
/// * `UrlError::InvalidScheme` - The scheme is neither http nor https
/// * `UrlError::MissingHost` - The URL has no host
///
/// # Examples
///
/// ```
/// use kongfz_crawler::url::normalize_url;
///
/// let url = normalize_url("https://Search.Kongfz.com/list/?page=2&catId=7#top").unwrap();
/// assert_eq!(url.as_str(), "https://search.kongfz.com/list?catId=7&page=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(UrlError::InvalidScheme(format!(
                "expected http or https, got {}",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    let path = canonical_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    let pairs = canonical_query(&url);
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(url)
}

/// Resolves `.` and `..`, drops empty segments and the trailing slash
fn canonical_path(path: &str) -> String {
    let segments = path
        .split('/')
        .fold(Vec::new(), |mut segments: Vec<&str>, segment| {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                _ => segments.push(segment),
            }
            segments
        });

    let mut canonical = String::with_capacity(path.len().max(1));
    for segment in &segments {
        canonical.push('/');
        canonical.push_str(segment);
    }
    if canonical.is_empty() {
        canonical.push('/');
    }
    canonical
}

/// Query pairs ordered by key; the sort is stable
fn canonical_query(url: &Url) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}
