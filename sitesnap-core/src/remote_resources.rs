//! Optional discovery of remote assets referenced by local pages.
//!
//! Root HTML and supporting CSS are searched for absolute `http(s)://` URLs
//! in `src=`/`href=` attributes and `url(...)` values. Each distinct URL is
//! fetched once through a [`ResourceFetcher`]; the bytes become an in-memory
//! supporting [`Resource`] keyed by the absolute URL. Fetch failures are
//! logged and skipped, they never fail the run.

use std::collections::{BTreeSet, HashSet};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::contract::ResourceFetcher;
use crate::error::SnapshotError;
use crate::pool::{Dispatch, WorkerPool};
use crate::resource::{Resource, ResourceOrigin, ResourceRole, MAX_FILE_SIZE};

const ATTRIBUTE_URL: &str = r#"(?i)(?:src|href)\s*=\s*["'](https?://[^"'\s>]+)["']"#;
const CSS_URL: &str = r#"(?i)url\(\s*["']?(https?://[^"')\s]+)["']?\s*\)"#;

pub struct RemoteUrlScanner {
    patterns: [Regex; 2],
}

impl RemoteUrlScanner {
    pub fn new() -> Result<Self, SnapshotError> {
        Ok(Self {
            patterns: [Regex::new(ATTRIBUTE_URL)?, Regex::new(CSS_URL)?],
        })
    }

    /// Absolute URLs referenced from `text`.
    pub fn urls_in(&self, text: &str) -> BTreeSet<String> {
        self.patterns
            .iter()
            .flat_map(|re| re.captures_iter(text))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

fn is_scannable(resource: &Resource) -> bool {
    matches!(resource.origin, ResourceOrigin::Local(_))
        && (resource.is_root() || resource.url.to_ascii_lowercase().ends_with(".css"))
}

/// Finds, fetches and wraps the remote assets referenced by `local`.
///
/// URLs that collide with an existing local resource URL are dropped, so the
/// combined list keeps one resource per URL.
pub async fn autoload_remote_resources<F>(
    fetcher: &F,
    local: &[Resource],
    pool: &WorkerPool,
) -> Result<Vec<Resource>, SnapshotError>
where
    F: ResourceFetcher + ?Sized,
{
    let scanner = RemoteUrlScanner::new()?;
    let known: HashSet<&str> = local.iter().map(|r| r.url.as_str()).collect();

    let mut urls = BTreeSet::new();
    for resource in local.iter().filter(|r| is_scannable(r)) {
        let content = resource.content().await?;
        let text = String::from_utf8_lossy(&content);
        urls.extend(scanner.urls_in(&text));
    }
    urls.retain(|url| !known.contains(url.as_str()));
    info!(count = urls.len(), "Fetching remote resources");

    let fetched = pool
        .run(urls, &[], |url| async move {
            match fetcher.fetch(&url).await {
                Ok(bytes) if bytes.len() as u64 > MAX_FILE_SIZE => {
                    warn!(url = %url, size = bytes.len(), "Skipping remote resource over maximum size");
                    None
                }
                Ok(bytes) => {
                    debug!(url = %url, size = bytes.len(), "Fetched remote resource");
                    Some(Resource::remote(url, bytes, ResourceRole::Supporting))
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping remote resource that failed to fetch");
                    None
                }
            }
        })
        .await;

    let mut resources: Vec<Resource> = fetched
        .into_iter()
        .filter_map(|d| match d {
            Dispatch::Ran(r) => r,
            Dispatch::Skipped => None,
        })
        .collect();
    resources.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_attribute_and_css_urls() {
        let scanner = RemoteUrlScanner::new().unwrap();
        let html = r#"<link href="https://fonts.example.com/a.css" rel="stylesheet">
            <img src='http://img.example.com/logo.png'>
            <div style="background: url(https://cdn.example.com/bg.jpg)"></div>
            <a href="/local/page.html">local</a>"#;
        let urls: Vec<_> = scanner.urls_in(html).into_iter().collect();
        assert_eq!(
            urls,
            vec![
                "http://img.example.com/logo.png",
                "https://cdn.example.com/bg.jpg",
                "https://fonts.example.com/a.css",
            ]
        );
    }

    #[test]
    fn css_quoted_urls() {
        let scanner = RemoteUrlScanner::new().unwrap();
        let css = r#"@font-face { src: url("https://f.example.com/x.woff2") format("woff2"); }"#;
        assert!(scanner.urls_in(css).contains("https://f.example.com/x.woff2"));
    }
}
