//! # resource: content-addressed units of synchronisation
//!
//! A [`Resource`] pairs a public URL with a SHA-256 digest of its bytes. The
//! digest depends on content only, so identical files under different paths
//! share an identity and are uploaded at most once.
//!
//! [`build_resources`] turns classified filesystem paths into resources:
//! - reads and hashes each file, silently skipping anything over
//!   [`MAX_FILE_SIZE`]
//! - derives the URL by stripping `strip_prefix`, joining onto `base_url`,
//!   and percent-encoding the result once
//!
//! Resources are immutable after construction.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::SnapshotError;

/// Files larger than this are never uploaded.
pub const MAX_FILE_SIZE: u64 = 15 * 1024 * 1024;

/// Characters left as-is in resource URLs; everything else is escaped.
const URL_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b',')
    .remove(b'[')
    .remove(b']');

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ResourceRole {
    /// Snapshot entry point, e.g. an HTML page.
    Root,
    /// Asset shared across snapshots.
    Supporting,
}

/// Where a resource's bytes come from at upload time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOrigin {
    /// Read lazily from disk when uploaded.
    Local(PathBuf),
    /// Already fetched and held in memory.
    Remote(Arc<[u8]>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: String,
    /// Lowercase hex SHA-256 of the content bytes.
    pub digest: String,
    pub role: ResourceRole,
    pub origin: ResourceOrigin,
}

impl Resource {
    /// Builds a resource from bytes that have already been fetched.
    pub fn remote(url: impl Into<String>, content: Vec<u8>, role: ResourceRole) -> Self {
        Self {
            url: url.into(),
            digest: sha256_hex(&content),
            role,
            origin: ResourceOrigin::Remote(content.into()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.role == ResourceRole::Root
    }

    /// Loads the content bytes for upload.
    pub async fn content(&self) -> Result<Vec<u8>, SnapshotError> {
        match &self.origin {
            ResourceOrigin::Local(path) => tokio::fs::read(path)
                .await
                .map_err(|e| SnapshotError::io(path, e)),
            ResourceOrigin::Remote(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// Content digest used for every resource, root or supporting.
pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Converts paths into resources with the given role.
///
/// `strip_prefix` is made absolute before use; `base_url` must start with `/`.
/// Oversized files are dropped without error.
pub fn build_resources(
    paths: &[PathBuf],
    strip_prefix: &Path,
    base_url: &str,
    role: ResourceRole,
) -> Result<Vec<Resource>, SnapshotError> {
    if !base_url.starts_with('/') {
        return Err(SnapshotError::InvalidBaseUrl(base_url.to_string()));
    }
    let strip_prefix = absolute(strip_prefix)?;

    let mut resources = Vec::with_capacity(paths.len());
    for path in paths {
        let size = std::fs::metadata(path)
            .map_err(|e| SnapshotError::io(path, e))?
            .len();
        if size > MAX_FILE_SIZE {
            info!(path = %path.display(), size, "Skipping file over maximum size");
            continue;
        }
        let content = std::fs::read(path).map_err(|e| SnapshotError::io(path, e))?;
        let path = absolute(path)?;
        let url = resource_url(&path, &strip_prefix, base_url)?;
        let digest = sha256_hex(&content);
        debug!(url = %url, digest = %digest, ?role, "Built resource");
        resources.push(Resource {
            url,
            digest,
            role,
            origin: ResourceOrigin::Local(path),
        });
    }
    Ok(resources)
}

/// Derives the public URL for `path`.
///
/// A path outside `strip_prefix` keeps its full form under `base_url`.
pub fn resource_url(
    path: &Path,
    strip_prefix: &Path,
    base_url: &str,
) -> Result<String, SnapshotError> {
    if !base_url.starts_with('/') {
        return Err(SnapshotError::InvalidBaseUrl(base_url.to_string()));
    }
    let relative = path.strip_prefix(strip_prefix).unwrap_or(path);
    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let mut joined = base_url.trim_end_matches('/').to_string();
    joined.push('/');
    joined.push_str(&segments.join("/"));
    Ok(utf8_percent_encode(&joined, URL_SAFE).to_string())
}

fn absolute(path: &Path) -> Result<PathBuf, SnapshotError> {
    let abs = std::path::absolute(path).map_err(|e| SnapshotError::io(path, e))?;
    // Drops any trailing separator.
    Ok(abs.components().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_onto_root_base() {
        let url = resource_url(
            Path::new("/site/css/base.css"),
            Path::new("/site"),
            "/",
        )
        .unwrap();
        assert_eq!(url, "/css/base.css");
    }

    #[test]
    fn url_escapes_spaces_once() {
        let url = resource_url(
            Path::new("/site/css/test with spaces.css"),
            Path::new("/site"),
            "/",
        )
        .unwrap();
        assert_eq!(url, "/css/test%20with%20spaces.css");
    }

    #[test]
    fn url_keeps_custom_base_without_double_slash() {
        let with_slash =
            resource_url(Path::new("/site/index.html"), Path::new("/site"), "/docs/").unwrap();
        let without_slash =
            resource_url(Path::new("/site/index.html"), Path::new("/site"), "/docs").unwrap();
        assert_eq!(with_slash, "/docs/index.html");
        assert_eq!(without_slash, "/docs/index.html");
    }

    #[test]
    fn url_encodes_base_with_spaces() {
        let url = resource_url(
            Path::new("/site/index.html"),
            Path::new("/site"),
            "/test baseurl/",
        )
        .unwrap();
        assert_eq!(url, "/test%20baseurl/index.html");
    }

    #[test]
    fn url_escapes_percent_and_hash() {
        let url =
            resource_url(Path::new("/site/a%b#c.png"), Path::new("/site"), "/").unwrap();
        assert_eq!(url, "/a%25b%23c.png");
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let err = resource_url(Path::new("/site/a.css"), Path::new("/site"), "docs/").unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidBaseUrl(_)));
    }

    #[test]
    fn remote_resource_digest_matches_content() {
        let r = Resource::remote(
            "https://cdn.example.com/a.css",
            b"body{}".to_vec(),
            ResourceRole::Supporting,
        );
        assert_eq!(r.digest, sha256_hex(b"body{}"));
        assert!(!r.is_root());
    }
}
