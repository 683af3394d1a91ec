//! Repository slug detection.
//!
//! The slug (`owner/name`) is taken from, in order: the command line, the
//! config file, `SITESNAP_REPO`, and finally the `origin` remote of the git
//! repository that contains the snapshotted directory.

use std::env;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

pub const REPO_ENV: &str = "SITESNAP_REPO";

const REMOTE_URL: &str =
    r"^(?:[^@/\s]+@[^:/\s]+:|(?:https?|ssh|git)://(?:[^@/\s]+@)?[^/\s]+/)(?P<slug>[^/\s]+/[^/\s]+?)(?:\.git)?/?$";

fn remote_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(REMOTE_URL) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(error = %e, "Failed to compile remote URL pattern");
                None
            }
        })
        .as_ref()
}

/// Extracts `owner/name` from an SSH (`git@host:owner/name.git`) or HTTPS
/// (`https://host/owner/name(.git)`) remote URL.
pub fn slug_from_remote_url(url: &str) -> Option<String> {
    remote_url_pattern()?
        .captures(url.trim())
        .and_then(|caps| caps.name("slug"))
        .map(|m| m.as_str().to_string())
}

/// Reads `remote.origin.url` of the git repository containing `dir`.
pub fn git_origin_slug(dir: &Path) -> Option<String> {
    let output = match Command::new("git")
        .args(["config", "--get", "remote.origin.url"])
        .current_dir(dir)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "git not available for repo detection");
            return None;
        }
    };
    if !output.status.success() {
        debug!(dir = %dir.display(), "No git origin remote found");
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout);
    let slug = slug_from_remote_url(&url);
    if slug.is_none() {
        warn!(url = %url.trim(), "Could not parse repo slug from git origin URL");
    }
    slug
}

/// First available slug, falling back to the environment and git.
pub fn resolve_repo(explicit: Option<String>, root_dir: &Path) -> Option<String> {
    if let Some(repo) = explicit {
        return Some(repo);
    }
    if let Ok(repo) = env::var(REPO_ENV) {
        if !repo.trim().is_empty() {
            info!(repo = %repo, "Using repo from {REPO_ENV}");
            return Some(repo.trim().to_string());
        }
    }
    let detected = git_origin_slug(root_dir);
    if let Some(repo) = &detected {
        info!(repo = %repo, "Detected repo from git origin");
    }
    detected
}
