use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::contract::SnapshotRequestOptions;
use crate::pool::{DEFAULT_THREADS, MAX_THREADS};

/// Options for one snapshot run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotOptions {
    /// Repository slug (`owner/name`) the build belongs to.
    pub repo: Option<String>,
    /// Directory stripped from file paths when deriving URLs. Defaults to the root dir.
    pub strip_prefix: Option<PathBuf>,
    pub snapshots_regex: Option<String>,
    /// Max number of snapshots to dispatch.
    pub snapshot_limit: Option<usize>,
    pub baseurl: String,
    pub threads: usize,
    pub enable_javascript: bool,
    pub widths: Vec<u32>,
    pub include_all: bool,
    pub autoload_remote_resources: bool,
    /// Exit non-zero when a recoverable failure cut the run short.
    pub fail_on_partial: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            repo: None,
            strip_prefix: None,
            snapshots_regex: None,
            snapshot_limit: None,
            baseurl: "/".to_string(),
            threads: DEFAULT_THREADS,
            enable_javascript: false,
            widths: Vec::new(),
            include_all: false,
            autoload_remote_resources: false,
            fail_on_partial: false,
        }
    }
}

impl SnapshotOptions {
    /// Worker count clamped to `1..=MAX_THREADS`.
    pub fn effective_threads(&self) -> usize {
        self.threads.clamp(1, MAX_THREADS)
    }

    pub fn request_options(&self) -> SnapshotRequestOptions {
        SnapshotRequestOptions {
            widths: self.widths.clone(),
            enable_javascript: self.enable_javascript,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            repo = self.repo.as_deref().unwrap_or("<unset>"),
            baseurl = %self.baseurl,
            threads = self.effective_threads(),
            snapshot_limit = ?self.snapshot_limit,
            include_all = self.include_all,
            autoload_remote_resources = self.autoload_remote_resources,
            "Loaded SnapshotOptions"
        );
        debug!(?self, "SnapshotOptions loaded (full debug)");
    }
}
