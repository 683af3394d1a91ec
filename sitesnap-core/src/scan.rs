//! Path scanning and classification.
//!
//! Recursively walks a root directory, following directory and file symlinks,
//! and splits the resulting files into root paths (snapshot entry points) and
//! supporting paths (static assets). Both predicates are evaluated
//! independently, so one path may land in both sets.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::error::SnapshotError;

pub const DEFAULT_SNAPSHOTS_REGEX: &str = r"\.(html|htm)$";

/// Extensions treated as supporting assets when `include_all` is off.
pub const STATIC_RESOURCE_EXTENSIONS: &[&str] = &[
    "css", "js", "jpg", "jpeg", "gif", "ico", "png", "bmp", "pict", "tif", "tiff", "ttf", "eot",
    "woff", "woff2", "otf", "svg", "svgz", "webp", "ps",
];

const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Decides which scanned paths become root and supporting resources.
#[derive(Debug, Clone)]
pub struct Classifier {
    root_dir: PathBuf,
    snapshots_regex: Regex,
    include_all: bool,
}

impl Classifier {
    /// `root_dir` is the scanned directory; hidden-segment checks only look
    /// below it.
    pub fn new(
        root_dir: &Path,
        snapshots_regex: Option<&str>,
        include_all: bool,
    ) -> Result<Self, SnapshotError> {
        let pattern = snapshots_regex.unwrap_or(DEFAULT_SNAPSHOTS_REGEX);
        Ok(Self {
            root_dir: std::path::absolute(root_dir).map_err(|e| SnapshotError::io(root_dir, e))?,
            snapshots_regex: Regex::new(pattern)?,
            include_all,
        })
    }

    pub fn is_root(&self, path: &Path) -> bool {
        self.snapshots_regex.is_match(&path.to_string_lossy())
    }

    pub fn is_supporting(&self, path: &Path) -> bool {
        if self.include_all {
            return !self.is_root(path);
        }
        if has_hidden_segment(path.strip_prefix(&self.root_dir).unwrap_or(path)) {
            return false;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| STATIC_RESOURCE_EXTENSIONS.contains(&ext.as_str()))
    }

    /// Splits scanned paths into `(root_paths, supporting_paths)`.
    pub fn classify(&self, paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let roots = paths.iter().filter(|p| self.is_root(p)).cloned().collect();
        let supporting = paths
            .iter()
            .filter(|p| self.is_supporting(p))
            .cloned()
            .collect();
        (roots, supporting)
    }
}

/// Returns every regular file under `root`, with version-control metadata
/// directories already removed. Paths are absolute and sorted.
///
/// Directories are tracked by canonical path; a symlink leading back into an
/// already-entered directory is skipped instead of recursing forever.
pub fn scan_files(root: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
    let root = std::path::absolute(root).map_err(|e| SnapshotError::io(root, e))?;
    let mut files = Vec::new();
    let mut visited_dirs = HashSet::new();

    walk_dir(&root, &mut files, &mut visited_dirs)?;

    files.sort();
    debug!(root = %root.display(), count = files.len(), "Scanned directory");
    Ok(files)
}

fn walk_dir(
    current: &Path,
    files: &mut Vec<PathBuf>,
    visited_dirs: &mut HashSet<PathBuf>,
) -> Result<(), SnapshotError> {
    let canonical = current
        .canonicalize()
        .map_err(|e| SnapshotError::io(current, e))?;
    if !visited_dirs.insert(canonical) {
        warn!(path = %current.display(), "Skipping directory already visited through a symlink");
        return Ok(());
    }

    let entries = std::fs::read_dir(current).map_err(|e| SnapshotError::io(current, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SnapshotError::io(current, e))?;
        let path = entry.path();
        if is_vcs_dir_name(&entry.file_name()) {
            continue;
        }
        // Follows symlinks.
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if metadata.is_dir() {
            walk_dir(&path, files, visited_dirs)?;
        } else if metadata.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn is_vcs_dir_name(name: &std::ffi::OsStr) -> bool {
    VCS_DIRS.iter().any(|vcs| name == *vcs)
}

fn has_hidden_segment(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(s) => s.to_string_lossy().starts_with('.'),
        _ => false,
    })
}
