#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use sitesnap_core::contract::{Build, Snapshot, SnapshotRequestOptions, SnapshotService};
use sitesnap_core::error::ServiceError;
use sitesnap_core::pool::ProgressSink;
use sitesnap_core::resource::{sha256_hex, Resource};
use tempfile::TempDir;

pub const INDEX_HTML: &str =
    "<html><head><link rel=\"stylesheet\" href=\"/css/base.css\"></head><body>hi</body></html>";
pub const BASE_CSS: &str = "body { color: red; }";

/// `index.html` referencing `css/base.css`.
pub fn minimal_site() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", INDEX_HTML);
    write(dir.path(), "css/base.css", BASE_CSS);
    dir
}

/// Three pages sharing assets, plus files that must be ignored.
pub fn multi_page_site() -> TempDir {
    let dir = minimal_site();
    write(dir.path(), "about.html", "<html><body>about</body></html>");
    write(dir.path(), "blog/post.htm", "<html><body>post</body></html>");
    write(dir.path(), "images/logo.png", "PNGDATA");
    write(dir.path(), "images/logo-copy.png", "PNGDATA");
    write(dir.path(), "notes.txt", "not an asset");
    write(dir.path(), ".git/config", "[core]");
    write(dir.path(), ".git/index.html", "<html>vcs</html>");
    dir
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// In-memory service that tracks stored content by digest.
#[derive(Default)]
pub struct FakeService {
    pub stored: Mutex<HashSet<String>>,
    pub uploads: Mutex<Vec<String>>,
    pub snapshots_created: Mutex<Vec<String>>,
    pub snapshots_finalized: Mutex<Vec<String>>,
    pub builds_finalized: Mutex<Vec<String>>,
}

impl FakeService {
    fn missing(&self, resources: &[Resource]) -> Vec<String> {
        let stored = self.stored.lock().unwrap();
        let mut seen = HashSet::new();
        resources
            .iter()
            .filter(|r| !stored.contains(&r.digest) && seen.insert(r.digest.clone()))
            .map(|r| r.digest.clone())
            .collect()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl SnapshotService for FakeService {
    async fn create_build(
        &self,
        _repo: &str,
        resources: &[Resource],
    ) -> Result<Build, ServiceError> {
        Ok(Build {
            id: "build-1".into(),
            web_url: Some("https://review.example.com/builds/1".into()),
            missing_resource_ids: self.missing(resources),
        })
    }

    async fn create_snapshot(
        &self,
        _build_id: &str,
        resources: &[Resource],
        _options: &SnapshotRequestOptions,
    ) -> Result<Snapshot, ServiceError> {
        let mut created = self.snapshots_created.lock().unwrap();
        let id = format!("snap-{}", created.len() + 1);
        created.push(resources[0].url.clone());
        Ok(Snapshot {
            id,
            missing_resource_ids: self.missing(resources),
        })
    }

    async fn upload_resource(&self, _build_id: &str, content: Vec<u8>) -> Result<(), ServiceError> {
        let digest = sha256_hex(&content);
        self.uploads.lock().unwrap().push(digest.clone());
        self.stored.lock().unwrap().insert(digest);
        Ok(())
    }

    async fn finalize_snapshot(&self, snapshot_id: &str) -> Result<(), ServiceError> {
        self.snapshots_finalized
            .lock()
            .unwrap()
            .push(snapshot_id.to_string());
        Ok(())
    }

    async fn finalize_build(&self, build_id: &str) -> Result<(), ServiceError> {
        self.builds_finalized
            .lock()
            .unwrap()
            .push(build_id.to_string());
        Ok(())
    }
}

/// Records every progress callback.
#[derive(Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<(usize, usize)>>,
    pub snapshots: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, completed: usize, total: usize, _label: &str) {
        self.progress.lock().unwrap().push((completed, total));
    }

    fn on_snapshot(&self, _index: usize, _total: usize, url: &str) {
        self.snapshots.lock().unwrap().push(url.to_string());
    }
}
