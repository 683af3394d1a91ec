//! # contract: interfaces to the remote snapshot service
//!
//! This module defines the traits through which the pipeline talks to the
//! outside world, and the plain data handles those calls return.
//!
//! - [`SnapshotService`] owns builds, snapshots and resource content on the
//!   remote side. Transport, authentication and wire format belong to the
//!   implementor; the CLI crate provides an HTTP client.
//! - [`ResourceFetcher`] retrieves remote assets referenced by local pages,
//!   used only when remote resource autoloading is enabled.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall` (under `cfg(test)` or the
//! `test-export-mocks` feature) so consumers get `MockSnapshotService` and
//! `MockResourceFetcher` for deterministic tests.
//!
//! ## Errors
//! Every call fails with [`ServiceError`]. Whether a failure ends the run or
//! just raises the failed flag is decided by the session, not the implementor.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::ServiceError;
use crate::resource::Resource;

/// A created build, as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub id: String,
    /// Where humans review the build.
    pub web_url: Option<String>,
    /// Digests of submitted resources the service does not hold yet.
    pub missing_resource_ids: Vec<String>,
}

/// A created snapshot, as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub missing_resource_ids: Vec<String>,
}

/// Rendering options passed through to the service untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotRequestOptions {
    pub widths: Vec<u32>,
    pub enable_javascript: bool,
}

/// Remote build/snapshot/resource API.
///
/// Implementations must be shareable across concurrently running tasks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SnapshotService: Send + Sync {
    /// Create a build for `repo`, registering the identities of `resources`.
    async fn create_build(&self, repo: &str, resources: &[Resource])
        -> Result<Build, ServiceError>;

    /// Create a snapshot in `build_id` over `resources` (one root plus the
    /// supporting set).
    async fn create_snapshot(
        &self,
        build_id: &str,
        resources: &[Resource],
        options: &SnapshotRequestOptions,
    ) -> Result<Snapshot, ServiceError>;

    /// Upload one resource's content to the build. The service keys it by digest.
    async fn upload_resource(&self, build_id: &str, content: Vec<u8>)
        -> Result<(), ServiceError>;

    async fn finalize_snapshot(&self, snapshot_id: &str) -> Result<(), ServiceError>;

    async fn finalize_build(&self, build_id: &str) -> Result<(), ServiceError>;
}

/// Fetches the bytes behind an absolute remote URL.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}
