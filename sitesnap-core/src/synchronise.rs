//! High-level pipeline: snapshot a directory of static files.
//!
//! [`run_snapshot`] drives one run end to end:
//!   - scans `root_dir` and classifies files into root and supporting paths
//!   - builds content-addressed [`Resource`]s for both sets (plus fetched
//!     remote assets when autoloading is on)
//!   - creates the build with the supporting identities and uploads whatever
//!     the service reports missing
//!   - fans out one snapshot per root resource through the worker pool; each
//!     snapshot uploads its own missing content and is finalized
//!   - finalizes the build
//!
//! # Checkpoints and failure
//! Recoverable service failures raise the session's failed flag (see
//! [`crate::session`]). The pipeline checks the flag at every checkpoint:
//! after build creation, after the build's upload wave, before each snapshot
//! dispatch, and before finalization. A failed run still returns a report;
//! only fatal [`SnapshotError`]s are returned as `Err`. A fatal error in one
//! snapshot stops further snapshot dispatch; snapshots already in flight
//! finish before the error is returned.
//!
//! # Navigation
//! - Main entrypoint: [`run_snapshot`]
//! - Output: [`SnapshotReport`]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::SnapshotOptions;
use crate::contract::{ResourceFetcher, SnapshotRequestOptions, SnapshotService};
use crate::error::SnapshotError;
use crate::pool::{Dispatch, ProgressSink, WorkerPool};
use crate::remote_resources::autoload_remote_resources;
use crate::resource::{build_resources, Resource, ResourceRole};
use crate::scan::{scan_files, Classifier};
use crate::session::RemoteSession;
use crate::upload::sync_missing_resources;

/// Summary of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotReport {
    pub build_id: Option<String>,
    pub web_url: Option<String>,
    pub root_resources: usize,
    pub supporting_resources: usize,
    pub remote_resources: usize,
    /// Uploads across the build and every snapshot.
    pub resources_uploaded: usize,
    pub snapshots: Vec<SnapshotReportEntry>,
    pub build_finalized: bool,
    /// A recoverable failure cut the run short.
    pub failed: bool,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotReportEntry {
    pub url: String,
    pub snapshot_id: Option<String>,
    pub resources_uploaded: usize,
    pub finalized: bool,
}

impl SnapshotReport {
    /// Whether the run should exit successfully under the given policy.
    pub fn is_success(&self, fail_on_partial: bool) -> bool {
        !(self.failed && fail_on_partial)
    }
}

/// Scans and classifies `root_dir` into `(roots, supporting)` resources.
pub fn discover_resources(
    root_dir: &Path,
    options: &SnapshotOptions,
) -> Result<(Vec<Resource>, Vec<Resource>), SnapshotError> {
    let strip_prefix: PathBuf = options
        .strip_prefix
        .clone()
        .unwrap_or_else(|| root_dir.to_path_buf());
    let classifier = Classifier::new(
        root_dir,
        options.snapshots_regex.as_deref(),
        options.include_all,
    )?;

    let files = scan_files(root_dir)?;
    let (root_paths, supporting_paths) = classifier.classify(&files);
    info!(
        files = files.len(),
        roots = root_paths.len(),
        supporting = supporting_paths.len(),
        "Classified scanned files"
    );

    let roots = build_resources(
        &root_paths,
        &strip_prefix,
        &options.baseurl,
        ResourceRole::Root,
    )?;
    let supporting = build_resources(
        &supporting_paths,
        &strip_prefix,
        &options.baseurl,
        ResourceRole::Supporting,
    )?;
    Ok((roots, supporting))
}

/// Resources submitted with a snapshot: the root first, then every supporting
/// resource whose URL differs from it.
pub fn snapshot_resources(root: &Resource, supporting: &[Resource]) -> Vec<Resource> {
    std::iter::once(root.clone())
        .chain(supporting.iter().filter(|r| r.url != root.url).cloned())
        .collect()
}

/// Snapshots `root_dir` against `service`.
///
/// Fails without contacting the service when no root resources exist.
pub async fn run_snapshot<S>(
    root_dir: &Path,
    options: &SnapshotOptions,
    service: &S,
    fetcher: Option<&dyn ResourceFetcher>,
    sink: &dyn ProgressSink,
) -> Result<SnapshotReport, SnapshotError>
where
    S: SnapshotService + ?Sized,
{
    options.trace_loaded();
    let (roots, supporting) = discover_resources(root_dir, options)?;
    if roots.is_empty() {
        warn!(root_dir = %root_dir.display(), "No root resources found");
        return Err(SnapshotError::NoRootResources {
            root_dir: root_dir.to_path_buf(),
        });
    }
    let repo = options.repo.as_deref().ok_or(SnapshotError::MissingRepo)?;

    let pool = WorkerPool::new(options.effective_threads());
    let mut report = SnapshotReport {
        root_resources: roots.len(),
        supporting_resources: supporting.len(),
        ..SnapshotReport::default()
    };

    let mut supporting = supporting;
    if options.autoload_remote_resources {
        match fetcher {
            Some(fetcher) => {
                let local: Vec<Resource> = roots.iter().chain(&supporting).cloned().collect();
                let remote = autoload_remote_resources(fetcher, &local, &pool).await?;
                report.remote_resources = remote.len();
                supporting.extend(remote);
            }
            None => warn!("Remote resource autoload requested without a fetcher, skipping"),
        }
    }

    let session = RemoteSession::new(service);

    // Checkpoint: build creation.
    let Some(build) = session.create_build(repo, &supporting).await? else {
        return Ok(finish(report, &session));
    };
    report.build_id = Some(build.id.clone());
    report.web_url = build.web_url.clone();

    // Checkpoint: build resource sync.
    let synced = sync_missing_resources(
        &session,
        &build.id,
        &build.missing_resource_ids,
        &supporting,
        &pool,
        sink,
    )
    .await?;
    report.resources_uploaded += synced.uploaded;
    if session.is_failed() {
        return Ok(finish(report, &session));
    }
    session.build_resources_synced()?;

    // Checkpoint: snapshot fan-out.
    let limit = options.snapshot_limit.unwrap_or(usize::MAX);
    let dispatched: Vec<&Resource> = roots.iter().take(limit).collect();
    let total = dispatched.len();
    let request_options = options.request_options();
    let build_id = build.id.as_str();
    let supporting = supporting.as_slice();
    let session_ref = &session;
    let request_options = &request_options;
    let pool_ref = &pool;
    // Raised by the first fatal snapshot error; in-flight snapshots finish,
    // nothing new is dispatched.
    let aborted = AtomicBool::new(false);
    let aborted_ref = &aborted;

    let results = pool
        .run(
            dispatched.into_iter().enumerate(),
            &[session.failed_flag(), &aborted],
            |(i, root)| async move {
                sink.on_snapshot(i + 1, total, &root.url);
                let result = upload_snapshot(
                    session_ref,
                    build_id,
                    root,
                    supporting,
                    request_options,
                    pool_ref,
                    sink,
                )
                .await;
                if result.is_err() {
                    aborted_ref.store(true, Ordering::Release);
                }
                result
            },
        )
        .await;

    let mut first_fault = None;
    for result in results {
        match result {
            Dispatch::Ran(Ok(entry)) => {
                report.resources_uploaded += entry.resources_uploaded;
                report.snapshots.push(entry);
            }
            Dispatch::Ran(Err(e)) => {
                error!(error = %e, "[SNAPSHOT][ERROR] Snapshot task failed");
                first_fault.get_or_insert(e);
            }
            Dispatch::Skipped => {}
        }
    }
    if let Some(e) = first_fault {
        return Err(e);
    }
    report.snapshots.sort_by(|a, b| a.url.cmp(&b.url));

    // Checkpoint: finalize.
    if !session.is_failed() {
        report.build_finalized = session.finalize_build(build_id).await?;
    }
    Ok(finish(report, &session))
}

async fn upload_snapshot<S>(
    session: &RemoteSession<'_, S>,
    build_id: &str,
    root: &Resource,
    supporting: &[Resource],
    request_options: &SnapshotRequestOptions,
    pool: &WorkerPool,
    sink: &dyn ProgressSink,
) -> Result<SnapshotReportEntry, SnapshotError>
where
    S: SnapshotService + ?Sized,
{
    let mut entry = SnapshotReportEntry {
        url: root.url.clone(),
        snapshot_id: None,
        resources_uploaded: 0,
        finalized: false,
    };

    // One root plus all supporting resources; the service only asks for what
    // it lacks, so shared assets are uploaded once per build.
    let resources = snapshot_resources(root, supporting);
    let Some(mut handle) = session
        .create_snapshot(build_id, &resources, request_options)
        .await?
    else {
        return Ok(entry);
    };
    entry.snapshot_id = Some(handle.id().to_string());

    let synced = sync_missing_resources(
        session,
        build_id,
        &handle.snapshot.missing_resource_ids,
        &resources,
        pool,
        sink,
    )
    .await?;
    entry.resources_uploaded = synced.uploaded;
    if synced.failed > 0 {
        return Ok(entry);
    }
    session.snapshot_resources_synced(&mut handle)?;
    entry.finalized = session.finalize_snapshot(&mut handle).await?;
    Ok(entry)
}

fn finish<S>(mut report: SnapshotReport, session: &RemoteSession<'_, S>) -> SnapshotReport
where
    S: SnapshotService + ?Sized,
{
    report.failed = session.is_failed();
    report.failures = session.failures();
    if report.failed {
        warn!(failures = report.failures.len(), "Snapshot run ended early after a service failure");
    } else {
        info!(
            build_id = report.build_id.as_deref().unwrap_or(""),
            snapshots = report.snapshots.len(),
            uploaded = report.resources_uploaded,
            "Snapshot run complete"
        );
    }
    report
}
