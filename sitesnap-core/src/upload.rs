//! Diff-and-upload: send exactly the content the service reports missing.
//!
//! Each missing digest is matched to the first candidate resource with the
//! same digest, its bytes are loaded (from disk or memory) and uploaded as
//! one pool task. Loading and uploading happen under one of the pool's
//! shared upload slots, so nested waves stay within the pool size. A digest
//! with no candidate is a protocol fault: that task
//! fails, its siblings still run, and the fault is returned once the wave has
//! drained.

use tracing::{debug, error};

use crate::contract::SnapshotService;
use crate::error::SnapshotError;
use crate::pool::{Dispatch, Progress, ProgressSink, WorkerPool};
use crate::resource::Resource;
use crate::session::RemoteSession;

/// Result of one sync call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub uploaded: usize,
    /// Uploads that hit a recoverable service failure.
    pub failed: usize,
}

/// Uploads every resource whose digest appears in `missing`.
pub async fn sync_missing_resources<S>(
    session: &RemoteSession<'_, S>,
    build_id: &str,
    missing: &[String],
    candidates: &[Resource],
    pool: &WorkerPool,
    sink: &dyn ProgressSink,
) -> Result<SyncOutcome, SnapshotError>
where
    S: SnapshotService + ?Sized,
{
    if missing.is_empty() {
        debug!(build_id, "[UPLOAD] Nothing missing");
        return Ok(SyncOutcome::default());
    }

    let progress = Progress::new(missing.len(), sink);
    let progress = &progress;
    let results = pool
        .run(missing, &[], |digest| async move {
            let resource = candidates
                .iter()
                .find(|r| &r.digest == digest)
                .ok_or_else(|| SnapshotError::MissingResource {
                    digest: digest.clone(),
                })?;
            let _slot = pool.upload_slot().await;
            let content = resource.content().await?;
            debug!(url = %resource.url, digest = %digest, bytes = content.len(), "[UPLOAD] Uploading resource");
            let uploaded = session
                .absorb(
                    "upload_resource",
                    session.service().upload_resource(build_id, content).await,
                )?
                .is_some();
            if uploaded {
                progress.increment(&resource.url);
            }
            Ok::<bool, SnapshotError>(uploaded)
        })
        .await;

    let mut outcome = SyncOutcome::default();
    let mut first_fault = None;
    for result in results {
        match result {
            Dispatch::Ran(Ok(true)) => outcome.uploaded += 1,
            Dispatch::Ran(Ok(false)) => outcome.failed += 1,
            Dispatch::Ran(Err(e)) => {
                error!(error = %e, "[UPLOAD][ERROR] Upload task failed");
                first_fault.get_or_insert(e);
            }
            Dispatch::Skipped => {}
        }
    }
    match first_fault {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}
