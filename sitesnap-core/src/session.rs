//! # session: remote build/snapshot lifecycle
//!
//! [`RemoteSession`] is the only place that advances build and snapshot
//! state. The build moves strictly forward:
//!
//! `Idle → BuildCreated → BuildResourcesSynced → SnapshotsCreated(n) →
//! SnapshotsFinalized(n) → BuildFinalized`
//!
//! while each snapshot independently moves `Created → ResourcesSynced →
//! Finalized` through its [`SnapshotHandle`].
//!
//! ## Failure classification
//! Every remote call goes through a checkpoint. A recoverable
//! [`ServiceError`] is logged, recorded, and raises the session's failed flag;
//! the call then yields `Ok(None)`. Once the flag is up, later checkpoints
//! return `Ok(None)` without touching the service. Non-recoverable errors
//! come back as [`SnapshotError::Service`].

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{error, info};

use crate::contract::{Build, Snapshot, SnapshotRequestOptions, SnapshotService};
use crate::error::{ServiceError, SnapshotError};
use crate::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    BuildCreated,
    BuildResourcesSynced,
    SnapshotsCreated(usize),
    SnapshotsFinalized(usize),
    BuildFinalized,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::Idle => write!(f, "idle"),
            BuildState::BuildCreated => write!(f, "build created"),
            BuildState::BuildResourcesSynced => write!(f, "build resources synced"),
            BuildState::SnapshotsCreated(n) => write!(f, "{n} snapshots created"),
            BuildState::SnapshotsFinalized(n) => write!(f, "{n} snapshots finalized"),
            BuildState::BuildFinalized => write!(f, "build finalized"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    BuildCreated,
    BuildResourcesSynced,
    Snapshotting,
    BuildFinalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Created,
    ResourcesSynced,
    Finalized,
}

/// A created snapshot plus its position in the per-snapshot lifecycle.
#[derive(Debug)]
pub struct SnapshotHandle {
    pub snapshot: Snapshot,
    state: SnapshotState,
}

impl SnapshotHandle {
    pub fn state(&self) -> SnapshotState {
        self.state
    }

    pub fn id(&self) -> &str {
        &self.snapshot.id
    }
}

pub struct RemoteSession<'s, S: SnapshotService + ?Sized> {
    service: &'s S,
    failed: AtomicBool,
    phase: Mutex<Phase>,
    snapshots_created: AtomicUsize,
    snapshots_finalized: AtomicUsize,
    creations_in_flight: AtomicUsize,
    failures: Mutex<Vec<String>>,
}

impl<'s, S: SnapshotService + ?Sized> RemoteSession<'s, S> {
    pub fn new(service: &'s S) -> Self {
        Self {
            service,
            failed: AtomicBool::new(false),
            phase: Mutex::new(Phase::Idle),
            snapshots_created: AtomicUsize::new(0),
            snapshots_finalized: AtomicUsize::new(0),
            creations_in_flight: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn service(&self) -> &'s S {
        self.service
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// The set-once failed flag, for gating task dispatch.
    pub fn failed_flag(&self) -> &AtomicBool {
        &self.failed
    }

    /// Messages of every recoverable failure seen so far.
    pub fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn state(&self) -> BuildState {
        match self.phase() {
            Phase::Idle => BuildState::Idle,
            Phase::BuildCreated => BuildState::BuildCreated,
            Phase::BuildResourcesSynced => BuildState::BuildResourcesSynced,
            Phase::Snapshotting => {
                let created = self.snapshots_created.load(Ordering::Acquire);
                let finalized = self.snapshots_finalized.load(Ordering::Acquire);
                if created > 0 && finalized == created {
                    BuildState::SnapshotsFinalized(finalized)
                } else {
                    BuildState::SnapshotsCreated(created)
                }
            }
            Phase::BuildFinalized => BuildState::BuildFinalized,
        }
    }

    pub async fn create_build(
        &self,
        repo: &str,
        resources: &[Resource],
    ) -> Result<Option<Build>, SnapshotError> {
        self.expect_phase(&[Phase::Idle], "create build")?;
        info!(repo, resources = resources.len(), "[BUILD] Creating build");
        let build = self
            .checkpoint("create_build", self.service.create_build(repo, resources))
            .await?;
        if let Some(build) = &build {
            info!(
                build_id = %build.id,
                missing = build.missing_resource_ids.len(),
                "[BUILD] Build created"
            );
            self.set_phase(Phase::BuildCreated);
        }
        Ok(build)
    }

    /// Marks the build's own resources as uploaded; snapshots may follow.
    pub fn build_resources_synced(&self) -> Result<(), SnapshotError> {
        self.expect_phase(&[Phase::BuildCreated], "mark build resources synced")?;
        self.set_phase(Phase::BuildResourcesSynced);
        Ok(())
    }

    pub async fn create_snapshot(
        &self,
        build_id: &str,
        resources: &[Resource],
        options: &SnapshotRequestOptions,
    ) -> Result<Option<SnapshotHandle>, SnapshotError> {
        self.expect_phase(
            &[Phase::BuildResourcesSynced, Phase::Snapshotting],
            "create snapshot",
        )?;
        self.set_phase(Phase::Snapshotting);

        self.creations_in_flight.fetch_add(1, Ordering::AcqRel);
        let result = self
            .checkpoint(
                "create_snapshot",
                self.service.create_snapshot(build_id, resources, options),
            )
            .await;
        self.creations_in_flight.fetch_sub(1, Ordering::AcqRel);

        let snapshot = result?;
        Ok(snapshot.map(|snapshot| {
            self.snapshots_created.fetch_add(1, Ordering::AcqRel);
            info!(
                snapshot_id = %snapshot.id,
                missing = snapshot.missing_resource_ids.len(),
                "[SNAPSHOT] Snapshot created"
            );
            SnapshotHandle {
                snapshot,
                state: SnapshotState::Created,
            }
        }))
    }

    pub fn snapshot_resources_synced(
        &self,
        handle: &mut SnapshotHandle,
    ) -> Result<(), SnapshotError> {
        if handle.state != SnapshotState::Created {
            return Err(SnapshotError::InvalidTransition {
                state: format!("{:?}", handle.state),
                action: "mark snapshot resources synced",
            });
        }
        handle.state = SnapshotState::ResourcesSynced;
        Ok(())
    }

    /// Returns whether the snapshot was finalized (false when skipped or
    /// absorbed as a recoverable failure).
    pub async fn finalize_snapshot(
        &self,
        handle: &mut SnapshotHandle,
    ) -> Result<bool, SnapshotError> {
        if handle.state != SnapshotState::ResourcesSynced {
            return Err(SnapshotError::InvalidTransition {
                state: format!("{:?}", handle.state),
                action: "finalize snapshot",
            });
        }
        let done = self
            .checkpoint(
                "finalize_snapshot",
                self.service.finalize_snapshot(&handle.snapshot.id),
            )
            .await?
            .is_some();
        if done {
            handle.state = SnapshotState::Finalized;
            self.snapshots_finalized.fetch_add(1, Ordering::AcqRel);
            info!(snapshot_id = %handle.snapshot.id, "[SNAPSHOT] Snapshot finalized");
        }
        Ok(done)
    }

    pub async fn finalize_build(&self, build_id: &str) -> Result<bool, SnapshotError> {
        self.expect_phase(
            &[Phase::BuildResourcesSynced, Phase::Snapshotting],
            "finalize build",
        )?;
        if self.creations_in_flight.load(Ordering::Acquire) > 0 {
            return Err(SnapshotError::InvalidTransition {
                state: "snapshot creation outstanding".to_string(),
                action: "finalize build",
            });
        }
        let done = self
            .checkpoint("finalize_build", self.service.finalize_build(build_id))
            .await?
            .is_some();
        if done {
            self.set_phase(Phase::BuildFinalized);
            info!(build_id, "[BUILD] Build finalized");
        }
        Ok(done)
    }

    /// Classifies the outcome of a remote call without gating on the failed
    /// flag. Recoverable failures are recorded and turned into `Ok(None)`.
    pub fn absorb<T>(
        &self,
        step: &'static str,
        result: Result<T, ServiceError>,
    ) -> Result<Option<T>, SnapshotError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_recoverable() => {
                error!(step, error = %e, "[SNAPSHOT][ERROR] Recoverable service failure, run marked failed");
                self.failures
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(format!("{step}: {e}"));
                self.failed.store(true, Ordering::Release);
                Ok(None)
            }
            Err(e) => {
                error!(step, error = %e, "[SNAPSHOT][ERROR] Unrecoverable service failure");
                Err(SnapshotError::Service(e))
            }
        }
    }

    async fn checkpoint<T, Fut>(
        &self,
        step: &'static str,
        call: Fut,
    ) -> Result<Option<T>, SnapshotError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if self.is_failed() {
            info!(step, "Skipping checkpoint after earlier failure");
            return Ok(None);
        }
        self.absorb(step, call.await)
    }

    fn phase(&self) -> Phase {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = phase;
    }

    fn expect_phase(&self, allowed: &[Phase], action: &'static str) -> Result<(), SnapshotError> {
        if allowed.contains(&self.phase()) {
            Ok(())
        } else {
            Err(SnapshotError::InvalidTransition {
                state: self.state().to_string(),
                action,
            })
        }
    }
}
