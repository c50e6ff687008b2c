//! Reconciliation driver contract
//!
//! This core is stateless per call and never retries internally; its
//! correctness depends on being paired with a fixed-interval loop that
//! re-submits every unresolved desired/actual mismatch. [`Reconciler`] is
//! that loop: each tick it diffs the desired state against the actual state
//! and hands every mismatch to the executor. A submission dropped on key
//! conflict is indistinguishable from any other failed attempt: both are
//! simply retried on the next tick. Adding backoff or queueing here would
//! violate the executor's drop-on-conflict contract.

use crate::domain::ActualStateUpdaterRef;
use crate::error::Error;
use crate::executor::OperationExecutor;
use crate::volume::{
    AttachedVolume, MountedVolume, PodUid, UniqueVolumeName, VolumeMode, VolumeToAttach,
    VolumeToMount,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// State Ports
// =============================================================================

/// Read access to the external desired-state store
pub trait DesiredStateOfWorld: Send + Sync {
    /// Volumes that should be attached to this node
    fn volumes_to_attach(&self) -> Vec<VolumeToAttach>;

    /// Volumes that should be mounted (or mapped) for pods on this node
    fn volumes_to_mount(&self) -> Vec<VolumeToMount>;
}

/// Read access to the external actual-state store
pub trait ActualStateOfWorld: Send + Sync {
    /// Volumes currently attached to this node
    fn attached_volumes(&self) -> Vec<AttachedVolume>;

    /// Volumes currently mounted (or mapped) for pods on this node
    fn mounted_volumes(&self) -> Vec<MountedVolume>;

    fn is_volume_attached(&self, volume_name: &UniqueVolumeName) -> bool;

    fn is_volume_mounted(&self, volume_name: &UniqueVolumeName, pod_uid: &PodUid) -> bool;
}

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for the reconciliation loop
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Fixed pass cadence
    pub interval: Duration,
    /// Honor the node's in-use list before detaching
    pub verify_safe_to_detach: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            verify_safe_to_detach: true,
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Fixed-interval desired/actual diff loop driving the executor
pub struct Reconciler {
    executor: Arc<OperationExecutor>,
    desired: Arc<dyn DesiredStateOfWorld>,
    actual: Arc<dyn ActualStateOfWorld>,
    state_updater: ActualStateUpdaterRef,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        executor: Arc<OperationExecutor>,
        desired: Arc<dyn DesiredStateOfWorld>,
        actual: Arc<dyn ActualStateOfWorld>,
        state_updater: ActualStateUpdaterRef,
        config: ReconcilerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            executor,
            desired,
            actual,
            state_updater,
            config,
        })
    }

    /// Run passes forever at the configured cadence. Callers spawn this and
    /// abort the task to stop reconciling.
    pub async fn run(self: Arc<Self>) {
        info!(interval = ?self.config.interval, "starting volume reconciliation loop");
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            self.reconcile_once();
        }
    }

    /// One full pass: unmounts before mounts so a pod's stale mount of a
    /// volume never blocks another pod's pending mount of it, and detaches
    /// last so devices quiesce first.
    pub fn reconcile_once(&self) {
        let desired_mounts = self.desired.volumes_to_mount();
        let desired_attachments = self.desired.volumes_to_attach();

        for mounted in self.actual.mounted_volumes() {
            let still_desired = desired_mounts
                .iter()
                .any(|d| d.volume_name == mounted.volume_name && d.pod_uid == mounted.pod_uid);
            if still_desired {
                continue;
            }
            let result = match mounted.volume_mode {
                VolumeMode::Filesystem => self
                    .executor
                    .unmount_volume(mounted, self.state_updater.clone()),
                VolumeMode::Block => self
                    .executor
                    .unmap_volume(mounted, self.state_updater.clone()),
            };
            log_submission("unmount", result);
        }

        for to_mount in desired_mounts {
            if self
                .actual
                .is_volume_mounted(&to_mount.volume_name, &to_mount.pod_uid)
                && !to_mount.remount
            {
                continue;
            }
            let result = match to_mount.volume_mode {
                VolumeMode::Filesystem => self
                    .executor
                    .mount_volume(to_mount, self.state_updater.clone()),
                VolumeMode::Block => self.executor.map_volume(to_mount, self.state_updater.clone()),
            };
            log_submission("mount", result);
        }

        for to_attach in &desired_attachments {
            if self.actual.is_volume_attached(&to_attach.volume_name) {
                continue;
            }
            let result = self
                .executor
                .attach_volume(to_attach.clone(), self.state_updater.clone());
            log_submission("attach", result);
        }

        for attached in self.actual.attached_volumes() {
            let still_desired = desired_attachments
                .iter()
                .any(|d| d.volume_name == attached.volume_name);
            if still_desired {
                continue;
            }
            let result = self.executor.detach_volume(
                attached,
                self.config.verify_safe_to_detach,
                self.state_updater.clone(),
            );
            log_submission("detach", result);
        }
    }
}

/// Every failed submission is retried by the next pass; the distinction
/// worth logging is only in-flight conflicts versus real errors.
fn log_submission(action: &str, result: crate::error::Result<()>) {
    match result {
        Ok(()) => {}
        Err(Error::OperationPending { key }) => {
            debug!(action, key = %key, "skipping, operation already in flight");
        }
        Err(err) => {
            warn!(action, error = %err, "failed to submit operation");
        }
    }
}
