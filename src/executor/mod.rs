//! Operation Executor - Concurrency Controller
//!
//! The sole arbiter of whether a generated operation may start. Each entry
//! point asks the generator to build the operation, computes its exclusivity
//! key, and atomically registers the key as in flight. A conflicting key
//! means the submission is dropped (never queued); correctness relies on the
//! external reconciler re-submitting unresolved mismatches on its next pass.
//! Admitted operations run as independently spawned tasks, so operations
//! under different keys never wait on each other.

mod inflight;
mod operation;

pub use inflight::{InFlightMarker, InFlightRegistry};
pub use operation::{
    CompleteFn, EventRecorderFn, GeneratedOperation, OperationFuture, OperationKey, OperationKind,
};

use crate::domain::ActualStateUpdaterRef;
use crate::error::{Error, Result};
use crate::generator::OperationGenerator;
use crate::metrics::OperationMetrics;
use crate::volume::{AttachedVolume, MountedVolume, VolumeToAttach, VolumeToExpand, VolumeToMount};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// =============================================================================
// Operation Executor
// =============================================================================

/// Admits generated operations against the keyed in-flight registry and runs
/// them as spawned tasks
pub struct OperationExecutor {
    generator: Arc<OperationGenerator>,
    inflight: InFlightRegistry,
    metrics: Arc<OperationMetrics>,
}

impl OperationExecutor {
    pub fn new(generator: Arc<OperationGenerator>) -> Arc<Self> {
        let metrics = generator.metrics();
        Arc::new(Self {
            generator,
            inflight: InFlightRegistry::new(),
            metrics,
        })
    }

    /// Attach a volume to a node. Key: volume.
    pub fn attach_volume(
        &self,
        volume: VolumeToAttach,
        state: ActualStateUpdaterRef,
    ) -> Result<()> {
        let key = OperationKey::Volume(volume.volume_name.clone());
        let op = self.generator.generate_attach(volume, state)?;
        self.run(key, op)
    }

    /// Detach a volume from a node. Key: volume.
    pub fn detach_volume(
        &self,
        volume: AttachedVolume,
        verify_safe_to_detach: bool,
        state: ActualStateUpdaterRef,
    ) -> Result<()> {
        let key = OperationKey::Volume(volume.volume_name.clone());
        let op = self
            .generator
            .generate_detach(volume, verify_safe_to_detach, state)?;
        self.run(key, op)
    }

    /// Mount a volume for a pod. Key: volume for attachable plugins (the
    /// global-device phase must be serialized across pods), volume+pod
    /// otherwise (per-pod mounts of non-attachable volumes are independent
    /// and run in parallel for throughput).
    pub fn mount_volume(&self, volume: VolumeToMount, state: ActualStateUpdaterRef) -> Result<()> {
        let key = OperationKey::pod_scoped(
            volume.volume_name.clone(),
            volume.pod_uid.clone(),
            volume.plugin_is_attachable,
        );
        let op = self.generator.generate_mount(volume, state)?;
        self.run(key, op)
    }

    /// Unmount a volume from a pod. Same key policy as mount.
    pub fn unmount_volume(
        &self,
        volume: MountedVolume,
        state: ActualStateUpdaterRef,
    ) -> Result<()> {
        let key = OperationKey::pod_scoped(
            volume.volume_name.clone(),
            volume.pod_uid.clone(),
            volume.plugin_is_attachable,
        );
        let op = self.generator.generate_unmount(volume, state)?;
        self.run(key, op)
    }

    /// Unmount the node-global device mount. Key: volume.
    pub fn unmount_device(
        &self,
        volume: AttachedVolume,
        state: ActualStateUpdaterRef,
    ) -> Result<()> {
        let key = OperationKey::Volume(volume.volume_name.clone());
        let op = self.generator.generate_unmount_device(volume, state)?;
        self.run(key, op)
    }

    /// Map a block volume for a pod. Same key policy as mount.
    pub fn map_volume(&self, volume: VolumeToMount, state: ActualStateUpdaterRef) -> Result<()> {
        let key = OperationKey::pod_scoped(
            volume.volume_name.clone(),
            volume.pod_uid.clone(),
            volume.plugin_is_attachable,
        );
        let op = self.generator.generate_map(volume, state)?;
        self.run(key, op)
    }

    /// Unmap a block volume from a pod. Same key policy as mount.
    pub fn unmap_volume(&self, volume: MountedVolume, state: ActualStateUpdaterRef) -> Result<()> {
        let key = OperationKey::pod_scoped(
            volume.volume_name.clone(),
            volume.pod_uid.clone(),
            volume.plugin_is_attachable,
        );
        let op = self.generator.generate_unmap(volume, state)?;
        self.run(key, op)
    }

    /// Tear down a block volume's global map path. Key: volume.
    pub fn unmap_device(&self, volume: AttachedVolume, state: ActualStateUpdaterRef) -> Result<()> {
        let key = OperationKey::Volume(volume.volume_name.clone());
        let op = self.generator.generate_unmap_device(volume, state)?;
        self.run(key, op)
    }

    /// Confirm the controller has attached a volume before mounting it.
    /// Key: volume.
    pub fn verify_controller_attached_volume(
        &self,
        volume: VolumeToMount,
        state: ActualStateUpdaterRef,
    ) -> Result<()> {
        let key = OperationKey::Volume(volume.volume_name.clone());
        let op = self
            .generator
            .generate_verify_controller_attached(volume, state)?;
        self.run(key, op)
    }

    /// Batch-verify that the given volumes are still attached to the node.
    /// Key: one per node, so at most one sweep runs at a time.
    pub fn verify_volumes_are_attached(
        &self,
        node_name: &str,
        volumes: Vec<AttachedVolume>,
        state: ActualStateUpdaterRef,
    ) -> Result<()> {
        let key = OperationKey::NodeBulkVerify(node_name.to_string());
        let op = self
            .generator
            .generate_volumes_are_attached(node_name, volumes, state)?;
        self.run(key, op)
    }

    /// Expand a volume's provisioned capacity. Key: volume.
    pub fn expand_volume(&self, volume: VolumeToExpand, state: ActualStateUpdaterRef) -> Result<()> {
        let key = OperationKey::Volume(volume.volume_name.clone());
        let op = self.generator.generate_expand(volume, state)?;
        self.run(key, op)
    }

    /// Whether an operation is currently in flight under the given key
    pub fn is_operation_pending(&self, key: &OperationKey) -> bool {
        self.inflight.contains(key)
    }

    /// Number of operations currently in flight
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    // =========================================================================
    // Admission + Execution
    // =========================================================================

    /// Atomically admit the operation under its key and run it as a spawned
    /// task. The registry lock is held only across the check-and-insert,
    /// never across the operation body.
    pub(crate) fn run(&self, key: OperationKey, op: GeneratedOperation) -> Result<()> {
        if !self.inflight.try_insert(key.clone(), op.kind) {
            self.metrics.record_dropped(op.kind);
            if let Some(holder) = self.inflight.marker(&key) {
                debug!(
                    %key,
                    operation = %op.kind,
                    holder = %holder.kind,
                    held_for = ?holder.started_at.elapsed(),
                    "dropping submission, key already in flight"
                );
            }
            return Err(Error::OperationPending {
                key: key.to_string(),
            });
        }

        self.metrics.record_started(op.kind);
        debug!(%key, operation = %op.kind, "operation admitted");

        let inflight = self.inflight.clone();
        let metrics = self.metrics.clone();
        let kind = op.kind;
        let GeneratedOperation {
            operation,
            event_recorder,
            complete,
            ..
        } = op;

        tokio::spawn(async move {
            let started = Instant::now();
            let result = operation.await;
            let duration = started.elapsed();

            inflight.remove(&key);
            metrics.record_completed(kind, result.is_ok(), duration);
            if let Some(complete) = complete {
                complete(result.is_ok(), duration);
            }

            match result {
                Ok(()) => {
                    debug!(%key, operation = %kind, ?duration, "operation succeeded");
                }
                Err(failure) => {
                    warn!(%key, operation = %kind, error = %failure.detail, "operation failed");
                    if let (Some(recorder), Some(message)) =
                        (&event_recorder, &failure.event_message)
                    {
                        recorder(message);
                    }
                }
            }
        });

        Ok(())
    }
}
