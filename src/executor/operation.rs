//! Generated operation unit of work
//!
//! A [`GeneratedOperation`] is the ephemeral value the generator hands the
//! executor: the lazily evaluated operation body, an optional recorder hook
//! for user-facing failure messages, and an optional completion hook. It is
//! created per call, never persisted, never batched.

use crate::error::OperationResult;
use crate::volume::{PodUid, UniqueVolumeName};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

// =============================================================================
// Operation Kind
// =============================================================================

/// The operation families this core executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Attach,
    Detach,
    Mount,
    Unmount,
    UnmountDevice,
    Map,
    Unmap,
    UnmapDevice,
    VerifyControllerAttached,
    VerifyVolumesAttached,
    Expand,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Attach => "volume_attach",
            OperationKind::Detach => "volume_detach",
            OperationKind::Mount => "volume_mount",
            OperationKind::Unmount => "volume_unmount",
            OperationKind::UnmountDevice => "unmount_device",
            OperationKind::Map => "map_volume",
            OperationKind::Unmap => "unmap_volume",
            OperationKind::UnmapDevice => "unmap_device",
            OperationKind::VerifyControllerAttached => "verify_controller_attached",
            OperationKind::VerifyVolumesAttached => "verify_volumes_attached",
            OperationKind::Expand => "expand_volume",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Exclusivity Key
// =============================================================================

/// Value under which conflicting operations are detected.
///
/// Volume-scoped and pod-scoped keys are distinct variants rather than
/// concatenated strings, so a pod-scoped key can never collide with a
/// volume-scoped one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKey {
    /// Serialize per volume, node-wide: attach, detach, device-level
    /// operations, and pod-scoped operations of attachable plugins
    Volume(UniqueVolumeName),
    /// Serialize per (volume, pod): pod-scoped operations of non-attachable
    /// plugins, which are independent across pods
    VolumePod(UniqueVolumeName, PodUid),
    /// Serialize the bulk attachment sweep per node
    NodeBulkVerify(String),
}

impl OperationKey {
    /// Key for mount/unmount/map/unmap. The global-device phase of
    /// attachable plugins forces cross-pod ordering; non-attachable
    /// per-pod operations parallelize.
    pub fn pod_scoped(
        volume_name: UniqueVolumeName,
        pod_uid: PodUid,
        plugin_is_attachable: bool,
    ) -> Self {
        if plugin_is_attachable {
            OperationKey::Volume(volume_name)
        } else {
            OperationKey::VolumePod(volume_name, pod_uid)
        }
    }
}

impl std::fmt::Display for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKey::Volume(volume) => write!(f, "{}", volume),
            OperationKey::VolumePod(volume, pod) => write!(f, "{}@{}", volume, pod),
            OperationKey::NodeBulkVerify(node) => write!(f, "bulk-verify@{}", node),
        }
    }
}

// =============================================================================
// Generated Operation
// =============================================================================

/// Lazily evaluated operation body
pub type OperationFuture = Pin<Box<dyn Future<Output = OperationResult> + Send>>;

/// Hook recording a user-facing failure message as a pod event
pub type EventRecorderFn = Box<dyn Fn(&str) + Send + Sync>;

/// Hook invoked once after the body finishes, with outcome and wall duration
pub type CompleteFn = Box<dyn FnOnce(bool, Duration) + Send>;

/// A unit of work built by the generator and admitted by the executor
pub struct GeneratedOperation {
    pub kind: OperationKind,
    pub operation: OperationFuture,
    pub event_recorder: Option<EventRecorderFn>,
    pub complete: Option<CompleteFn>,
}

impl std::fmt::Debug for GeneratedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedOperation")
            .field("kind", &self.kind)
            .field("operation", &"<future>")
            .field("event_recorder", &self.event_recorder.as_ref().map(|_| "<fn>"))
            .field("complete", &self.complete.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
