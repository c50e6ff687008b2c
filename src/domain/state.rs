//! Actual-state-of-world update port
//!
//! The orchestrator never owns attachment/mount state; it reports real
//! outcomes to the external store through these narrow mark methods. The
//! store is assumed internally safe for concurrent callers.
//!
//! Block volumes reuse the same bookkeeping: a prepared device maps to
//! `mark_device_mounted` with the global map path, and a pod's published
//! device maps to `mark_volume_mounted`.

use crate::error::Result;
use crate::volume::{PodUid, UniqueVolumeName};
use std::sync::Arc;

/// Narrow mutation interface over the external actual-state store
pub trait ActualStateUpdater: Send + Sync {
    /// Record a volume as attached to a node at a device path
    fn mark_volume_attached(
        &self,
        volume_name: &UniqueVolumeName,
        node_name: &str,
        device_path: &str,
    ) -> Result<()>;

    /// Record a volume as no longer attached to a node
    fn mark_volume_detached(&self, volume_name: &UniqueVolumeName, node_name: &str) -> Result<()>;

    /// Keep the node advertising an attachment whose detach failed, so a
    /// later pass can retry the detach
    fn add_volume_to_report_as_attached(
        &self,
        volume_name: &UniqueVolumeName,
        node_name: &str,
    ) -> Result<()>;

    /// Record the node-global device mount (or block global map path)
    fn mark_device_mounted(
        &self,
        volume_name: &UniqueVolumeName,
        device_path: &str,
        device_mount_path: &str,
    ) -> Result<()>;

    /// Record the node-global device mount as gone
    fn mark_device_unmounted(&self, volume_name: &UniqueVolumeName) -> Result<()>;

    /// Record a volume as mounted (or mapped) for a pod
    fn mark_volume_mounted(&self, volume_name: &UniqueVolumeName, pod_uid: &PodUid) -> Result<()>;

    /// Record a volume as no longer mounted (or mapped) for a pod
    fn mark_volume_unmounted(&self, volume_name: &UniqueVolumeName, pod_uid: &PodUid)
        -> Result<()>;

    /// Record that a filesystem-level resize is still owed for the volume
    /// and should run on the next mount cycle
    fn mark_fs_resize_required(&self, volume_name: &UniqueVolumeName) -> Result<()>;
}

pub type ActualStateUpdaterRef = Arc<dyn ActualStateUpdater>;
