//! OS-level mount utility port
//!
//! Filesystem checks the generator consults around plugin calls: whether a
//! device node exists, whether the kernel still holds it open, sub-path
//! bind-mount cleanup, and the format-and-resize helper used by the
//! mount-time filesystem resize.

use crate::error::Result;
use crate::volume::{PodUid, UniqueVolumeName};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[async_trait]
pub trait MountUtility: Send + Sync {
    /// Whether the given path exists on the node
    async fn path_exists(&self, path: &Path) -> Result<bool>;

    /// Whether the device is still held open by any process. Consulted after
    /// a device unmount to catch a device that is busy elsewhere.
    async fn device_opened(&self, device_path: &str) -> Result<bool>;

    /// Mount references under the node-global device mount path, excluding
    /// the device mount itself
    async fn get_device_mount_refs(&self, device_mount_path: &str) -> Result<Vec<PathBuf>>;

    /// Remove the pod's sub-path bind mounts for a volume
    async fn clean_subpaths(&self, volume_name: &UniqueVolumeName, pod_uid: &PodUid) -> Result<()>;

    /// Grow the filesystem on an already-mounted device to fill it
    async fn resize_fs(&self, device_path: &str, device_mount_path: &str) -> Result<()>;
}

pub type MountUtilityRef = Arc<dyn MountUtility>;
