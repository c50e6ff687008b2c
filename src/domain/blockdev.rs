//! Block device path handler port
//!
//! Raw block volumes are published to pods as device symlinks rather than
//! mounts. This port covers the symlink bookkeeping under the global map
//! path, loop-device management for file-backed volumes, and the
//! file-descriptor lock held on a mapped device so the kernel cannot
//! silently substitute it while pods reference it.

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[async_trait]
pub trait BlockDevicePathHandler: Send + Sync {
    /// Create the pod-scoped symlink `map_dir/link_name` -> `device_path`
    async fn map_device(&self, device_path: &str, map_dir: &Path, link_name: &str) -> Result<()>;

    /// Remove the pod-scoped symlink
    async fn unmap_device(&self, map_dir: &Path, link_name: &str) -> Result<()>;

    /// Pod-scoped symlinks under the global map path that still reference
    /// the device
    async fn get_device_symlink_refs(
        &self,
        device_path: &str,
        map_dir: &Path,
    ) -> Result<Vec<PathBuf>>;

    /// Remove the global map path directory once empty
    async fn remove_map_path(&self, map_dir: &Path) -> Result<()>;

    /// Attach a loop device over a file-backed volume; returns the loop
    /// device path. Returns the input unchanged for real block nodes.
    async fn attach_loop_device(&self, device_path: &str) -> Result<String>;

    /// Detach a previously attached loop device
    async fn remove_loop_device(&self, loop_path: &str) -> Result<()>;

    /// Take a file-descriptor lock on the device
    async fn lock_device(&self, device_path: &str) -> Result<()>;

    /// Release the file-descriptor lock on the device
    async fn unlock_device(&self, device_path: &str) -> Result<()>;
}

pub type BlockDevicePathHandlerRef = Arc<dyn BlockDevicePathHandler>;
