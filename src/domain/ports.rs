//! Plugin capability ports
//!
//! Storage backends plug in through these traits. Not every plugin can
//! attach, map, or expand, so those capabilities are separate traits reached
//! through explicit accessors on [`VolumePlugin`] rather than a deep
//! inheritance hierarchy: callers ask `as_attachable()` and handle `None`.

use crate::error::{Error, Result};
use crate::volume::{PodName, PodUid, VolumeSpec};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Base Plugin
// =============================================================================

/// A storage backend plugin.
///
/// The base trait covers the per-pod filesystem lifecycle every plugin has;
/// optional capabilities are reached through the `as_*` accessors.
pub trait VolumePlugin: Send + Sync {
    /// Canonical plugin name (e.g. `example.io/iscsi`)
    fn name(&self) -> &str;

    /// Whether this plugin can handle the given spec
    fn supports_spec(&self, spec: &VolumeSpec) -> bool;

    /// Whether this plugin honors the given mount option
    fn supports_mount_option(&self, option: &str) -> bool;

    /// Build the per-pod setup object for a volume.
    ///
    /// The returned mounter's `set_up` must be idempotent: re-running it for
    /// an already-mounted volume succeeds without side effects.
    fn new_mounter(
        &self,
        spec: &VolumeSpec,
        pod_name: &PodName,
        pod_uid: &PodUid,
    ) -> Result<Box<dyn Mounter>>;

    /// Build the per-pod teardown object for a volume
    fn new_unmounter(&self, volume_name: &str, pod_uid: &PodUid) -> Result<Box<dyn Unmounter>>;

    /// Attach/detach capability, when the backend supports it
    fn as_attachable(self: Arc<Self>) -> Option<AttachablePluginRef> {
        None
    }

    /// Raw-block capability, when the backend supports it
    fn as_block(self: Arc<Self>) -> Option<BlockPluginRef> {
        None
    }

    /// Expansion capability, when the backend supports it
    fn as_expandable(self: Arc<Self>) -> Option<ExpandablePluginRef> {
        None
    }
}

/// Per-pod volume setup
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Expose the volume's filesystem at the pod's path. Idempotent.
    async fn set_up(&self) -> Result<()>;
}

/// Per-pod volume teardown
#[async_trait]
pub trait Unmounter: Send + Sync {
    /// Remove the pod's mount of the volume. Idempotent.
    async fn tear_down(&self) -> Result<()>;
}

// =============================================================================
// Attachable Capability
// =============================================================================

/// Cluster-level attach/detach plus the node-global device mount phase
#[async_trait]
pub trait AttachablePlugin: Send + Sync {
    /// Attach the volume to the node; returns the device path
    async fn attach(&self, spec: &VolumeSpec, node_name: &str) -> Result<String>;

    /// Detach the volume from the node
    async fn detach(&self, volume_id: &str, node_name: &str) -> Result<()>;

    /// Poll until the backend reports the device present, bounded by the
    /// caller-supplied timeout; returns the resolved device path
    async fn wait_for_attach(
        &self,
        spec: &VolumeSpec,
        device_path: Option<&str>,
        timeout: Duration,
    ) -> Result<String>;

    /// Node-global path where the device is mounted once and shared by pods
    async fn get_device_mount_path(&self, spec: &VolumeSpec) -> Result<String>;

    /// Mount the raw device at the node-global path. Idempotent.
    async fn mount_device(
        &self,
        spec: &VolumeSpec,
        device_path: &str,
        device_mount_path: &str,
    ) -> Result<()>;

    /// Unmount the node-global device mount. Idempotent.
    async fn unmount_device(&self, device_mount_path: &str) -> Result<()>;

    /// Batch attachment check: one backend call for many volumes of this
    /// plugin; returns per-volume-name attachment status
    async fn volumes_are_attached(
        &self,
        specs: &[VolumeSpec],
        node_name: &str,
    ) -> Result<HashMap<String, bool>>;
}

// =============================================================================
// Block Capability
// =============================================================================

/// Raw block volume support: symlink-published devices instead of mounts
#[async_trait]
pub trait BlockPlugin: Send + Sync {
    /// Build the per-pod device mapper. `set_up_device` must be idempotent.
    fn new_mapper(
        &self,
        spec: &VolumeSpec,
        pod_name: &PodName,
        pod_uid: &PodUid,
    ) -> Result<Box<dyn BlockVolumeMapper>>;

    /// Build the per-pod device unmapper
    fn new_unmapper(
        &self,
        volume_name: &str,
        pod_uid: &PodUid,
    ) -> Result<Box<dyn BlockVolumeUnmapper>>;

    /// Node-global directory holding per-pod symlinks to the device
    async fn get_global_map_path(&self, spec: &VolumeSpec) -> Result<PathBuf>;
}

/// Per-pod block device publication
#[async_trait]
pub trait BlockVolumeMapper: Send + Sync {
    /// Prepare the backing device for this node; returns the device path.
    /// Idempotent.
    async fn set_up_device(&self) -> Result<String>;

    /// Publish the device into the pod's device directory. Idempotent.
    async fn map_pod_device(&self) -> Result<()>;
}

/// Per-pod block device teardown
#[async_trait]
pub trait BlockVolumeUnmapper: Send + Sync {
    /// Remove the pod's device publication. Idempotent.
    async fn unmap_pod_device(&self) -> Result<()>;

    /// Release the node-level device preparation once no pod references it
    async fn tear_down_device(&self, device_path: &str) -> Result<()>;
}

// =============================================================================
// Expandable Capability
// =============================================================================

/// Control-plane volume expansion
#[async_trait]
pub trait ExpandablePlugin: Send + Sync {
    /// Grow the backing volume; returns the capacity actually realized
    async fn expand(
        &self,
        spec: &VolumeSpec,
        new_size: &Quantity,
        old_size: &Quantity,
    ) -> Result<Quantity>;

    /// Whether a filesystem-level resize must follow on the node. Such a
    /// resize needs the device mounted, so it runs on the next mount cycle.
    fn requires_fs_resize(&self) -> bool;
}

// =============================================================================
// Plugin Manager
// =============================================================================

/// Lookup of the plugin responsible for a volume
pub trait PluginManager: Send + Sync {
    /// Find the plugin that handles the given spec
    fn find_plugin_by_spec(&self, spec: &VolumeSpec) -> Result<VolumePluginRef>;

    /// Find a plugin by its canonical name
    fn find_plugin_by_name(&self, name: &str) -> Result<VolumePluginRef>;
}

/// In-process plugin registry
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<VolumePluginRef>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Last registration wins on name collision.
    pub fn register(&self, plugin: VolumePluginRef) {
        self.plugins.write().push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }
}

impl PluginManager for PluginRegistry {
    fn find_plugin_by_spec(&self, spec: &VolumeSpec) -> Result<VolumePluginRef> {
        self.plugins
            .read()
            .iter()
            .rev()
            .find(|p| p.supports_spec(spec))
            .cloned()
            .ok_or_else(|| Error::UnknownPlugin {
                spec_name: spec.name.clone(),
            })
    }

    fn find_plugin_by_name(&self, name: &str) -> Result<VolumePluginRef> {
        self.plugins
            .read()
            .iter()
            .rev()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| Error::PluginNotFound {
                plugin_name: name.to_string(),
            })
    }
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type VolumePluginRef = Arc<dyn VolumePlugin>;
pub type AttachablePluginRef = Arc<dyn AttachablePlugin>;
pub type BlockPluginRef = Arc<dyn BlockPlugin>;
pub type ExpandablePluginRef = Arc<dyn ExpandablePlugin>;
pub type PluginManagerRef = Arc<dyn PluginManager>;
