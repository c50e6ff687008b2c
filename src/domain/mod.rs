//! Domain Ports
//!
//! Trait boundaries between the orchestrator core and its external
//! collaborators: volume plugins, the actual-state store, the cluster API,
//! the event sink, and the OS-level mount/block utilities.

pub mod blockdev;
pub mod cluster;
pub mod events;
pub mod mount_util;
pub mod ports;
pub mod state;

pub use blockdev::{BlockDevicePathHandler, BlockDevicePathHandlerRef};
pub use cluster::{ClusterReader, ClusterReaderRef, KubeClusterReader};
pub use events::{reasons, EventLevel, EventRecorder, EventRecorderRef};
pub use mount_util::{MountUtility, MountUtilityRef};
pub use ports::{
    AttachablePlugin, AttachablePluginRef, BlockPlugin, BlockPluginRef, BlockVolumeMapper,
    BlockVolumeUnmapper, ExpandablePlugin, ExpandablePluginRef, Mounter, PluginManager,
    PluginManagerRef, PluginRegistry, Unmounter, VolumePlugin, VolumePluginRef,
};
pub use state::{ActualStateUpdater, ActualStateUpdaterRef};
