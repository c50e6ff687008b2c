//! Node Volume Orchestrator
//!
//! A per-node storage-volume lifecycle library: for every pod scheduled on a
//! node, and for every distinct backing volume, it executes attach, mount,
//! map, verify, unmount, and expand operations against pluggable storage
//! backends, while never running two conflicting operations on the same
//! volume concurrently and letting unrelated volumes proceed fully in
//! parallel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Reconciliation Loop                          │
//! │        (fixed interval, diffs desired vs actual, re-submits)        │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐        ┌──────────────────────────────┐   │
//! │  │  OperationGenerator  │──────▶ │      OperationExecutor       │   │
//! │  │  (pre-checks, body)  │        │  keyed admission + spawning  │   │
//! │  └──────────┬───────────┘        └──────────────┬───────────────┘   │
//! │             │                                   │                   │
//! │             ▼                                   ▼                   │
//! │  ┌──────────────────────┐        ┌──────────────────────────────┐   │
//! │  │   Volume Plugins     │        │    In-Flight Key Registry    │   │
//! │  │ attach/mount/expand  │        │   (drop-on-conflict admit)   │   │
//! │  └──────────────────────┘        └──────────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   Actual State Store  ·  Cluster API  ·  Events  ·  Mount/Block OS  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations never retry internally. Every failure is returned to the
//! reconciler, which re-creates a fresh request record on its next pass;
//! a submission whose exclusivity key is already in flight is dropped, not
//! queued.
//!
//! # Modules
//!
//! - [`executor`]: keyed admission control and operation execution
//! - [`generator`]: per-operation builders with domain pre-checks
//! - [`volume`]: volume specs, identifiers, and request records
//! - [`domain`]: capability ports for plugins and external collaborators
//! - [`reconciler`]: the fixed-interval caller contract
//! - [`metrics`]: operation counters and durations
//! - [`error`]: error taxonomy and the dual-channel failure value

pub mod domain;
pub mod error;
pub mod executor;
pub mod generator;
pub mod metrics;
pub mod reconciler;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use domain::{
    ActualStateUpdater, ActualStateUpdaterRef, AttachablePlugin, AttachablePluginRef,
    BlockDevicePathHandler, BlockDevicePathHandlerRef, BlockPlugin, BlockPluginRef,
    BlockVolumeMapper, BlockVolumeUnmapper, ClusterReader, ClusterReaderRef, EventLevel,
    EventRecorder, EventRecorderRef, ExpandablePlugin, ExpandablePluginRef, KubeClusterReader,
    MountUtility, MountUtilityRef, Mounter, PluginManager, PluginManagerRef, PluginRegistry,
    Unmounter, VolumePlugin, VolumePluginRef,
};

pub use error::{Error, ErrorAction, OperationFailure, OperationResult, Result};

pub use executor::{
    GeneratedOperation, InFlightRegistry, OperationExecutor, OperationKey, OperationKind,
};

pub use generator::{GeneratorConfig, OperationGenerator};

pub use metrics::{OperationMetrics, OperationStatsSnapshot};

pub use reconciler::{ActualStateOfWorld, DesiredStateOfWorld, Reconciler, ReconcilerConfig};

pub use volume::{
    AttachedVolume, ClaimRef, InlineVolumeSource, MountedVolume, PodName, PodUid,
    UniqueVolumeName, VolumeMode, VolumeSpec, VolumeToAttach, VolumeToExpand, VolumeToMount,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
