//! Request records handed to the executor
//!
//! The reconciler creates one of these for every desired/actual mismatch it
//! finds. Records are read-only to this crate and die after exactly one
//! operation attempt; retries happen only because the reconciler re-creates
//! a fresh record on its next pass.

use crate::volume::spec::{PodName, PodUid, UniqueVolumeName, VolumeMode, VolumeSpec};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

/// Namespaced reference to the PersistentVolumeClaim behind a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRef {
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for ClaimRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A volume that should be attached to a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeToAttach {
    pub volume_name: UniqueVolumeName,
    pub volume_spec: VolumeSpec,
    pub node_name: String,
    /// Pods scheduled to the node that reference this volume; each receives
    /// the user-visible attach events
    pub scheduled_pods: Vec<ObjectReference>,
}

/// A volume that should be mounted (or mapped) for a pod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeToMount {
    pub volume_name: UniqueVolumeName,
    pub volume_spec: VolumeSpec,
    pub volume_mode: VolumeMode,
    pub pod_name: PodName,
    pub pod_uid: PodUid,
    /// Event target for user-visible failures
    pub pod_ref: ObjectReference,
    pub node_name: String,
    pub plugin_is_attachable: bool,
    /// Device path recorded at attach time, when already known
    pub device_path: Option<String>,
    /// Whether the node's status currently advertises this volume as in-use
    pub reported_in_use: bool,
    /// True when the volume is already mounted for this pod and only needs
    /// re-running; the identical path runs at lower log verbosity
    pub remount: bool,
    /// Requested size, driving the mount-time filesystem resize gate
    pub desired_size: Option<Quantity>,
    /// Claim whose status carries the realized capacity
    pub claim: Option<ClaimRef>,
}

/// A volume currently mounted (or mapped) for a pod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountedVolume {
    pub volume_name: UniqueVolumeName,
    /// Spec, when still known; unmount can proceed from the plugin name alone
    pub volume_spec: Option<VolumeSpec>,
    pub volume_mode: VolumeMode,
    pub plugin_name: String,
    /// Volume name as known to the plugin
    pub inner_volume_name: String,
    pub pod_name: PodName,
    pub pod_uid: PodUid,
    pub plugin_is_attachable: bool,
}

/// A volume currently attached to a node (or believed to be)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedVolume {
    pub volume_name: UniqueVolumeName,
    /// Spec, when still known. Absent after a controller restart, in which
    /// case the plugin is recovered by splitting the unique volume name.
    pub volume_spec: Option<VolumeSpec>,
    pub node_name: String,
    pub device_path: String,
    pub plugin_is_attachable: bool,
}

/// A volume whose requested capacity exceeds its provisioned capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeToExpand {
    pub volume_name: UniqueVolumeName,
    pub volume_spec: VolumeSpec,
    pub claim: ClaimRef,
    pub new_size: Quantity,
}
