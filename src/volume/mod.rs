//! Volume Data Model
//!
//! Immutable volume descriptions, stable identifiers, and the read-only
//! request records that the external reconciler hands to the executor.

pub mod quantity;
pub mod requests;
pub mod spec;

pub use quantity::{compare_quantities, parse_quantity};
pub use requests::{
    AttachedVolume, ClaimRef, MountedVolume, VolumeToAttach, VolumeToExpand, VolumeToMount,
};
pub use spec::{InlineVolumeSource, PodName, PodUid, UniqueVolumeName, VolumeMode, VolumeSpec};
