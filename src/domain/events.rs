//! User-visible event sink
//!
//! Operation successes and failures surface to users as events on the
//! affected pod. The recorder is synchronous so the executor's completion
//! hook can call it without awaiting; implementations are expected to
//! buffer or spawn internally.

use k8s_openapi::api::core::v1::ObjectReference;
use std::sync::Arc;

/// Event severity, mirroring the Kubernetes event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Normal,
    Warning,
}

impl EventLevel {
    pub fn as_str(&self) -> &str {
        match self {
            EventLevel::Normal => "Normal",
            EventLevel::Warning => "Warning",
        }
    }
}

/// Well-known event reasons emitted by this crate
pub mod reasons {
    pub const SUCCESSFUL_ATTACH_VOLUME: &str = "SuccessfulAttachVolume";
    pub const FAILED_ATTACH_VOLUME: &str = "FailedAttachVolume";
    pub const FAILED_MOUNT_VOLUME: &str = "FailedMountVolume";
    pub const FAILED_UNMOUNT_VOLUME: &str = "FailedUnmountVolume";
    pub const FAILED_MAP_VOLUME: &str = "FailedMapVolume";
    pub const VOLUME_RESIZE_FAILED: &str = "VolumeResizeFailed";
    pub const FILESYSTEM_RESIZE_FAILED: &str = "FileSystemResizeFailed";
}

/// Sink for user-visible events against a pod
pub trait EventRecorder: Send + Sync {
    fn event(&self, pod: &ObjectReference, level: EventLevel, reason: &str, message: &str);
}

pub type EventRecorderRef = Arc<dyn EventRecorder>;
