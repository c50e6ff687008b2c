//! Error types for the volume lifecycle orchestrator
//!
//! Provides structured error types for operation generation, admission,
//! pre-checks, and backend calls, plus the dual-channel failure value
//! returned by every operation body.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Generation Errors
    // =========================================================================
    #[error("No plugin supports volume spec: {spec_name}")]
    UnknownPlugin { spec_name: String },

    #[error("No plugin registered with name: {plugin_name}")]
    PluginNotFound { plugin_name: String },

    #[error("Plugin {plugin_name} does not support attach/detach")]
    PluginNotAttachable { plugin_name: String },

    #[error("Plugin {plugin_name} does not support block volumes")]
    PluginNotBlockCapable { plugin_name: String },

    #[error("Plugin {plugin_name} does not support volume expansion")]
    PluginNotExpandable { plugin_name: String },

    #[error("Malformed unique volume name: {name}")]
    MalformedVolumeName { name: String },

    // =========================================================================
    // Admission Errors
    // =========================================================================
    #[error("Operation already pending for key: {key}")]
    OperationPending { key: String },

    // =========================================================================
    // Precondition Errors
    // =========================================================================
    #[error("Volume {volume_name} does not satisfy node affinity of node {node_name}: {detail}")]
    NodeAffinityMismatch {
        volume_name: String,
        node_name: String,
        detail: String,
    },

    #[error("Plugin {plugin_name} does not support mount option: {option}")]
    UnsupportedMountOption { plugin_name: String, option: String },

    #[error("Volume {volume_name} is still in use on node {node_name}")]
    VolumeInUse {
        volume_name: String,
        node_name: String,
    },

    #[error("Global mount of volume {volume_name} still has {ref_count} reference(s)")]
    GlobalMountStillReferenced {
        volume_name: String,
        ref_count: usize,
    },

    #[error("Device {device_path} is still open by another process")]
    DeviceStillOpen { device_path: String },

    #[error("Volume {volume_name} is not attached to node {node_name}")]
    VolumeNotAttached {
        volume_name: String,
        node_name: String,
    },

    #[error("Volume {volume_name} is not yet reported as in-use by node {node_name}")]
    VolumeNotInUse {
        volume_name: String,
        node_name: String,
    },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Backend operation failed: {plugin_name} {operation}: {reason}")]
    BackendOperationFailed {
        plugin_name: String,
        operation: String,
        reason: String,
    },

    #[error(
        "Volume {volume_name} has a dangling attachment at {device_path} on node {current_node}"
    )]
    DanglingAttach {
        volume_name: String,
        device_path: String,
        current_node: String,
    },

    #[error("Timed out after {0:?} waiting for volume attachment")]
    WaitForAttachTimeout(Duration),

    // =========================================================================
    // Cluster API Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Status unavailable for node {node_name}: {reason}")]
    NodeStatusUnavailable { node_name: String, reason: String },

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action the external reconciler should take for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action the reconciler should take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_)
            | Error::BackendOperationFailed { .. }
            | Error::NodeStatusUnavailable { .. }
            | Error::WaitForAttachTimeout(_) => ErrorAction::RequeueWithBackoff,

            // An identical operation is already running - the next pass retries
            Error::OperationPending { .. } => ErrorAction::RequeueAfter(Duration::from_secs(1)),

            // Waiting on external progress (node status push, pod teardown,
            // another pod releasing a shared device)
            Error::VolumeNotInUse { .. }
            | Error::VolumeNotAttached { .. }
            | Error::VolumeInUse { .. }
            | Error::GlobalMountStillReferenced { .. }
            | Error::DeviceStillOpen { .. } => ErrorAction::RequeueAfter(Duration::from_secs(10)),

            // A dangling attachment needs a compensating detach first
            Error::DanglingAttach { .. } => ErrorAction::RequeueAfter(Duration::from_secs(30)),

            // Spec/configuration mismatches - retrying cannot help until the
            // objects themselves change
            Error::NodeAffinityMismatch { .. }
            | Error::UnsupportedMountOption { .. }
            | Error::MalformedVolumeName { .. }
            | Error::CapacityParse(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube(_)
                | Error::BackendOperationFailed { .. }
                | Error::NodeStatusUnavailable { .. }
                | Error::OperationPending { .. }
        )
    }
}

/// Result type alias for the orchestrator
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Dual-Channel Operation Failure
// =============================================================================

/// Failure value returned by operation bodies.
///
/// Carries two independently tuned channels: an optional user-facing message
/// (recorded as an event on the affected pod by the executor's recorder hook)
/// and the detailed error for logs and the reconciler. Absence of a failure
/// means success; there is no partial-success encoding.
#[derive(Debug)]
pub struct OperationFailure {
    /// Message recorded as a pod event, when user-visible
    pub event_message: Option<String>,
    /// Detailed error for logs and retry classification
    pub detail: Error,
}

impl OperationFailure {
    /// Failure that surfaces to the user as a pod event
    pub fn visible(event_message: impl Into<String>, detail: Error) -> Self {
        Self {
            event_message: Some(event_message.into()),
            detail,
        }
    }

    /// Failure visible only in logs and to the reconciler
    pub fn silent(detail: Error) -> Self {
        Self {
            event_message: None,
            detail,
        }
    }

    /// Reconciler action for the underlying error
    pub fn action(&self) -> ErrorAction {
        self.detail.action()
    }
}

impl std::fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.event_message {
            Some(msg) => write!(f, "{}: {}", msg, self.detail),
            None => write!(f, "{}", self.detail),
        }
    }
}

/// Result type for operation bodies
pub type OperationResult = std::result::Result<(), OperationFailure>;
