//! Operation Generator
//!
//! Pure builder for [`GeneratedOperation`]s: given a request record and the
//! actual-state callback interface, each `generate_*` synchronously resolves
//! the responsible plugin, performs the checks that need no I/O, and returns
//! the operation body for the executor to admit. Generation failures are
//! surfaced synchronously; nothing is scheduled for them.
//!
//! No function here retries anything. A failed operation body is retried
//! only because the external reconciler re-creates a fresh request record on
//! its next pass.

mod attach;
mod block;
mod expand;
mod mount;
mod verify;

use crate::domain::{
    AttachablePluginRef, BlockDevicePathHandlerRef, ClusterReaderRef, EventLevel,
    EventRecorderRef, MountUtilityRef, PluginManagerRef, VolumePluginRef,
};
use crate::error::{Error, Result};
use crate::executor::EventRecorderFn;
use crate::metrics::OperationMetrics;
use crate::volume::VolumeSpec;
use k8s_openapi::api::core::v1::ObjectReference;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for operation generation
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Gate for the mount-time filesystem resize step
    pub expand_fs_on_mount: bool,
    /// Bound for the wait-for-attach poll during mount/map
    pub wait_for_attach_timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            expand_fs_on_mount: false,
            wait_for_attach_timeout: Duration::from_secs(10 * 60),
        }
    }
}

// =============================================================================
// Operation Generator
// =============================================================================

/// Builds one [`GeneratedOperation`] per request record
pub struct OperationGenerator {
    plugins: PluginManagerRef,
    cluster: ClusterReaderRef,
    recorder: EventRecorderRef,
    mount_util: MountUtilityRef,
    block_util: BlockDevicePathHandlerRef,
    metrics: Arc<OperationMetrics>,
    config: GeneratorConfig,
}

impl OperationGenerator {
    pub fn new(
        plugins: PluginManagerRef,
        cluster: ClusterReaderRef,
        recorder: EventRecorderRef,
        mount_util: MountUtilityRef,
        block_util: BlockDevicePathHandlerRef,
        config: GeneratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            plugins,
            cluster,
            recorder,
            mount_util,
            block_util,
            metrics: OperationMetrics::new(),
            config,
        })
    }

    /// Shared metric sink for the executor
    pub fn metrics(&self) -> Arc<OperationMetrics> {
        self.metrics.clone()
    }

    // =========================================================================
    // Shared Resolution Helpers
    // =========================================================================

    /// Resolve the plugin for a spec together with its attach capability
    pub(crate) fn attachable_for(
        &self,
        spec: &VolumeSpec,
    ) -> Result<(VolumePluginRef, AttachablePluginRef)> {
        let plugin = self.plugins.find_plugin_by_spec(spec)?;
        let attachable =
            plugin
                .clone()
                .as_attachable()
                .ok_or_else(|| Error::PluginNotAttachable {
                    plugin_name: plugin.name().to_string(),
                })?;
        Ok((plugin, attachable))
    }

    /// Recorder hook posting a Warning event with the given reason to one pod
    pub(crate) fn pod_event_recorder(
        &self,
        pod_ref: ObjectReference,
        reason: &'static str,
    ) -> EventRecorderFn {
        let recorder = self.recorder.clone();
        Box::new(move |message| recorder.event(&pod_ref, EventLevel::Warning, reason, message))
    }

    /// Recorder hook fanning a Warning event out to every scheduled pod
    pub(crate) fn pods_event_recorder(
        &self,
        pod_refs: Vec<ObjectReference>,
        reason: &'static str,
    ) -> EventRecorderFn {
        let recorder = self.recorder.clone();
        Box::new(move |message| {
            for pod_ref in &pod_refs {
                recorder.event(pod_ref, EventLevel::Warning, reason, message);
            }
        })
    }
}
