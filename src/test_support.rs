//! Shared fakes for unit tests
//!
//! A configurable fake plugin carrying every optional capability, fake ports
//! for the external collaborators, and a harness wiring them into a real
//! generator/executor pair. Fakes record their calls as flat strings so
//! tests can assert on both presence and ordering.

use crate::domain::{
    ActualStateUpdater, AttachablePlugin, AttachablePluginRef, BlockDevicePathHandler,
    BlockPlugin, BlockPluginRef, BlockVolumeMapper, BlockVolumeUnmapper, ClusterReader,
    EventLevel, EventRecorder, ExpandablePlugin, ExpandablePluginRef, MountUtility, Mounter,
    PluginRegistry, Unmounter, VolumePlugin,
};
use crate::error::{Error, Result};
use crate::executor::OperationExecutor;
use crate::generator::{GeneratorConfig, OperationGenerator};
use crate::metrics::OperationMetrics;
use crate::volume::{
    AttachedVolume, ClaimRef, MountedVolume, PodName, PodUid, UniqueVolumeName, VolumeMode,
    VolumeSpec, VolumeToAttach, VolumeToExpand, VolumeToMount,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    AttachedVolume as K8sAttachedVolume, Node, NodeStatus, ObjectReference, PersistentVolume,
    PersistentVolumeClaim, PersistentVolumeClaimStatus, PersistentVolumeSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Barrier, Notify};

// =============================================================================
// Call Log
// =============================================================================

/// Flat, shareable record of calls made against a fake
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

// =============================================================================
// Fake Plugin
// =============================================================================

pub struct FakePlugin {
    name: String,
    is_attachable: bool,
    is_block: bool,
    is_expandable: bool,
    requires_fs_resize: bool,
    fail_attach: bool,
    fail_detach: bool,
    fail_expand: bool,
    fail_bulk_verify: bool,
    dangling: Option<(String, String)>,
    bulk_missing: Vec<String>,
    rejected_options: Vec<String>,
    wait_barrier: Option<Arc<Barrier>>,
    wait_gate: Option<Arc<Notify>>,
    set_up_barrier: Option<Arc<Barrier>>,
    calls: CallLog,
}

impl FakePlugin {
    pub fn builder(name: &str) -> FakePluginBuilder {
        FakePluginBuilder {
            plugin: FakePlugin {
                name: name.to_string(),
                is_attachable: false,
                is_block: false,
                is_expandable: false,
                requires_fs_resize: false,
                fail_attach: false,
                fail_detach: false,
                fail_expand: false,
                fail_bulk_verify: false,
                dangling: None,
                bulk_missing: Vec::new(),
                rejected_options: Vec::new(),
                wait_barrier: None,
                wait_gate: None,
                set_up_barrier: None,
                calls: CallLog::default(),
            },
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.calls()
    }

    fn backend_error(&self, operation: &str) -> Error {
        Error::BackendOperationFailed {
            plugin_name: self.name.clone(),
            operation: operation.to_string(),
            reason: "injected failure".into(),
        }
    }
}

pub struct FakePluginBuilder {
    plugin: FakePlugin,
}

impl FakePluginBuilder {
    pub fn attachable(mut self, yes: bool) -> Self {
        self.plugin.is_attachable = yes;
        self
    }

    pub fn block(mut self, yes: bool) -> Self {
        self.plugin.is_block = yes;
        self
    }

    pub fn expandable(mut self, yes: bool) -> Self {
        self.plugin.is_expandable = yes;
        self
    }

    pub fn requires_fs_resize(mut self, yes: bool) -> Self {
        self.plugin.requires_fs_resize = yes;
        self
    }

    pub fn fail_detach(mut self) -> Self {
        self.plugin.fail_detach = true;
        self
    }

    pub fn fail_expand(mut self) -> Self {
        self.plugin.fail_expand = true;
        self
    }

    pub fn fail_bulk_verify(mut self) -> Self {
        self.plugin.fail_bulk_verify = true;
        self
    }

    pub fn dangling_attach(mut self, device_path: &str, node: &str) -> Self {
        self.plugin.dangling = Some((device_path.to_string(), node.to_string()));
        self
    }

    pub fn bulk_verify_missing(mut self, names: &[&str]) -> Self {
        self.plugin.bulk_missing = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn reject_mount_option(mut self, option: &str) -> Self {
        self.plugin.rejected_options.push(option.to_string());
        self
    }

    pub fn wait_for_attach_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.plugin.wait_barrier = Some(barrier);
        self
    }

    pub fn wait_for_attach_gate(mut self, gate: Arc<Notify>) -> Self {
        self.plugin.wait_gate = Some(gate);
        self
    }

    pub fn set_up_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.plugin.set_up_barrier = Some(barrier);
        self
    }

    pub fn build(self) -> FakePlugin {
        self.plugin
    }
}

impl VolumePlugin for FakePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_spec(&self, _spec: &VolumeSpec) -> bool {
        true
    }

    fn supports_mount_option(&self, option: &str) -> bool {
        !self.rejected_options.iter().any(|o| o == option)
    }

    fn new_mounter(
        &self,
        spec: &VolumeSpec,
        _pod_name: &PodName,
        pod_uid: &PodUid,
    ) -> Result<Box<dyn Mounter>> {
        Ok(Box::new(FakeMounter {
            volume_name: spec.name.clone(),
            pod_uid: pod_uid.clone(),
            barrier: self.set_up_barrier.clone(),
            calls: self.calls.clone(),
        }))
    }

    fn new_unmounter(&self, volume_name: &str, pod_uid: &PodUid) -> Result<Box<dyn Unmounter>> {
        Ok(Box::new(FakeUnmounter {
            volume_name: volume_name.to_string(),
            pod_uid: pod_uid.clone(),
            calls: self.calls.clone(),
        }))
    }

    fn as_attachable(self: Arc<Self>) -> Option<AttachablePluginRef> {
        if self.is_attachable {
            Some(self)
        } else {
            None
        }
    }

    fn as_block(self: Arc<Self>) -> Option<BlockPluginRef> {
        if self.is_block {
            Some(self)
        } else {
            None
        }
    }

    fn as_expandable(self: Arc<Self>) -> Option<ExpandablePluginRef> {
        if self.is_expandable {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl AttachablePlugin for FakePlugin {
    async fn attach(&self, spec: &VolumeSpec, node_name: &str) -> Result<String> {
        self.calls.record(format!("attach {} {}", spec.name, node_name));
        if let Some((device_path, current_node)) = &self.dangling {
            return Err(Error::DanglingAttach {
                volume_name: spec.name.clone(),
                device_path: device_path.clone(),
                current_node: current_node.clone(),
            });
        }
        if self.fail_attach {
            return Err(self.backend_error("attach"));
        }
        Ok(format!("/dev/fake/{}", spec.name))
    }

    async fn detach(&self, volume_id: &str, node_name: &str) -> Result<()> {
        self.calls.record(format!("detach {} {}", volume_id, node_name));
        if self.fail_detach {
            return Err(self.backend_error("detach"));
        }
        Ok(())
    }

    async fn wait_for_attach(
        &self,
        spec: &VolumeSpec,
        device_path: Option<&str>,
        _timeout: Duration,
    ) -> Result<String> {
        self.calls.record(format!("wait_for_attach {}", spec.name));
        if let Some(barrier) = &self.wait_barrier {
            barrier.wait().await;
        }
        if let Some(gate) = &self.wait_gate {
            gate.notified().await;
        }
        Ok(device_path
            .map(|p| p.to_string())
            .unwrap_or_else(|| format!("/dev/fake/{}", spec.name)))
    }

    async fn get_device_mount_path(&self, spec: &VolumeSpec) -> Result<String> {
        Ok(format!("/var/lib/volumes/{}/{}", self.name, spec.name))
    }

    async fn mount_device(
        &self,
        spec: &VolumeSpec,
        device_path: &str,
        device_mount_path: &str,
    ) -> Result<()> {
        self.calls.record(format!(
            "mount_device {} {} {}",
            spec.name, device_path, device_mount_path
        ));
        Ok(())
    }

    async fn unmount_device(&self, device_mount_path: &str) -> Result<()> {
        self.calls.record(format!("unmount_device {}", device_mount_path));
        Ok(())
    }

    async fn volumes_are_attached(
        &self,
        specs: &[VolumeSpec],
        node_name: &str,
    ) -> Result<HashMap<String, bool>> {
        self.calls
            .record(format!("volumes_are_attached {} {}", specs.len(), node_name));
        if self.fail_bulk_verify {
            return Err(self.backend_error("volumes_are_attached"));
        }
        Ok(specs
            .iter()
            .map(|s| {
                let attached = !self.bulk_missing.iter().any(|m| m == &s.name);
                (s.name.clone(), attached)
            })
            .collect())
    }
}

#[async_trait]
impl BlockPlugin for FakePlugin {
    fn new_mapper(
        &self,
        spec: &VolumeSpec,
        _pod_name: &PodName,
        pod_uid: &PodUid,
    ) -> Result<Box<dyn BlockVolumeMapper>> {
        Ok(Box::new(FakeMapper {
            volume_name: spec.name.clone(),
            pod_uid: pod_uid.clone(),
            calls: self.calls.clone(),
        }))
    }

    fn new_unmapper(
        &self,
        volume_name: &str,
        pod_uid: &PodUid,
    ) -> Result<Box<dyn BlockVolumeUnmapper>> {
        Ok(Box::new(FakeUnmapper {
            volume_name: volume_name.to_string(),
            pod_uid: pod_uid.clone(),
            calls: self.calls.clone(),
        }))
    }

    async fn get_global_map_path(&self, spec: &VolumeSpec) -> Result<PathBuf> {
        Ok(PathBuf::from(format!(
            "/var/lib/volumes/block/{}/{}",
            self.name, spec.name
        )))
    }
}

#[async_trait]
impl ExpandablePlugin for FakePlugin {
    async fn expand(
        &self,
        spec: &VolumeSpec,
        new_size: &Quantity,
        old_size: &Quantity,
    ) -> Result<Quantity> {
        self.calls
            .record(format!("expand {} {} {}", spec.name, new_size.0, old_size.0));
        if self.fail_expand {
            return Err(self.backend_error("expand"));
        }
        Ok(new_size.clone())
    }

    fn requires_fs_resize(&self) -> bool {
        self.requires_fs_resize
    }
}

struct FakeMounter {
    volume_name: String,
    pod_uid: PodUid,
    barrier: Option<Arc<Barrier>>,
    calls: CallLog,
}

#[async_trait]
impl Mounter for FakeMounter {
    async fn set_up(&self) -> Result<()> {
        self.calls
            .record(format!("set_up {} {}", self.volume_name, self.pod_uid));
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        Ok(())
    }
}

struct FakeUnmounter {
    volume_name: String,
    pod_uid: PodUid,
    calls: CallLog,
}

#[async_trait]
impl Unmounter for FakeUnmounter {
    async fn tear_down(&self) -> Result<()> {
        self.calls
            .record(format!("tear_down {} {}", self.volume_name, self.pod_uid));
        Ok(())
    }
}

struct FakeMapper {
    volume_name: String,
    pod_uid: PodUid,
    calls: CallLog,
}

#[async_trait]
impl BlockVolumeMapper for FakeMapper {
    async fn set_up_device(&self) -> Result<String> {
        self.calls.record(format!("set_up_device {}", self.volume_name));
        Ok(format!("/dev/fake/{}", self.volume_name))
    }

    async fn map_pod_device(&self) -> Result<()> {
        self.calls
            .record(format!("map_pod_device {} {}", self.volume_name, self.pod_uid));
        Ok(())
    }
}

struct FakeUnmapper {
    volume_name: String,
    pod_uid: PodUid,
    calls: CallLog,
}

#[async_trait]
impl BlockVolumeUnmapper for FakeUnmapper {
    async fn unmap_pod_device(&self) -> Result<()> {
        self.calls
            .record(format!("unmap_pod_device {} {}", self.volume_name, self.pod_uid));
        Ok(())
    }

    async fn tear_down_device(&self, device_path: &str) -> Result<()> {
        self.calls.record(format!("tear_down_device {}", device_path));
        Ok(())
    }
}

// =============================================================================
// Fake Actual State
// =============================================================================

#[derive(Default)]
pub struct FakeActualState {
    calls: CallLog,
    fail_mark_volume_unmounted: AtomicBool,
}

impl FakeActualState {
    pub fn calls(&self) -> Vec<String> {
        self.calls.calls()
    }

    pub fn fail_mark_volume_unmounted(&self) {
        self.fail_mark_volume_unmounted.store(true, Ordering::SeqCst);
    }
}

impl ActualStateUpdater for FakeActualState {
    fn mark_volume_attached(
        &self,
        volume_name: &UniqueVolumeName,
        node_name: &str,
        device_path: &str,
    ) -> Result<()> {
        self.calls.record(format!(
            "mark_volume_attached {} {} {}",
            volume_name, node_name, device_path
        ));
        Ok(())
    }

    fn mark_volume_detached(&self, volume_name: &UniqueVolumeName, node_name: &str) -> Result<()> {
        self.calls
            .record(format!("mark_volume_detached {} {}", volume_name, node_name));
        Ok(())
    }

    fn add_volume_to_report_as_attached(
        &self,
        volume_name: &UniqueVolumeName,
        node_name: &str,
    ) -> Result<()> {
        self.calls.record(format!(
            "add_volume_to_report_as_attached {} {}",
            volume_name, node_name
        ));
        Ok(())
    }

    fn mark_device_mounted(
        &self,
        volume_name: &UniqueVolumeName,
        device_path: &str,
        device_mount_path: &str,
    ) -> Result<()> {
        self.calls.record(format!(
            "mark_device_mounted {} {} {}",
            volume_name, device_path, device_mount_path
        ));
        Ok(())
    }

    fn mark_device_unmounted(&self, volume_name: &UniqueVolumeName) -> Result<()> {
        self.calls.record(format!("mark_device_unmounted {}", volume_name));
        Ok(())
    }

    fn mark_volume_mounted(&self, volume_name: &UniqueVolumeName, pod_uid: &PodUid) -> Result<()> {
        self.calls
            .record(format!("mark_volume_mounted {} {}", volume_name, pod_uid));
        Ok(())
    }

    fn mark_volume_unmounted(
        &self,
        volume_name: &UniqueVolumeName,
        pod_uid: &PodUid,
    ) -> Result<()> {
        if self.fail_mark_volume_unmounted.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected bookkeeping failure".into()));
        }
        self.calls
            .record(format!("mark_volume_unmounted {} {}", volume_name, pod_uid));
        Ok(())
    }

    fn mark_fs_resize_required(&self, volume_name: &UniqueVolumeName) -> Result<()> {
        self.calls
            .record(format!("mark_fs_resize_required {}", volume_name));
        Ok(())
    }
}

// =============================================================================
// Fake Cluster Reader
// =============================================================================

#[derive(Default)]
struct FakeClusterState {
    node_labels: BTreeMap<String, String>,
    volumes_in_use: Vec<String>,
    volumes_attached: Vec<(String, String)>,
    pvc_capacity: Option<String>,
    fail_get_node: bool,
}

/// Serves a single node named `node-a` and a single claim. Only mutations
/// (status patches) are recorded in the call log.
#[derive(Default)]
pub struct FakeClusterReader {
    state: Mutex<FakeClusterState>,
    calls: CallLog,
}

impl FakeClusterReader {
    pub fn calls(&self) -> Vec<String> {
        self.calls.calls()
    }

    pub fn set_node_labels(&self, labels: &[(&str, &str)]) {
        self.state.lock().node_labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }

    pub fn set_node_in_use(&self, volumes: &[&str]) {
        self.state.lock().volumes_in_use = volumes.iter().map(|v| v.to_string()).collect();
    }

    pub fn set_node_attached(&self, volumes: &[(&str, &str)]) {
        self.state.lock().volumes_attached = volumes
            .iter()
            .map(|(n, d)| (n.to_string(), d.to_string()))
            .collect();
    }

    pub fn set_pvc_capacity(&self, capacity: &str) {
        self.state.lock().pvc_capacity = Some(capacity.to_string());
    }

    pub fn fail_get_node(&self) {
        self.state.lock().fail_get_node = true;
    }
}

#[async_trait]
impl ClusterReader for FakeClusterReader {
    async fn get_node(&self, name: &str) -> Result<Node> {
        let state = self.state.lock();
        if state.fail_get_node {
            return Err(Error::NodeStatusUnavailable {
                node_name: name.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(Node {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(state.node_labels.clone()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                volumes_in_use: Some(state.volumes_in_use.clone()),
                volumes_attached: Some(
                    state
                        .volumes_attached
                        .iter()
                        .map(|(n, d)| K8sAttachedVolume {
                            name: n.clone(),
                            device_path: d.clone(),
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        let state = self.state.lock();
        Ok(PersistentVolumeClaim {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            status: state.pvc_capacity.as_ref().map(|capacity| {
                PersistentVolumeClaimStatus {
                    capacity: Some(
                        [("storage".to_string(), Quantity(capacity.clone()))]
                            .into_iter()
                            .collect(),
                    ),
                    ..Default::default()
                }
            }),
            ..Default::default()
        })
    }

    async fn patch_pvc_status_capacity(
        &self,
        namespace: &str,
        name: &str,
        capacity: Quantity,
    ) -> Result<()> {
        self.calls.record(format!(
            "patch_pvc_status_capacity {}/{} {}",
            namespace, name, capacity.0
        ));
        Ok(())
    }
}

// =============================================================================
// Fake Event Recorder
// =============================================================================

#[derive(Default)]
pub struct FakeRecorder {
    events: Mutex<Vec<String>>,
}

impl FakeRecorder {
    pub fn recorded(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl EventRecorder for FakeRecorder {
    fn event(&self, pod: &ObjectReference, level: EventLevel, reason: &str, message: &str) {
        self.events.lock().push(format!(
            "{} {} {} {}",
            level.as_str(),
            reason,
            pod.name.as_deref().unwrap_or("<unknown>"),
            message
        ));
    }
}

// =============================================================================
// Fake Mount Utility
// =============================================================================

#[derive(Default)]
pub struct FakeMountUtility {
    calls: CallLog,
    device_mount_refs: Mutex<Vec<String>>,
    device_opened: AtomicBool,
}

impl FakeMountUtility {
    pub fn calls(&self) -> Vec<String> {
        self.calls.calls()
    }

    pub fn set_device_mount_refs(&self, refs: &[&str]) {
        *self.device_mount_refs.lock() = refs.iter().map(|r| r.to_string()).collect();
    }

    pub fn set_device_opened(&self, opened: bool) {
        self.device_opened.store(opened, Ordering::SeqCst);
    }
}

#[async_trait]
impl MountUtility for FakeMountUtility {
    async fn path_exists(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }

    async fn device_opened(&self, device_path: &str) -> Result<bool> {
        self.calls.record(format!("device_opened {}", device_path));
        Ok(self.device_opened.load(Ordering::SeqCst))
    }

    async fn get_device_mount_refs(&self, device_mount_path: &str) -> Result<Vec<PathBuf>> {
        self.calls
            .record(format!("get_device_mount_refs {}", device_mount_path));
        Ok(self
            .device_mount_refs
            .lock()
            .iter()
            .map(PathBuf::from)
            .collect())
    }

    async fn clean_subpaths(&self, volume_name: &UniqueVolumeName, pod_uid: &PodUid) -> Result<()> {
        self.calls
            .record(format!("clean_subpaths {} {}", volume_name, pod_uid));
        Ok(())
    }

    async fn resize_fs(&self, device_path: &str, device_mount_path: &str) -> Result<()> {
        self.calls
            .record(format!("resize_fs {} {}", device_path, device_mount_path));
        Ok(())
    }
}

// =============================================================================
// Fake Block Device Handler
// =============================================================================

#[derive(Default)]
pub struct FakeBlockDev {
    calls: CallLog,
    symlink_refs: Mutex<Vec<String>>,
}

impl FakeBlockDev {
    pub fn calls(&self) -> Vec<String> {
        self.calls.calls()
    }

    pub fn set_symlink_refs(&self, refs: &[&str]) {
        *self.symlink_refs.lock() = refs.iter().map(|r| r.to_string()).collect();
    }
}

#[async_trait]
impl BlockDevicePathHandler for FakeBlockDev {
    async fn map_device(&self, device_path: &str, map_dir: &Path, link_name: &str) -> Result<()> {
        self.calls.record(format!(
            "map_device {} {} {}",
            device_path,
            map_dir.display(),
            link_name
        ));
        Ok(())
    }

    async fn unmap_device(&self, map_dir: &Path, link_name: &str) -> Result<()> {
        self.calls
            .record(format!("unmap_device {} {}", map_dir.display(), link_name));
        Ok(())
    }

    async fn get_device_symlink_refs(
        &self,
        device_path: &str,
        map_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        self.calls.record(format!(
            "get_device_symlink_refs {} {}",
            device_path,
            map_dir.display()
        ));
        Ok(self.symlink_refs.lock().iter().map(PathBuf::from).collect())
    }

    async fn remove_map_path(&self, map_dir: &Path) -> Result<()> {
        self.calls
            .record(format!("remove_map_path {}", map_dir.display()));
        Ok(())
    }

    async fn attach_loop_device(&self, device_path: &str) -> Result<String> {
        self.calls
            .record(format!("attach_loop_device {}", device_path));
        Ok(device_path.to_string())
    }

    async fn remove_loop_device(&self, loop_path: &str) -> Result<()> {
        self.calls.record(format!("remove_loop_device {}", loop_path));
        Ok(())
    }

    async fn lock_device(&self, device_path: &str) -> Result<()> {
        self.calls.record(format!("lock_device {}", device_path));
        Ok(())
    }

    async fn unlock_device(&self, device_path: &str) -> Result<()> {
        self.calls.record(format!("unlock_device {}", device_path));
        Ok(())
    }
}

// =============================================================================
// Spec Builders
// =============================================================================

/// Spec backed by a PV with the given capacity
pub fn spec_with_capacity(name: &str, capacity: &str) -> VolumeSpec {
    let pv = PersistentVolume {
        spec: Some(PersistentVolumeSpec {
            capacity: Some(
                [("storage".to_string(), Quantity(capacity.to_string()))]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    };
    VolumeSpec::from_persistent_volume(name, pv)
}

/// Spec requiring `zone=<zone>` on the node
pub fn spec_with_zone_affinity(name: &str, zone: &str) -> VolumeSpec {
    use k8s_openapi::api::core::v1::{
        NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, VolumeNodeAffinity,
    };
    let pv = PersistentVolume {
        spec: Some(PersistentVolumeSpec {
            node_affinity: Some(VolumeNodeAffinity {
                required: Some(NodeSelector {
                    node_selector_terms: vec![NodeSelectorTerm {
                        match_expressions: Some(vec![NodeSelectorRequirement {
                            key: "zone".into(),
                            operator: "In".into(),
                            values: Some(vec![zone.to_string()]),
                        }]),
                        match_fields: None,
                    }],
                }),
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    VolumeSpec::from_persistent_volume(name, pv)
}

/// Spec whose PV requests the given mount options
pub fn spec_with_mount_options(name: &str, options: &[&str]) -> VolumeSpec {
    let pv = PersistentVolume {
        spec: Some(PersistentVolumeSpec {
            mount_options: Some(options.iter().map(|o| o.to_string()).collect()),
            ..Default::default()
        }),
        ..Default::default()
    };
    VolumeSpec::from_persistent_volume(name, pv)
}

// =============================================================================
// Harness
// =============================================================================

/// Install a compact subscriber once so failing tests show orchestrator logs
/// (enable with RUST_LOG=debug)
fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A real generator wired to fakes, plus record constructors
pub struct Harness {
    pub plugin: Arc<FakePlugin>,
    pub generator: Arc<OperationGenerator>,
    pub state: Arc<FakeActualState>,
    pub cluster: Arc<FakeClusterReader>,
    pub events: Arc<FakeRecorder>,
    pub mount_util: Arc<FakeMountUtility>,
    pub block_util: Arc<FakeBlockDev>,
    pub metrics: Arc<OperationMetrics>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            FakePlugin::builder("example.io/fake").attachable(true).build(),
            GeneratorConfig::default(),
        )
    }

    pub fn with_plugin(plugin: FakePlugin) -> Self {
        Self::build(plugin, GeneratorConfig::default())
    }

    pub fn with_resize_enabled() -> Self {
        Self::build(
            FakePlugin::builder("example.io/fake").attachable(true).build(),
            GeneratorConfig {
                expand_fs_on_mount: true,
                ..Default::default()
            },
        )
    }

    fn build(plugin: FakePlugin, config: GeneratorConfig) -> Self {
        init_test_tracing();
        let plugin = Arc::new(plugin);
        let registry = PluginRegistry::new();
        registry.register(plugin.clone());

        let cluster = Arc::new(FakeClusterReader::default());
        let events = Arc::new(FakeRecorder::default());
        let mount_util = Arc::new(FakeMountUtility::default());
        let block_util = Arc::new(FakeBlockDev::default());

        let generator = OperationGenerator::new(
            Arc::new(registry),
            cluster.clone(),
            events.clone(),
            mount_util.clone(),
            block_util.clone(),
            config,
        );
        let metrics = generator.metrics();

        Self {
            plugin,
            generator,
            state: Arc::new(FakeActualState::default()),
            cluster,
            events,
            mount_util,
            block_util,
            metrics,
        }
    }

    pub fn executor(&self) -> Arc<OperationExecutor> {
        OperationExecutor::new(self.generator.clone())
    }

    pub fn plugin_calls(&self) -> Vec<String> {
        self.plugin.calls()
    }

    fn unique_name(&self, name: &str) -> UniqueVolumeName {
        UniqueVolumeName::compose(self.plugin.name(), name)
    }

    pub fn volume_to_attach(&self, name: &str, pods: &[&str]) -> VolumeToAttach {
        VolumeToAttach {
            volume_name: self.unique_name(name),
            volume_spec: spec_with_capacity(name, "1Gi"),
            node_name: "node-a".into(),
            scheduled_pods: pods
                .iter()
                .map(|p| ObjectReference {
                    kind: Some("Pod".into()),
                    name: Some(p.to_string()),
                    namespace: Some("default".into()),
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn volume_to_mount(&self, name: &str, pod_uid: &str, attachable: bool) -> VolumeToMount {
        VolumeToMount {
            volume_name: self.unique_name(name),
            volume_spec: spec_with_capacity(name, "1Gi"),
            volume_mode: VolumeMode::Filesystem,
            pod_name: PodName::new("default", format!("pod-{}", pod_uid)),
            pod_uid: PodUid::from(pod_uid),
            pod_ref: ObjectReference {
                kind: Some("Pod".into()),
                name: Some(format!("pod-{}", pod_uid)),
                namespace: Some("default".into()),
                ..Default::default()
            },
            node_name: "node-a".into(),
            plugin_is_attachable: attachable,
            device_path: None,
            reported_in_use: true,
            remount: false,
            desired_size: None,
            claim: Some(ClaimRef {
                namespace: "default".into(),
                name: "claim-1".into(),
            }),
        }
    }

    pub fn mounted_volume(&self, name: &str, pod_uid: &str) -> MountedVolume {
        MountedVolume {
            volume_name: self.unique_name(name),
            volume_spec: Some(spec_with_capacity(name, "1Gi")),
            volume_mode: VolumeMode::Filesystem,
            plugin_name: self.plugin.name().to_string(),
            inner_volume_name: name.to_string(),
            pod_name: PodName::new("default", format!("pod-{}", pod_uid)),
            pod_uid: PodUid::from(pod_uid),
            plugin_is_attachable: true,
        }
    }

    pub fn attached_volume(&self, name: &str) -> AttachedVolume {
        AttachedVolume {
            volume_name: self.unique_name(name),
            volume_spec: Some(spec_with_capacity(name, "1Gi")),
            node_name: "node-a".into(),
            device_path: format!("/dev/fake/{}", name),
            plugin_is_attachable: true,
        }
    }

    pub fn volume_to_expand(&self, name: &str, current: &str, requested: &str) -> VolumeToExpand {
        VolumeToExpand {
            volume_name: self.unique_name(name),
            volume_spec: spec_with_capacity(name, current),
            claim: ClaimRef {
                namespace: "default".into(),
                name: "claim-1".into(),
            },
            new_size: Quantity(requested.to_string()),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
