//! Block volume map, unmap, and unmap-device operation builders
//!
//! Raw block volumes follow the mount lifecycle with symlinks in place of
//! filesystem mounts: the device is prepared once per node under a global
//! map path, each pod gets a symlink, and a file-descriptor lock pins the
//! backing device while any pod references it.

use crate::domain::{reasons, ActualStateUpdaterRef};
use crate::error::{Error, OperationFailure};
use crate::executor::{GeneratedOperation, OperationKind};
use crate::generator::OperationGenerator;
use crate::volume::{AttachedVolume, MountedVolume, VolumeToMount};
use tracing::{info, warn};

impl OperationGenerator {
    /// Map a block volume for a pod: prepare the device, publish the global
    /// symlink, lock the backing device, then publish into the pod.
    pub fn generate_map(
        &self,
        volume: VolumeToMount,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let plugin = self.plugins.find_plugin_by_spec(&volume.volume_spec)?;
        let block = plugin
            .clone()
            .as_block()
            .ok_or_else(|| Error::PluginNotBlockCapable {
                plugin_name: plugin.name().to_string(),
            })?;
        let mapper = block.new_mapper(&volume.volume_spec, &volume.pod_name, &volume.pod_uid)?;
        let attachable = if volume.plugin_is_attachable {
            Some(
                plugin
                    .clone()
                    .as_attachable()
                    .ok_or_else(|| Error::PluginNotAttachable {
                        plugin_name: plugin.name().to_string(),
                    })?,
            )
        } else {
            None
        };

        let block_util = self.block_util.clone();
        let wait_timeout = self.config.wait_for_attach_timeout;
        let event_recorder =
            self.pod_event_recorder(volume.pod_ref.clone(), reasons::FAILED_MAP_VOLUME);

        let operation = Box::pin(async move {
            let volume_name = volume.volume_name.clone();
            let pod_uid = volume.pod_uid.clone();
            let spec = &volume.volume_spec;

            if let Some(attachable) = &attachable {
                attachable
                    .wait_for_attach(spec, volume.device_path.as_deref(), wait_timeout)
                    .await
                    .map_err(|err| {
                        OperationFailure::visible(
                            format!("MapVolume.WaitForAttach failed for volume {}", volume_name),
                            err,
                        )
                    })?;
            }

            let device_path = mapper.set_up_device().await.map_err(|err| {
                OperationFailure::visible(
                    format!("MapVolume.SetUpDevice failed for volume {}", volume_name),
                    err,
                )
            })?;

            // File-backed volumes surface through a loop device so pods see
            // a real block node; passthrough for devices that already are.
            let device_path = block_util
                .attach_loop_device(&device_path)
                .await
                .map_err(OperationFailure::silent)?;

            let global_map_path = block
                .get_global_map_path(spec)
                .await
                .map_err(OperationFailure::silent)?;

            state
                .mark_device_mounted(
                    &volume_name,
                    &device_path,
                    &global_map_path.to_string_lossy(),
                )
                .map_err(OperationFailure::silent)?;

            block_util
                .map_device(&device_path, &global_map_path, pod_uid.as_str())
                .await
                .map_err(|err| {
                    OperationFailure::visible(
                        format!("MapVolume.MapDevice failed for volume {}", volume_name),
                        err,
                    )
                })?;

            // Lock after mapping: the symlink now pins which device the pods
            // will see, and the fd lock keeps the kernel from reusing it.
            block_util
                .lock_device(&device_path)
                .await
                .map_err(OperationFailure::silent)?;

            mapper.map_pod_device().await.map_err(|err| {
                OperationFailure::visible(
                    format!("MapVolume.MapPodDevice failed for volume {}", volume_name),
                    err,
                )
            })?;

            state
                .mark_volume_mounted(&volume_name, &pod_uid)
                .map_err(OperationFailure::silent)?;

            info!(volume = %volume_name, pod = %volume.pod_name, device = %device_path, "mapped block volume");
            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::Map,
            operation,
            event_recorder: Some(event_recorder),
            complete: None,
        })
    }

    /// Unmap a block volume from a pod. Bookkeeping failure after a
    /// successful unmap is logged only, mirroring unmount.
    pub fn generate_unmap(
        &self,
        volume: MountedVolume,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let plugin = match &volume.volume_spec {
            Some(spec) => self.plugins.find_plugin_by_spec(spec)?,
            None => self.plugins.find_plugin_by_name(&volume.plugin_name)?,
        };
        let block = plugin
            .clone()
            .as_block()
            .ok_or_else(|| Error::PluginNotBlockCapable {
                plugin_name: plugin.name().to_string(),
            })?;
        let unmapper = block.new_unmapper(&volume.inner_volume_name, &volume.pod_uid)?;

        let operation = Box::pin(async move {
            let MountedVolume {
                volume_name,
                pod_name,
                pod_uid,
                ..
            } = volume;

            unmapper.unmap_pod_device().await.map_err(|err| {
                OperationFailure::visible(
                    format!("UnmapVolume.UnmapPodDevice failed for volume {}", volume_name),
                    err,
                )
            })?;

            if let Err(err) = state.mark_volume_unmounted(&volume_name, &pod_uid) {
                warn!(
                    volume = %volume_name,
                    pod = %pod_name,
                    error = %err,
                    "unmap succeeded but marking unmapped failed"
                );
            }

            info!(volume = %volume_name, pod = %pod_name, "unmapped block volume");
            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::Unmap,
            operation,
            event_recorder: None,
            complete: None,
        })
    }

    /// Tear down a block volume's global map path: only once no pod-scoped
    /// symlink references remain, release the fd lock, detach the loop
    /// device, and remove the map path.
    pub fn generate_unmap_device(
        &self,
        volume: AttachedVolume,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let spec = volume.volume_spec.clone().ok_or_else(|| {
            Error::Internal(format!(
                "unmap-device requires a volume spec for {}",
                volume.volume_name
            ))
        })?;
        let plugin = self.plugins.find_plugin_by_spec(&spec)?;
        let block = plugin
            .clone()
            .as_block()
            .ok_or_else(|| Error::PluginNotBlockCapable {
                plugin_name: plugin.name().to_string(),
            })?;
        let (inner_volume_name, pod_uid) = (spec.name.clone(), crate::volume::PodUid("".into()));
        let unmapper = block.new_unmapper(&inner_volume_name, &pod_uid)?;
        let block_util = self.block_util.clone();
        let mount_util = self.mount_util.clone();

        let operation = Box::pin(async move {
            let AttachedVolume {
                volume_name,
                device_path,
                ..
            } = volume;

            let global_map_path = block
                .get_global_map_path(&spec)
                .await
                .map_err(OperationFailure::silent)?;

            let refs = block_util
                .get_device_symlink_refs(&device_path, &global_map_path)
                .await
                .map_err(OperationFailure::silent)?;
            if !refs.is_empty() {
                return Err(OperationFailure::silent(Error::GlobalMountStillReferenced {
                    volume_name: volume_name.to_string(),
                    ref_count: refs.len(),
                }));
            }

            unmapper
                .tear_down_device(&device_path)
                .await
                .map_err(OperationFailure::silent)?;

            block_util
                .unlock_device(&device_path)
                .await
                .map_err(OperationFailure::silent)?;
            block_util
                .remove_loop_device(&device_path)
                .await
                .map_err(OperationFailure::silent)?;
            block_util
                .remove_map_path(&global_map_path)
                .await
                .map_err(OperationFailure::silent)?;

            // Same busy check as the filesystem path before the device is
            // released for detach.
            if !device_path.is_empty() {
                let opened = mount_util
                    .device_opened(&device_path)
                    .await
                    .map_err(OperationFailure::silent)?;
                if opened {
                    return Err(OperationFailure::silent(Error::DeviceStillOpen {
                        device_path,
                    }));
                }
            }

            state
                .mark_device_unmounted(&volume_name)
                .map_err(OperationFailure::silent)?;

            info!(volume = %volume_name, "tore down block volume global map path");
            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::UnmapDevice,
            operation,
            event_recorder: None,
            complete: None,
        })
    }
}
