//! Mount, unmount, and unmount-device operation builders

use crate::domain::{reasons, ActualStateUpdaterRef};
use crate::error::{Error, OperationFailure};
use crate::executor::{GeneratedOperation, OperationKind};
use crate::generator::OperationGenerator;
use crate::volume::{compare_quantities, AttachedVolume, MountedVolume, VolumeToMount};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

impl OperationGenerator {
    /// Mount a volume for a pod: affinity and mount-option validation, the
    /// node-global device mount for attachable plugins (with the bounded
    /// wait for the attach to land), the conditional filesystem resize, and
    /// finally the per-pod setup.
    ///
    /// A remount runs the identical path; only log verbosity differs. The
    /// per-pod setup call is idempotent by plugin contract.
    pub fn generate_mount(
        &self,
        volume: VolumeToMount,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let plugin = self.plugins.find_plugin_by_spec(&volume.volume_spec)?;
        for option in volume.volume_spec.mount_options() {
            if !plugin.supports_mount_option(&option) {
                return Err(Error::UnsupportedMountOption {
                    plugin_name: plugin.name().to_string(),
                    option,
                });
            }
        }
        let mounter = plugin.new_mounter(&volume.volume_spec, &volume.pod_name, &volume.pod_uid)?;
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

        let cluster = self.cluster.clone();
        let mount_util = self.mount_util.clone();
        let expand_fs_on_mount = self.config.expand_fs_on_mount;
        let wait_timeout = self.config.wait_for_attach_timeout;
        let event_recorder =
            self.pod_event_recorder(volume.pod_ref.clone(), reasons::FAILED_MOUNT_VOLUME);

        let operation = Box::pin(async move {
            let volume_name = volume.volume_name.clone();
            let pod_uid = volume.pod_uid.clone();
            let spec = &volume.volume_spec;

            if volume.remount {
                debug!(volume = %volume_name, pod = %volume.pod_name, "remounting volume");
            } else {
                info!(volume = %volume_name, pod = %volume.pod_name, "mounting volume");
            }

            let node = cluster
                .get_node(&volume.node_name)
                .await
                .map_err(OperationFailure::silent)?;
            spec.check_node_affinity(&node).map_err(|err| {
                OperationFailure::visible(
                    format!("MountVolume.NodeAffinity check failed for volume {}", volume_name),
                    err,
                )
            })?;

            if let Some(attachable) = &attachable {
                let device_path = attachable
                    .wait_for_attach(spec, volume.device_path.as_deref(), wait_timeout)
                    .await
                    .map_err(|err| {
                        OperationFailure::visible(
                            format!("MountVolume.WaitForAttach failed for volume {}", volume_name),
                            err,
                        )
                    })?;

                let device_mount_path =
                    attachable.get_device_mount_path(spec).await.map_err(|err| {
                        OperationFailure::visible(
                            format!(
                                "MountVolume.GetDeviceMountPath failed for volume {}",
                                volume_name
                            ),
                            err,
                        )
                    })?;

                attachable
                    .mount_device(spec, &device_path, &device_mount_path)
                    .await
                    .map_err(|err| {
                        OperationFailure::visible(
                            format!("MountVolume.MountDevice failed for volume {}", volume_name),
                            err,
                        )
                    })?;

                state
                    .mark_device_mounted(&volume_name, &device_path, &device_mount_path)
                    .map_err(OperationFailure::silent)?;

                if expand_fs_on_mount {
                    expand_filesystem_if_needed(
                        &cluster,
                        &mount_util,
                        &volume,
                        &device_path,
                        &device_mount_path,
                    )
                    .await?;
                }
            }

            mounter.set_up().await.map_err(|err| {
                OperationFailure::visible(
                    format!("MountVolume.SetUp failed for volume {}", volume_name),
                    err,
                )
            })?;

            state
                .mark_volume_mounted(&volume_name, &pod_uid)
                .map_err(OperationFailure::silent)?;

            if volume.remount {
                debug!(volume = %volume_name, pod = %volume.pod_name, "remounted volume");
            } else {
                info!(volume = %volume_name, pod = %volume.pod_name, "mounted volume");
            }
            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::Mount,
            operation,
            event_recorder: Some(event_recorder),
            complete: None,
        })
    }

    /// Unmount a volume from a pod: sub-path bind mounts first, then plugin
    /// teardown. A failed state update after a successful teardown is
    /// logged only; re-running would repeat completed physical work.
    pub fn generate_unmount(
        &self,
        volume: MountedVolume,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let plugin = match &volume.volume_spec {
            Some(spec) => self.plugins.find_plugin_by_spec(spec)?,
            None => self.plugins.find_plugin_by_name(&volume.plugin_name)?,
        };
        let unmounter = plugin.new_unmounter(&volume.inner_volume_name, &volume.pod_uid)?;
        let mount_util = self.mount_util.clone();

        let operation = Box::pin(async move {
            let MountedVolume {
                volume_name,
                pod_name,
                pod_uid,
                ..
            } = volume;

            mount_util
                .clean_subpaths(&volume_name, &pod_uid)
                .await
                .map_err(|err| {
                    OperationFailure::visible(
                        format!("UnmountVolume.CleanSubPaths failed for volume {}", volume_name),
                        err,
                    )
                })?;

            unmounter.tear_down().await.map_err(|err| {
                OperationFailure::visible(
                    format!("UnmountVolume.TearDown failed for volume {}", volume_name),
                    err,
                )
            })?;

            if let Err(err) = state.mark_volume_unmounted(&volume_name, &pod_uid) {
                warn!(
                    volume = %volume_name,
                    pod = %pod_name,
                    error = %err,
                    "tear down succeeded but marking unmounted failed"
                );
            }

            info!(volume = %volume_name, pod = %pod_name, "unmounted volume");
            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::Unmount,
            operation,
            event_recorder: None,
            complete: None,
        })
    }

    /// Unmount the node-global device mount once no pod references remain.
    ///
    /// The shared device is refused teardown while other mount references
    /// exist, and after the plugin call the OS-level open state is
    /// re-checked: a device still open elsewhere stays marked mounted and
    /// the error is retryable.
    pub fn generate_unmount_device(
        &self,
        volume: AttachedVolume,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let spec = volume.volume_spec.clone().ok_or_else(|| {
            Error::Internal(format!(
                "unmount-device requires a volume spec for {}",
                volume.volume_name
            ))
        })?;
        let (_, attachable) = self.attachable_for(&spec)?;
        let mount_util = self.mount_util.clone();

        let operation = Box::pin(async move {
            let AttachedVolume {
                volume_name,
                device_path,
                ..
            } = volume;

            let device_mount_path = attachable
                .get_device_mount_path(&spec)
                .await
                .map_err(OperationFailure::silent)?;

            let refs = mount_util
                .get_device_mount_refs(&device_mount_path)
                .await
                .map_err(OperationFailure::silent)?;
            if !refs.is_empty() {
                return Err(OperationFailure::silent(Error::GlobalMountStillReferenced {
                    volume_name: volume_name.to_string(),
                    ref_count: refs.len(),
                }));
            }

            attachable
                .unmount_device(&device_mount_path)
                .await
                .map_err(OperationFailure::silent)?;

            // The plugin reported success; confirm the kernel agrees before
            // releasing the device for detach.
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

            info!(volume = %volume_name, "unmounted device");
            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::UnmountDevice,
            operation,
            event_recorder: None,
            complete: None,
        })
    }
}

/// Mount-time filesystem resize gate: feature flag already checked by the
/// caller; skips read-only volumes and anything not strictly growing, and
/// patches the claim status afterwards so the resize is not repeated.
async fn expand_filesystem_if_needed(
    cluster: &crate::domain::ClusterReaderRef,
    mount_util: &crate::domain::MountUtilityRef,
    volume: &VolumeToMount,
    device_path: &str,
    device_mount_path: &str,
) -> crate::error::OperationResult {
    let volume_name = &volume.volume_name;

    if volume.volume_spec.read_only {
        debug!(volume = %volume_name, "skipping filesystem resize for read-only volume");
        return Ok(());
    }
    let (desired, claim) = match (&volume.desired_size, &volume.claim) {
        (Some(desired), Some(claim)) => (desired, claim),
        _ => return Ok(()),
    };

    let pvc = cluster
        .get_pvc(&claim.namespace, &claim.name)
        .await
        .map_err(OperationFailure::silent)?;
    let current = pvc
        .status
        .and_then(|s| s.capacity)
        .and_then(|mut c| c.remove("storage"));
    let current = match current {
        Some(current) => current,
        None => return Ok(()),
    };

    match compare_quantities(desired, &current).map_err(OperationFailure::silent)? {
        Ordering::Greater => {}
        _ => {
            debug!(volume = %volume_name, "filesystem already at requested size");
            return Ok(());
        }
    }

    mount_util
        .resize_fs(device_path, device_mount_path)
        .await
        .map_err(|err| {
            OperationFailure::visible(
                format!(
                    "MountVolume.resize_fs failed while expanding volume {}",
                    volume_name
                ),
                err,
            )
        })?;

    cluster
        .patch_pvc_status_capacity(&claim.namespace, &claim.name, desired.clone())
        .await
        .map_err(OperationFailure::silent)?;

    info!(volume = %volume_name, new_size = %desired.0, "expanded filesystem during mount");
    Ok(())
}
