//! Attachment verification operation builders

use crate::domain::{ActualStateUpdaterRef, AttachablePluginRef};
use crate::error::{Error, OperationFailure};
use crate::executor::{GeneratedOperation, OperationKind};
use crate::generator::OperationGenerator;
use crate::volume::{AttachedVolume, VolumeSpec, VolumeToMount};
use std::collections::HashMap;
use tracing::{debug, info, warn};

impl OperationGenerator {
    /// Confirm the attach/detach controller has attached a volume before the
    /// first mount.
    ///
    /// Non-attachable plugins have no controller round-trip to wait for, so
    /// they are marked attached unconditionally. Attachable plugins must
    /// first appear in the node's own in-use list (a deliberate wait on the
    /// node's periodic status push, hence a retryable failure) and then in
    /// its attached-volumes list, which carries the device path.
    pub fn generate_verify_controller_attached(
        &self,
        volume: VolumeToMount,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        // resolve eagerly so an unknown plugin fails generation
        let _plugin = self.plugins.find_plugin_by_spec(&volume.volume_spec)?;
        let cluster = self.cluster.clone();

        let operation = Box::pin(async move {
            let VolumeToMount {
                volume_name,
                node_name,
                plugin_is_attachable,
                ..
            } = volume;

            if !plugin_is_attachable {
                state
                    .mark_volume_attached(&volume_name, &node_name, "")
                    .map_err(OperationFailure::silent)?;
                debug!(volume = %volume_name, "non-attachable volume marked attached");
                return Ok(());
            }

            let node = cluster.get_node(&node_name).await.map_err(|err| {
                OperationFailure::silent(Error::NodeStatusUnavailable {
                    node_name: node_name.clone(),
                    reason: err.to_string(),
                })
            })?;
            let status = node.status.unwrap_or_default();

            let in_use = status.volumes_in_use.unwrap_or_default();
            if !in_use.iter().any(|v| v == volume_name.as_str()) {
                return Err(OperationFailure::silent(Error::VolumeNotInUse {
                    volume_name: volume_name.to_string(),
                    node_name,
                }));
            }

            let attached = status.volumes_attached.unwrap_or_default();
            match attached.iter().find(|av| av.name == volume_name.as_str()) {
                Some(av) => {
                    state
                        .mark_volume_attached(&volume_name, &node_name, &av.device_path)
                        .map_err(OperationFailure::silent)?;
                    info!(
                        volume = %volume_name,
                        node = %node_name,
                        device = %av.device_path,
                        "controller attach verified"
                    );
                    Ok(())
                }
                None => Err(OperationFailure::silent(Error::VolumeNotAttached {
                    volume_name: volume_name.to_string(),
                    node_name,
                })),
            }
        });

        Ok(GeneratedOperation {
            kind: OperationKind::VerifyControllerAttached,
            operation,
            event_recorder: None,
            complete: None,
        })
    }

    /// Batch-verify attachment for many volumes in one backend call per
    /// plugin.
    ///
    /// Volumes the backend reports as gone are marked detached. A failed
    /// batch call leaves every volume in that batch untouched: attachment
    /// state is never mass-dropped on a transient verification error.
    pub fn generate_volumes_are_attached(
        &self,
        node_name: &str,
        volumes: Vec<AttachedVolume>,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        // Group by plugin. Volumes whose plugin can no longer be resolved
        // are skipped with a log line rather than failing the sweep.
        let mut groups: HashMap<String, (AttachablePluginRef, Vec<AttachedVolume>)> =
            HashMap::new();
        for volume in volumes {
            let spec = match &volume.volume_spec {
                Some(spec) => spec,
                None => {
                    warn!(volume = %volume.volume_name, "skipping bulk verify, no spec");
                    continue;
                }
            };
            let attachable = match self.attachable_for(spec) {
                Ok((_, attachable)) => attachable,
                Err(err) => {
                    warn!(volume = %volume.volume_name, error = %err, "skipping bulk verify");
                    continue;
                }
            };
            let plugin_name = match volume.volume_name.split() {
                Ok((plugin, _)) => plugin,
                Err(_) => spec.name.clone(),
            };
            groups
                .entry(plugin_name)
                .or_insert_with(|| (attachable, Vec::new()))
                .1
                .push(volume);
        }
        let node_name = node_name.to_string();

        let operation = Box::pin(async move {
            let checks = groups.into_iter().map(|(plugin_name, (attachable, volumes))| {
                let node_name = node_name.clone();
                let state = state.clone();
                async move {
                    let specs: Vec<VolumeSpec> = volumes
                        .iter()
                        .filter_map(|v| v.volume_spec.clone())
                        .collect();
                    match attachable.volumes_are_attached(&specs, &node_name).await {
                        Ok(statuses) => {
                            for volume in &volumes {
                                let spec_name = volume
                                    .volume_spec
                                    .as_ref()
                                    .map(|s| s.name.as_str())
                                    .unwrap_or_default();
                                if statuses.get(spec_name).copied() == Some(false) {
                                    info!(
                                        volume = %volume.volume_name,
                                        node = %node_name,
                                        "backend reports volume no longer attached"
                                    );
                                    if let Err(err) = state
                                        .mark_volume_detached(&volume.volume_name, &node_name)
                                    {
                                        warn!(
                                            volume = %volume.volume_name,
                                            error = %err,
                                            "failed to mark verified-gone volume detached"
                                        );
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            // fail open: a broken sweep must not look like a
                            // mass detach
                            warn!(
                                plugin = %plugin_name,
                                node = %node_name,
                                error = %err,
                                "bulk attachment verification failed, leaving state untouched"
                            );
                        }
                    }
                }
            });
            futures::future::join_all(checks).await;
            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::VerifyVolumesAttached,
            operation,
            event_recorder: None,
            complete: None,
        })
    }
}
