//! Attach and detach operation builders

use crate::domain::{reasons, ActualStateUpdaterRef, EventLevel};
use crate::error::{Error, OperationFailure};
use crate::executor::{GeneratedOperation, OperationKind};
use crate::generator::OperationGenerator;
use crate::volume::{AttachedVolume, VolumeToAttach};
use tracing::{info, warn};

impl OperationGenerator {
    /// Attach the volume to the node and record the device path.
    ///
    /// A dangling attachment (the backend reports the volume attached
    /// somewhere unexpected) is still recorded in actual state at the
    /// reported location before the error is surfaced, so the reconciler
    /// can issue a compensating detach.
    pub fn generate_attach(
        &self,
        volume: VolumeToAttach,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let (_, attachable) = self.attachable_for(&volume.volume_spec)?;
        let recorder = self.recorder.clone();
        let event_recorder =
            self.pods_event_recorder(volume.scheduled_pods.clone(), reasons::FAILED_ATTACH_VOLUME);

        let operation = Box::pin(async move {
            let VolumeToAttach {
                volume_name,
                volume_spec,
                node_name,
                scheduled_pods,
            } = volume;

            match attachable.attach(&volume_spec, &node_name).await {
                Ok(device_path) => {
                    state
                        .mark_volume_attached(&volume_name, &node_name, &device_path)
                        .map_err(|err| {
                            OperationFailure::visible("AttachVolume.MarkVolumeAsAttached failed", err)
                        })?;

                    info!(
                        volume = %volume_name,
                        node = %node_name,
                        device = %device_path,
                        "attached volume"
                    );
                    let message = format!("AttachVolume.Attach succeeded for volume {}", volume_name);
                    for pod_ref in &scheduled_pods {
                        recorder.event(
                            pod_ref,
                            EventLevel::Normal,
                            reasons::SUCCESSFUL_ATTACH_VOLUME,
                            &message,
                        );
                    }
                    Ok(())
                }
                Err(Error::DanglingAttach {
                    volume_name: dangling_volume,
                    device_path,
                    current_node,
                }) => {
                    // Record the stale attachment where the backend reports
                    // it so a compensating detach becomes possible.
                    if let Err(err) =
                        state.mark_volume_attached(&volume_name, &current_node, &device_path)
                    {
                        warn!(
                            volume = %volume_name,
                            node = %current_node,
                            error = %err,
                            "failed to record dangling attachment"
                        );
                    }
                    Err(OperationFailure::visible(
                        format!("AttachVolume.Attach failed for volume {}", volume_name),
                        Error::DanglingAttach {
                            volume_name: dangling_volume,
                            device_path,
                            current_node,
                        },
                    ))
                }
                Err(err) => Err(OperationFailure::visible(
                    format!("AttachVolume.Attach failed for volume {}", volume_name),
                    err,
                )),
            }
        });

        Ok(GeneratedOperation {
            kind: OperationKind::Attach,
            operation,
            event_recorder: Some(event_recorder),
            complete: None,
        })
    }

    /// Detach the volume from the node.
    ///
    /// When the volume spec is gone (controller crash recovery), the plugin
    /// is recovered by splitting the unique volume name. With
    /// `verify_safe_to_detach`, the node's reported in-use list is honored
    /// fail-closed; an unfetchable node proceeds with a warning, since no
    /// signal beats a stale one.
    pub fn generate_detach(
        &self,
        volume: AttachedVolume,
        verify_safe_to_detach: bool,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let (attachable, volume_id) = match &volume.volume_spec {
            Some(spec) => {
                let (_, attachable) = self.attachable_for(spec)?;
                (attachable, spec.name.clone())
            }
            None => {
                let (plugin_name, volume_id) = volume.volume_name.split()?;
                let plugin = self.plugins.find_plugin_by_name(&plugin_name)?;
                let attachable =
                    plugin
                        .clone()
                        .as_attachable()
                        .ok_or(Error::PluginNotAttachable {
                            plugin_name,
                        })?;
                (attachable, volume_id)
            }
        };
        let cluster = self.cluster.clone();

        let operation = Box::pin(async move {
            let AttachedVolume {
                volume_name,
                node_name,
                ..
            } = volume;

            if verify_safe_to_detach {
                match cluster.get_node(&node_name).await {
                    Ok(node) => {
                        let in_use = node
                            .status
                            .and_then(|s| s.volumes_in_use)
                            .unwrap_or_default();
                        if in_use.iter().any(|v| v == volume_name.as_str()) {
                            return Err(OperationFailure::silent(Error::VolumeInUse {
                                volume_name: volume_name.to_string(),
                                node_name,
                            }));
                        }
                    }
                    Err(err) => {
                        warn!(
                            volume = %volume_name,
                            node = %node_name,
                            error = %err,
                            "could not fetch node to verify detach safety, proceeding"
                        );
                    }
                }
            }

            if let Err(err) = attachable.detach(&volume_id, &node_name).await {
                // Keep the node advertising the attachment so the detach is
                // retried instead of silently forgotten.
                if let Err(report_err) =
                    state.add_volume_to_report_as_attached(&volume_name, &node_name)
                {
                    warn!(
                        volume = %volume_name,
                        node = %node_name,
                        error = %report_err,
                        "failed to re-add volume to report-as-attached list"
                    );
                }
                return Err(OperationFailure::silent(err));
            }

            if let Err(err) = state.mark_volume_detached(&volume_name, &node_name) {
                // The physical detach already happened; rerunning it for the
                // sake of bookkeeping would be wrong.
                warn!(
                    volume = %volume_name,
                    node = %node_name,
                    error = %err,
                    "detach succeeded but marking detached failed"
                );
            }

            info!(volume = %volume_name, node = %node_name, "detached volume");
            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::Detach,
            operation,
            event_recorder: None,
            complete: None,
        })
    }
}
