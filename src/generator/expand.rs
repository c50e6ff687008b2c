//! Volume expansion operation builder

use crate::domain::ActualStateUpdaterRef;
use crate::error::{Error, OperationFailure};
use crate::executor::{GeneratedOperation, OperationKind};
use crate::generator::OperationGenerator;
use crate::volume::{compare_quantities, VolumeToExpand};
use std::cmp::Ordering;
use tracing::{debug, info};

impl OperationGenerator {
    /// Grow a volume's provisioned capacity.
    ///
    /// The backend is invoked only when the requested size strictly exceeds
    /// the current PV capacity. The realized capacity is persisted to the
    /// claim status before any progress marking, so a crash between the two
    /// re-runs at most the cheap status patch. Plugins that additionally
    /// need a filesystem-level resize get that step deferred to the next
    /// mount cycle, where the device is guaranteed mounted.
    pub fn generate_expand(
        &self,
        volume: VolumeToExpand,
        state: ActualStateUpdaterRef,
    ) -> crate::error::Result<GeneratedOperation> {
        let plugin = self.plugins.find_plugin_by_spec(&volume.volume_spec)?;
        let expandable = plugin
            .clone()
            .as_expandable()
            .ok_or_else(|| Error::PluginNotExpandable {
                plugin_name: plugin.name().to_string(),
            })?;
        let cluster = self.cluster.clone();

        let operation = Box::pin(async move {
            let VolumeToExpand {
                volume_name,
                volume_spec,
                claim,
                new_size,
            } = volume;

            let current = volume_spec.capacity().cloned().ok_or_else(|| {
                OperationFailure::silent(Error::CapacityParse(format!(
                    "volume {} has no recorded capacity",
                    volume_name
                )))
            })?;

            match compare_quantities(&new_size, &current).map_err(OperationFailure::silent)? {
                Ordering::Greater => {}
                _ => {
                    debug!(
                        volume = %volume_name,
                        requested = %new_size.0,
                        current = %current.0,
                        "no expansion required"
                    );
                    return Ok(());
                }
            }

            let realized = expandable
                .expand(&volume_spec, &new_size, &current)
                .await
                .map_err(|err| {
                    OperationFailure::visible(
                        format!("ExpandVolume.Expand failed for volume {}", volume_name),
                        err,
                    )
                })?;

            cluster
                .patch_pvc_status_capacity(&claim.namespace, &claim.name, realized.clone())
                .await
                .map_err(OperationFailure::silent)?;

            if expandable.requires_fs_resize() {
                state
                    .mark_fs_resize_required(&volume_name)
                    .map_err(OperationFailure::silent)?;
                info!(
                    volume = %volume_name,
                    new_size = %realized.0,
                    "expanded volume, filesystem resize deferred to next mount"
                );
            } else {
                info!(volume = %volume_name, new_size = %realized.0, "expanded volume");
            }

            Ok(())
        });

        Ok(GeneratedOperation {
            kind: OperationKind::Expand,
            operation,
            event_recorder: None,
            complete: None,
        })
    }
}
