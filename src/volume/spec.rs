//! Volume specs and stable identifiers
//!
//! A [`VolumeSpec`] is the immutable description of a volume from which the
//! responsible plugin is resolved. A [`UniqueVolumeName`] is the stable
//! `plugin-name/volume-name` identifier used as the primary exclusivity key
//! for attach, detach, and device-level operations.

use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{Node, PersistentVolume};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Identifiers
// =============================================================================

/// Stable identifier for a volume, unique across the node's attach domain.
///
/// Canonical form is `{plugin_name}/{volume_name}`. The composed form can be
/// split back into its parts, which is how detach resolves the plugin when
/// the volume spec is no longer available after a controller restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueVolumeName(pub String);

impl UniqueVolumeName {
    /// Compose the canonical name from plugin name and volume name
    pub fn compose(plugin_name: &str, volume_name: &str) -> Self {
        Self(format!("{}/{}", plugin_name, volume_name))
    }

    /// Split the canonical name back into (plugin_name, volume_name).
    ///
    /// The plugin name itself may contain `/` (e.g. `kubernetes.io/csi`), so
    /// the split is on the last separator.
    pub fn split(&self) -> Result<(String, String)> {
        match self.0.rsplit_once('/') {
            Some((plugin, volume)) if !plugin.is_empty() && !volume.is_empty() => {
                Ok((plugin.to_string(), volume.to_string()))
            }
            _ => Err(Error::MalformedVolumeName {
                name: self.0.clone(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UniqueVolumeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UniqueVolumeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UniqueVolumeName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Pod UID, the per-pod component of pod-scoped exclusivity keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodUid(pub String);

impl PodUid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PodUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PodUid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Namespaced pod name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodName {
    pub namespace: String,
    pub name: String,
}

impl PodName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// Volume Spec
// =============================================================================

/// How the volume is consumed by pods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeMode {
    /// Exposed as a mounted filesystem
    Filesystem,
    /// Exposed as a raw block device
    Block,
}

impl std::fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeMode::Filesystem => write!(f, "filesystem"),
            VolumeMode::Block => write!(f, "block"),
        }
    }
}

/// Inline (pod-defined) volume source for volumes without a backing PV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineVolumeSource {
    /// Plugin responsible for this source
    pub plugin_name: String,
    /// Opaque source parameters interpreted by the plugin
    pub parameters: BTreeMap<String, String>,
}

/// Immutable description of a volume.
///
/// Exactly one of `persistent_volume` / `inline` is set. The spec determines
/// the applicable plugin and never changes over the life of a request record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Volume name as known to the plugin
    pub name: String,
    /// Backing PersistentVolume, when cluster-managed
    pub persistent_volume: Option<PersistentVolume>,
    /// Inline source, when pod-defined
    pub inline: Option<InlineVolumeSource>,
    /// Whether the volume is consumed read-only
    pub read_only: bool,
}

impl VolumeSpec {
    /// Spec backed by a PersistentVolume
    pub fn from_persistent_volume(name: impl Into<String>, pv: PersistentVolume) -> Self {
        Self {
            name: name.into(),
            persistent_volume: Some(pv),
            inline: None,
            read_only: false,
        }
    }

    /// Spec backed by an inline source
    pub fn from_inline(name: impl Into<String>, source: InlineVolumeSource) -> Self {
        Self {
            name: name.into(),
            persistent_volume: None,
            inline: Some(source),
            read_only: false,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent_volume.is_some()
    }

    /// Current provisioned capacity (the PV's `storage` resource), if any
    pub fn capacity(&self) -> Option<&Quantity> {
        self.persistent_volume
            .as_ref()?
            .spec
            .as_ref()?
            .capacity
            .as_ref()?
            .get("storage")
    }

    /// Mount options requested on the backing PV
    pub fn mount_options(&self) -> Vec<String> {
        self.persistent_volume
            .as_ref()
            .and_then(|pv| pv.spec.as_ref())
            .and_then(|s| s.mount_options.clone())
            .unwrap_or_default()
    }

    /// Validate the PV's node affinity against a node's labels.
    ///
    /// Terms are ORed; match expressions within a term are ANDed. Only label
    /// expressions are evaluated (field selectors are the scheduler's
    /// concern). A spec without affinity matches every node.
    pub fn check_node_affinity(&self, node: &Node) -> Result<()> {
        let required = match self
            .persistent_volume
            .as_ref()
            .and_then(|pv| pv.spec.as_ref())
            .and_then(|s| s.node_affinity.as_ref())
            .and_then(|na| na.required.as_ref())
        {
            Some(selector) => selector,
            None => return Ok(()),
        };

        let empty = BTreeMap::new();
        let labels = node.metadata.labels.as_ref().unwrap_or(&empty);
        let node_name = node.metadata.name.clone().unwrap_or_default();

        for term in &required.node_selector_terms {
            let expressions = match &term.match_expressions {
                Some(exprs) => exprs,
                None => continue,
            };
            if expressions.iter().all(|req| {
                let value = labels.get(&req.key);
                let values = req.values.as_deref().unwrap_or(&[]);
                match req.operator.as_str() {
                    "In" => value.is_some_and(|v| values.iter().any(|want| want == v)),
                    "NotIn" => value.is_none_or(|v| !values.iter().any(|want| want == v)),
                    "Exists" => value.is_some(),
                    "DoesNotExist" => value.is_none(),
                    _ => false,
                }
            }) {
                return Ok(());
            }
        }

        Err(Error::NodeAffinityMismatch {
            volume_name: self.name.clone(),
            node_name,
            detail: "no node selector term matched node labels".into(),
        })
    }
}
