//! Cluster API read access
//!
//! The orchestrator needs three things from the cluster: Node objects (for
//! in-use/attached lists and affinity labels), PersistentVolumeClaim status
//! (realized capacity for the resize gates), and the ability to patch that
//! status once a resize lands. Everything else stays behind the external
//! watch/cache layer.

use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::sync::Arc;

/// Read/patch access to the cluster objects this core consults
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Fetch a Node by name
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// Fetch a PersistentVolumeClaim
    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim>;

    /// Patch the claim's status capacity after a successful resize
    async fn patch_pvc_status_capacity(
        &self,
        namespace: &str,
        name: &str,
        capacity: Quantity,
    ) -> Result<()>;
}

pub type ClusterReaderRef = Arc<dyn ClusterReader>;

// =============================================================================
// Kubernetes-Backed Reader
// =============================================================================

/// [`ClusterReader`] backed by a live API server connection
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn get_node(&self, name: &str) -> Result<Node> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes.get(name).await.map_err(|e| match e {
            kube::Error::Api(ref resp) if resp.code == 404 => Error::ResourceNotFound {
                kind: "Node".into(),
                name: name.into(),
            },
            other => Error::Kube(other),
        })
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        claims.get(name).await.map_err(|e| match e {
            kube::Error::Api(ref resp) if resp.code == 404 => Error::ResourceNotFound {
                kind: "PersistentVolumeClaim".into(),
                name: format!("{}/{}", namespace, name),
            },
            other => Error::Kube(other),
        })
    }

    async fn patch_pvc_status_capacity(
        &self,
        namespace: &str,
        name: &str,
        capacity: Quantity,
    ) -> Result<()> {
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "status": {
                "capacity": { "storage": capacity }
            }
        });
        claims
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
