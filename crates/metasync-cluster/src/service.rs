//! Cluster service: the operations the control plane exposes per cluster.
//!
//! Wires the metadata store, the configuration and the external
//! collaborators together so callers only deal with registrations.

use std::sync::Arc;

use chrono::Utc;
use metasync_core::ClusterConfig;
use metasync_state::{ClusterRegistration, MetadataStore};
use tracing::{debug, warn};

use crate::client::{ClusterManager, Inventory, PipelineProvisioner, ResourceStore, ResourceStoreFactory};
use crate::connection::ClusterConnection;
use crate::dataid::{self, ResourceSyncStats};
use crate::discovery::{self, DiscoveredCluster};
use crate::error::{ClusterResult, ResourceError};
use crate::region;
use crate::registration::{self, RegisterRequest};
use crate::topology::{self, K8sNode};

pub struct ClusterService<S> {
    store: S,
    config: ClusterConfig,
    inventory: Arc<dyn Inventory>,
    resources: Arc<dyn ResourceStoreFactory>,
    provisioner: Arc<dyn PipelineProvisioner>,
}

impl<S: MetadataStore> ClusterService<S> {
    pub fn new(
        store: S,
        config: ClusterConfig,
        inventory: Arc<dyn Inventory>,
        resources: Arc<dyn ResourceStoreFactory>,
        provisioner: Arc<dyn PipelineProvisioner>,
    ) -> Self {
        Self {
            store,
            config,
            inventory,
            resources,
            provisioner,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// All nodes of a cluster with their derived attributes.
    pub async fn fetch_node_list(&self, cluster_id: &str) -> ClusterResult<Vec<K8sNode>> {
        topology::fetch_node_list(&self.store, self.inventory.as_ref(), cluster_id, Utc::now()).await
    }

    /// Infer and persist the cloud id of a running cluster that has none.
    pub async fn update_cloud_id(&self, cluster: &ClusterRegistration) -> ClusterResult<Option<i64>> {
        if !cluster.needs_cloud_id() {
            return Ok(None);
        }
        let nodes = self.fetch_node_list(&cluster.cluster_id).await?;
        region::ensure_cloud_id(&self.store, self.inventory.as_ref(), cluster, &nodes).await
    }

    fn open_resources(&self, cluster: &ClusterRegistration) -> ClusterResult<Arc<dyn ResourceStore>> {
        let connection = ClusterConnection::for_cluster(cluster, &self.config.api_gateway_domain)?;
        debug!(cluster_id = %cluster.cluster_id, endpoint = %connection.endpoint, "opening resource client");
        let store = self
            .resources
            .for_cluster(&connection, &self.config.resource)
            .map_err(ResourceError::Api)?;
        Ok(store)
    }

    /// Periodic per-cluster reconciliation.
    ///
    /// Cloud id inference is best effort; its failure is logged and the
    /// data-id resources are still refreshed.
    pub async fn refresh_cluster_resource(
        &self,
        cluster: &ClusterRegistration,
    ) -> ClusterResult<ResourceSyncStats> {
        if let Err(e) = self.update_cloud_id(cluster).await {
            warn!(cluster_id = %cluster.cluster_id, error = %e, "cloud id inference failed");
        }
        let resources = self.open_resources(cluster)?;
        dataid::refresh_common_resources(&self.store, resources.as_ref(), cluster, &self.config).await
    }

    /// Push every data-id resource to a freshly registered cluster.
    pub async fn init_resources(&self, cluster: &ClusterRegistration) -> ClusterResult<ResourceSyncStats> {
        let resources = self.open_resources(cluster)?;
        dataid::init_resources(&self.store, resources.as_ref(), cluster, &self.config).await
    }

    pub async fn register_cluster(&self, request: &RegisterRequest) -> ClusterResult<ClusterRegistration> {
        registration::register_cluster(&self.store, self.provisioner.as_ref(), &self.config, request).await
    }

    pub async fn fetch_k8s_clusters(
        &self,
        manager: &dyn ClusterManager,
    ) -> ClusterResult<Vec<DiscoveredCluster>> {
        discovery::fetch_k8s_clusters(manager, &self.config).await
    }
}
