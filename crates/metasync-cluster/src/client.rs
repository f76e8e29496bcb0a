//! Collaborator interfaces.
//!
//! Transport to the cluster manager, the host inventory, the per-cluster
//! custom-resource API and the pipeline provisioning service lives
//! outside this crate. Reconcilers only see these traits.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use metasync_core::ResourceConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::ClusterConnection;
use crate::error::ResourceError;
use crate::region::{HostQuery, HostRecord};
use crate::resource::CustomResource;

/// Kubernetes object kinds fetched from the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Node,
    Endpoints,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Node => "Node",
            ResourceKind::Endpoints => "Endpoints",
        }
    }
}

/// Cluster object storage and host (CMDB) lookups.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Raw objects of `kind` in a cluster, restricted to `fields`.
    async fn fetch_resources(
        &self,
        cluster_id: &str,
        kind: ResourceKind,
        fields: &[&str],
    ) -> anyhow::Result<Vec<Value>>;

    async fn lookup_hosts(&self, query: &HostQuery) -> anyhow::Result<Vec<HostRecord>>;
}

/// Data-id custom resources in one cluster.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch by name. A missing object is [`ResourceError::NotFound`].
    async fn get(&self, name: &str) -> Result<CustomResource, ResourceError>;

    async fn list(&self) -> Result<Vec<CustomResource>, ResourceError>;

    async fn create(&self, resource: &CustomResource) -> Result<CustomResource, ResourceError>;

    /// Replace an object. The resource must carry the observed `resourceVersion`.
    async fn update(&self, resource: &CustomResource) -> Result<CustomResource, ResourceError>;
}

/// Opens a [`ResourceStore`] against a cluster.
pub trait ResourceStoreFactory: Send + Sync {
    fn for_cluster(
        &self,
        connection: &ClusterConnection,
        resource: &ResourceConfig,
    ) -> anyhow::Result<Arc<dyn ResourceStore>>;
}

/// Kind of custom report group backing a data id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportGroupKind {
    TimeSeriesGroup,
    EventGroup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSourceRequest {
    pub data_name: String,
    pub etl_config: String,
    pub operator: String,
    pub source_system: String,
    pub mq_cluster_id: u32,
    pub type_label: String,
    pub transfer_cluster_id: String,
    pub source_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomGroupRequest {
    pub kind: ReportGroupKind,
    pub bk_data_id: u32,
    pub bk_biz_id: i64,
    pub group_name: String,
    pub label: String,
    pub operator: String,
    pub is_split_measurement: bool,
    pub default_storage_config: Value,
    pub additional_options: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomGroup {
    pub bk_data_id: u32,
    pub group_name: String,
}

/// Ingestion pipeline provisioning.
#[async_trait]
pub trait PipelineProvisioner: Send + Sync {
    /// Create a data source and return its data id.
    async fn create_data_source(&self, request: &DataSourceRequest) -> anyhow::Result<u32>;

    async fn create_custom_group(&self, request: &CustomGroupRequest)
    -> anyhow::Result<CustomGroup>;
}

/// The cluster manager's cluster listing.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    async fn fetch_clusters(&self) -> anyhow::Result<Vec<Value>>;
}
