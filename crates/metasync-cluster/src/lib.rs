//! metasync-cluster: reconciliation for externally managed Kubernetes clusters.
//!
//! Reads cluster topology through the inventory, infers a cluster's cloud
//! area by majority vote over its nodes, keeps the per-cluster `DataID`
//! custom resources in sync with the metadata store, and onboards new
//! clusters by provisioning their ingestion pipelines.
//!
//! # Architecture
//!
//! ```text
//! ClusterService<S: MetadataStore>
//!   ├── topology   Node + Endpoints docs ─▶ K8sNode (ip, roles, taints, status, counts)
//!   ├── region     node ips ─▶ host lookup (batches of 100) ─▶ majority cloud id
//!   │              └── write-once into ClusterRegistration.bk_cloud_id
//!   ├── dataid     usage catalog + replace rules ─▶ desired DataID resources
//!   │              └── resource: subset diff ─▶ create / update / no-op
//!   ├── registration  new row ─▶ data source + report group per usage ─▶ data ids
//!   └── discovery  cluster manager listing ─▶ DiscoveredCluster
//!
//! Collaborators (client.rs): Inventory, ResourceStore(Factory),
//! PipelineProvisioner, ClusterManager
//! ```

pub mod client;
pub mod connection;
pub mod dataid;
pub mod discovery;
pub mod error;
pub mod region;
pub mod registration;
pub mod resource;
pub mod service;
pub mod topology;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{
    ClusterManager, CustomGroup, CustomGroupRequest, DataSourceRequest, Inventory,
    PipelineProvisioner, ReportGroupKind, ResourceKind, ResourceStore, ResourceStoreFactory,
};
pub use connection::ClusterConnection;
pub use dataid::{ResourceSyncStats, USAGE_CATALOG};
pub use discovery::DiscoveredCluster;
pub use error::{ClusterError, ClusterResult, ResourceError};
pub use region::{HostQuery, HostRecord};
pub use registration::RegisterRequest;
pub use resource::{CustomResource, UpsertAction};
pub use service::ClusterService;
pub use topology::K8sNode;
