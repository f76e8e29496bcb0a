//! In-memory fakes for the collaborator traits.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use metasync_core::ResourceConfig;
use metasync_state::{ClusterRegistration, ClusterStatus};
use serde_json::Value;

use crate::client::{
    ClusterManager, CustomGroup, CustomGroupRequest, DataSourceRequest, Inventory,
    PipelineProvisioner, ResourceKind, ResourceStore, ResourceStoreFactory,
};
use crate::connection::ClusterConnection;
use crate::error::ResourceError;
use crate::region::{HostQuery, HostRecord, is_ipv6};
use crate::resource::CustomResource;

pub fn running_cluster(cluster_id: &str) -> ClusterRegistration {
    ClusterRegistration {
        cluster_id: cluster_id.to_string(),
        bk_biz_id: 2,
        project_id: "proj".to_string(),
        domain_name: "bcs-api.example.com".to_string(),
        port: 443,
        server_address_path: "clusters".to_string(),
        api_key_type: "authorization".to_string(),
        api_key_content: "token".to_string(),
        api_key_prefix: "Bearer".to_string(),
        status: ClusterStatus::Running,
        is_skip_ssl_verify: true,
        bk_env: None,
        bk_cloud_id: None,
        k8s_metric_data_id: 0,
        custom_metric_data_id: 0,
        k8s_event_data_id: 0,
        custom_event_data_id: 0,
        creator: "admin".to_string(),
        last_modify_user: "admin".to_string(),
    }
}

/// Resource API backed by a map. Every write bumps `resourceVersion`.
#[derive(Default)]
pub struct FakeResourceStore {
    objects: Mutex<HashMap<String, CustomResource>>,
    failing: HashSet<String>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    last_update_version: Mutex<Option<String>>,
}

impl FakeResourceStore {
    /// Make `get` on `name` fail with a non-NotFound error.
    pub fn failing_get(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn stored(&self, name: &str) -> Option<CustomResource> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    /// Version carried by the most recent update.
    pub fn last_update_version(&self) -> Option<String> {
        self.last_update_version.lock().unwrap().clone()
    }
}

fn name_of(resource: &CustomResource) -> Result<String, ResourceError> {
    resource
        .name()
        .map(str::to_string)
        .ok_or_else(|| ResourceError::Api(anyhow!("resource without metadata.name")))
}

#[async_trait]
impl ResourceStore for FakeResourceStore {
    async fn get(&self, name: &str) -> Result<CustomResource, ResourceError> {
        if self.failing.contains(name) {
            return Err(ResourceError::Api(anyhow!("get {name}: connection reset")));
        }
        self.stored(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<CustomResource>, ResourceError> {
        Ok(self.objects.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, resource: &CustomResource) -> Result<CustomResource, ResourceError> {
        let name = name_of(resource)?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&name) {
            return Err(ResourceError::Api(anyhow!("{name} already exists")));
        }
        let mut created = resource.clone();
        created.set_resource_version("1");
        objects.insert(name, created.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn update(&self, resource: &CustomResource) -> Result<CustomResource, ResourceError> {
        let name = name_of(resource)?;
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get(&name)
            .ok_or_else(|| ResourceError::NotFound(name.clone()))?;
        if resource.resource_version() != current.resource_version() {
            return Err(ResourceError::Api(anyhow!("{name}: resourceVersion conflict")));
        }
        let next: u64 = current
            .resource_version()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
            + 1;
        *self.last_update_version.lock().unwrap() = resource.resource_version().map(str::to_string);

        let mut updated = resource.clone();
        updated.set_resource_version(&next.to_string());
        objects.insert(name, updated.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

/// Hands out the same [`FakeResourceStore`] for every cluster.
#[derive(Default)]
pub struct FakeResourceFactory {
    store: Arc<FakeResourceStore>,
}

impl FakeResourceFactory {
    pub fn resources(&self) -> &FakeResourceStore {
        &self.store
    }
}

impl ResourceStoreFactory for FakeResourceFactory {
    fn for_cluster(
        &self,
        _connection: &ClusterConnection,
        _resource: &ResourceConfig,
    ) -> anyhow::Result<Arc<dyn ResourceStore>> {
        Ok(self.store.clone())
    }
}

#[derive(Default)]
pub struct FakeInventory {
    nodes: Vec<Value>,
    endpoints: Vec<Value>,
    hosts: HashMap<String, i64>,
    fail: bool,
}

impl FakeInventory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<Value>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<Value>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_host(mut self, ip: &str, bk_cloud_id: i64) -> Self {
        self.hosts.insert(ip.to_string(), bk_cloud_id);
        self
    }
}

#[async_trait]
impl Inventory for FakeInventory {
    async fn fetch_resources(
        &self,
        _cluster_id: &str,
        kind: ResourceKind,
        _fields: &[&str],
    ) -> anyhow::Result<Vec<Value>> {
        if self.fail {
            return Err(anyhow!("inventory unavailable"));
        }
        Ok(match kind {
            ResourceKind::Node => self.nodes.clone(),
            ResourceKind::Endpoints => self.endpoints.clone(),
        })
    }

    async fn lookup_hosts(&self, query: &HostQuery) -> anyhow::Result<Vec<HostRecord>> {
        if self.fail {
            return Err(anyhow!("inventory unavailable"));
        }
        Ok(query
            .ips
            .iter()
            .filter_map(|param| {
                let cloud_id = *self.hosts.get(&param.ip)?;
                let mut host = HostRecord {
                    bk_cloud_id: cloud_id,
                    ..HostRecord::default()
                };
                if is_ipv6(&param.ip) {
                    host.bk_host_innerip_v6 = param.ip.clone();
                } else {
                    host.bk_host_innerip = param.ip.clone();
                }
                Some(host)
            })
            .collect())
    }
}

/// Provisioner that hands out sequential data ids and records requests.
pub struct FakeProvisioner {
    next_id: AtomicU32,
    data_sources: Mutex<Vec<DataSourceRequest>>,
    groups: Mutex<Vec<CustomGroupRequest>>,
}

impl FakeProvisioner {
    pub fn starting_at(first_id: u32) -> Self {
        Self {
            next_id: AtomicU32::new(first_id),
            data_sources: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
        }
    }

    pub fn data_sources(&self) -> Vec<DataSourceRequest> {
        self.data_sources.lock().unwrap().clone()
    }

    pub fn groups(&self) -> Vec<CustomGroupRequest> {
        self.groups.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineProvisioner for FakeProvisioner {
    async fn create_data_source(&self, request: &DataSourceRequest) -> anyhow::Result<u32> {
        self.data_sources.lock().unwrap().push(request.clone());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn create_custom_group(
        &self,
        request: &CustomGroupRequest,
    ) -> anyhow::Result<CustomGroup> {
        self.groups.lock().unwrap().push(request.clone());
        Ok(CustomGroup {
            bk_data_id: request.bk_data_id,
            group_name: request.group_name.clone(),
        })
    }
}

pub struct FakeClusterManager {
    clusters: Vec<Value>,
}

impl FakeClusterManager {
    pub fn new(clusters: Vec<Value>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl ClusterManager for FakeClusterManager {
    async fn fetch_clusters(&self) -> anyhow::Result<Vec<Value>> {
        Ok(self.clusters.clone())
    }
}
