//! Metadata records.
//!
//! Each record type is stored in its own table, keyed by [`Record::key`].
//! Records are created upstream; the control plane reads them and only
//! writes back cluster registrations.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Data sources created through this ingestion channel are refreshed.
pub const CREATED_FROM_BKGSE: &str = "bkgse";

/// A persisted metadata row.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table name.
    const KIND: &'static str;

    /// Primary key within the table.
    fn key(&self) -> String;
}

// ── Result tables ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultTable {
    pub table_id: String,
    pub bk_biz_id: i64,
    pub is_enable: bool,
    pub is_deleted: bool,
}

impl ResultTable {
    pub fn is_active(&self) -> bool {
        self.is_enable && !self.is_deleted
    }
}

/// Link between a data source and a result table it feeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSourceResultTable {
    pub bk_data_id: u32,
    pub table_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSource {
    pub bk_data_id: u32,
    pub data_name: String,
    pub etl_config: String,
    pub source_system: String,
    pub is_enable: bool,
    /// Ingestion channel the data id was created through.
    pub created_from: String,
    /// Unix timestamp (seconds).
    pub last_modify_time: u64,
}

impl DataSource {
    pub fn is_refreshable(&self) -> bool {
        self.is_enable && self.created_from == CREATED_FROM_BKGSE
    }
}

// ── Storage routing ────────────────────────────────────────────────

/// Search-engine index configuration for a result table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EsStorage {
    pub table_id: String,
    pub storage_cluster_id: u32,
    pub retention_days: u32,
    pub slice_size_gb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfluxdbHostInfo {
    pub host_name: String,
    pub domain_name: String,
    pub port: u16,
    pub status: bool,
}

/// Membership of a host in an influxdb cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfluxdbClusterInfo {
    pub cluster_name: String,
    pub host_name: String,
    pub host_readable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfluxdbStorage {
    pub table_id: String,
    pub storage_cluster_id: u32,
    pub database: String,
    pub real_table_name: String,
    pub proxy_cluster_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessVmRecord {
    pub result_table_id: String,
    pub bk_base_data_id: u32,
    pub vm_result_table_id: String,
    pub vm_cluster_id: u32,
}

/// Tag-based routing of a measurement to a subset of hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfluxdbTagInfo {
    pub database: String,
    pub measurement: String,
    pub tag_name: String,
    pub tag_value: String,
    pub cluster_name: String,
    pub host_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KafkaTopicInfo {
    pub bk_data_id: u32,
    pub topic: String,
    pub partition: u32,
}

/// Snapshot restore (backtrack) job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestoreJob {
    pub restore_id: u64,
    pub table_id: String,
    pub total_doc_count: u64,
    pub complete_doc_count: u64,
    pub is_deleted: bool,
}

impl RestoreJob {
    pub fn is_done(&self) -> bool {
        self.total_doc_count == self.complete_doc_count
    }
}

// ── Cluster-side records ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodRecord {
    pub cluster_id: String,
    pub namespace: String,
    pub name: String,
    pub node_ip: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceType {
    Metric,
    Dimension,
}

/// Metric or dimension rename rule pushed into data-id resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplaceConfig {
    pub rule_name: String,
    pub replace_type: ReplaceType,
    pub source_name: String,
    pub target_name: String,
    /// `None` applies to every cluster; `Some` overrides for one cluster.
    pub cluster_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Running,
    Deleted,
    #[serde(other)]
    Other,
}

/// Named data-id field on a cluster registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataIdSlot {
    K8sMetric,
    CustomMetric,
    K8sEvent,
    CustomEvent,
}

impl DataIdSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataIdSlot::K8sMetric => "K8sMetricDataID",
            DataIdSlot::CustomMetric => "CustomMetricDataID",
            DataIdSlot::K8sEvent => "K8sEventDataID",
            DataIdSlot::CustomEvent => "CustomEventDataID",
        }
    }
}

impl std::fmt::Display for DataIdSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An externally managed Kubernetes cluster tracked by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterRegistration {
    pub cluster_id: String,
    pub bk_biz_id: i64,
    pub project_id: String,
    pub domain_name: String,
    pub port: u16,
    pub server_address_path: String,
    pub api_key_type: String,
    pub api_key_content: String,
    pub api_key_prefix: String,
    pub status: ClusterStatus,
    pub is_skip_ssl_verify: bool,
    #[serde(default)]
    pub bk_env: Option<String>,
    /// Inferred cloud area. Written once, never recomputed.
    #[serde(default)]
    pub bk_cloud_id: Option<i64>,
    #[serde(default)]
    pub k8s_metric_data_id: u32,
    #[serde(default)]
    pub custom_metric_data_id: u32,
    #[serde(default)]
    pub k8s_event_data_id: u32,
    #[serde(default)]
    pub custom_event_data_id: u32,
    pub creator: String,
    pub last_modify_user: String,
}

impl ClusterRegistration {
    pub fn is_running(&self) -> bool {
        self.status == ClusterStatus::Running
    }

    pub fn needs_cloud_id(&self) -> bool {
        self.is_running() && self.bk_cloud_id.is_none()
    }

    /// Set the cloud id if it has never been set. Returns whether it was written.
    pub fn assign_cloud_id(&mut self, cloud_id: i64) -> bool {
        if self.bk_cloud_id.is_some() {
            return false;
        }
        self.bk_cloud_id = Some(cloud_id);
        true
    }

    pub fn data_id(&self, slot: DataIdSlot) -> u32 {
        match slot {
            DataIdSlot::K8sMetric => self.k8s_metric_data_id,
            DataIdSlot::CustomMetric => self.custom_metric_data_id,
            DataIdSlot::K8sEvent => self.k8s_event_data_id,
            DataIdSlot::CustomEvent => self.custom_event_data_id,
        }
    }

    pub fn set_data_id(&mut self, slot: DataIdSlot, data_id: u32) {
        let field = match slot {
            DataIdSlot::K8sMetric => &mut self.k8s_metric_data_id,
            DataIdSlot::CustomMetric => &mut self.custom_metric_data_id,
            DataIdSlot::K8sEvent => &mut self.k8s_event_data_id,
            DataIdSlot::CustomEvent => &mut self.custom_event_data_id,
        };
        *field = data_id;
    }
}

// ── Record impls ───────────────────────────────────────────────────

macro_rules! record {
    ($ty:ty, $kind:literal, |$r:ident| $key:expr) => {
        impl Record for $ty {
            const KIND: &'static str = $kind;

            fn key(&self) -> String {
                let $r = self;
                $key
            }
        }
    };
}

record!(ResultTable, "result_tables", |r| r.table_id.clone());
record!(DataSourceResultTable, "datasource_result_tables", |r| format!(
    "{}:{}",
    r.bk_data_id, r.table_id
));
record!(DataSource, "datasources", |r| r.bk_data_id.to_string());
record!(EsStorage, "es_storages", |r| r.table_id.clone());
record!(InfluxdbHostInfo, "influxdb_hosts", |r| r.host_name.clone());
record!(InfluxdbClusterInfo, "influxdb_clusters", |r| format!(
    "{}:{}",
    r.cluster_name, r.host_name
));
record!(InfluxdbStorage, "influxdb_storages", |r| r.table_id.clone());
record!(AccessVmRecord, "access_vm_records", |r| r.result_table_id.clone());
record!(InfluxdbTagInfo, "influxdb_tags", |r| format!(
    "{}/{}/{}/{}",
    r.database, r.measurement, r.tag_name, r.tag_value
));
record!(KafkaTopicInfo, "kafka_topics", |r| r.bk_data_id.to_string());
record!(RestoreJob, "restore_jobs", |r| r.restore_id.to_string());
record!(PodRecord, "pods", |r| format!(
    "{}/{}/{}",
    r.cluster_id, r.namespace, r.name
));
record!(ReplaceConfig, "replace_configs", |r| format!(
    "{}/{}",
    r.cluster_id.as_deref().unwrap_or("*"),
    r.rule_name
));
record!(ClusterRegistration, "clusters", |r| r.cluster_id.clone());
