//! Node topology of a Kubernetes cluster.
//!
//! Combines the inventory's `Node` and `Endpoints` objects with the local
//! pod table into one [`K8sNode`] per node.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use metasync_state::{MetadataStore, PodRecord};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{Inventory, ResourceKind};
use crate::error::{ClusterError, ClusterResult};

const NODE_ROLE_PREFIX: &str = "node-role.kubernetes.io/";

/// Field mask for `Node` lookups.
pub const NODE_FIELDS: &[&str] = &[
    "data.metadata.name",
    "data.metadata.resourceVersion",
    "data.metadata.creationTimestamp",
    "data.metadata.labels",
    "data.spec.unschedulable",
    "data.spec.taints",
    "data.status.addresses",
    "data.status.conditions",
];

/// Field mask for `Endpoints` lookups.
pub const ENDPOINT_FIELDS: &[&str] = &["data.metadata.name", "data.subsets"];

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Label map where a `null` value reads as an empty string.
fn labels_with_null_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.unwrap_or_default()))
        .collect())
}

// ── Raw documents ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeDocument {
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: NodeMetadata,
    #[serde(deserialize_with = "null_as_default")]
    pub spec: Map<String, Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeMetadata {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "labels_with_null_values")]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "creationTimestamp")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Alternate spelling used by some storage backends.
    #[serde(rename = "creation_timestamp")]
    pub creation_timestamp_alt: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeStatus {
    #[serde(deserialize_with = "null_as_default")]
    pub addresses: Vec<NodeAddress>,
    #[serde(deserialize_with = "null_as_default")]
    pub conditions: Vec<NodeCondition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeAddress {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeCondition {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EndpointsDocument {
    #[serde(deserialize_with = "null_as_default")]
    pub subsets: Vec<Map<String, Value>>,
}

impl NodeDocument {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// First `InternalIP` address, or empty.
    pub fn node_ip(&self) -> &str {
        self.status
            .addresses
            .iter()
            .find(|a| a.kind == "InternalIP")
            .map(|a| a.address.as_str())
            .unwrap_or("")
    }

    pub fn roles(&self) -> Vec<String> {
        self.metadata
            .labels
            .keys()
            .filter_map(|key| key.strip_prefix(NODE_ROLE_PREFIX))
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// `Ready`/`NotReady` per Ready condition (`Unknown` if none), plus
    /// `SchedulingDisabled` when cordoned. Comma-joined.
    pub fn service_status(&self) -> String {
        let mut statuses: Vec<&str> = self
            .status
            .conditions
            .iter()
            .filter(|c| c.kind == "Ready")
            .map(|c| if c.status == "True" { "Ready" } else { "NotReady" })
            .collect();
        if statuses.is_empty() {
            statuses.push("Unknown");
        }
        if self.spec.get("unschedulable").and_then(Value::as_bool) == Some(true) {
            statuses.push("SchedulingDisabled");
        }
        statuses.join(",")
    }

    /// Taints rendered as `key=value:effect`. Entries with all three
    /// parts empty are dropped.
    pub fn taints(&self) -> Vec<String> {
        let Some(taints) = self.spec.get("taints").and_then(Value::as_array) else {
            return Vec::new();
        };
        taints
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|taint| {
                let field = |name: &str| taint.get(name).and_then(Value::as_str).unwrap_or("");
                let (key, value, effect) = (field("key"), field("value"), field("effect"));
                if key.is_empty() && value.is_empty() && effect.is_empty() {
                    None
                } else {
                    Some(format!("{key}={value}:{effect}"))
                }
            })
            .collect()
    }

    /// Sum over endpoint subsets of (addresses on this node) × (ports).
    pub fn endpoint_count(&self, endpoints: &[EndpointsDocument]) -> usize {
        let name = self.name();
        let mut count = 0;
        for subset in endpoints.iter().flat_map(|e| e.subsets.iter()) {
            let Some(addresses) = subset.get("addresses").and_then(Value::as_array) else {
                continue;
            };
            let on_node = addresses
                .iter()
                .filter_map(Value::as_object)
                .filter(|a| a.get("nodeName").and_then(Value::as_str).unwrap_or("") == name)
                .count();
            let Some(ports) = subset.get("ports") else {
                continue;
            };
            let port_count = ports.as_array().map_or(0, Vec::len);
            count += on_node * port_count;
        }
        count
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .creation_timestamp
            .or(self.metadata.creation_timestamp_alt)
    }
}

// ── Parsed node ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelPair {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct K8sNode {
    pub cluster_id: String,
    pub name: String,
    pub node_ip: String,
    pub labels: BTreeMap<String, String>,
    pub label_list: Vec<LabelPair>,
    pub taints: Vec<String>,
    pub roles: Vec<String>,
    pub status: String,
    pub endpoint_count: usize,
    pub pod_count: usize,
    pub created_at: Option<DateTime<Utc>>,
    /// Seconds since creation, when the creation time is known.
    pub age_secs: Option<i64>,
}

impl K8sNode {
    pub fn from_document(
        cluster_id: &str,
        node: &NodeDocument,
        endpoints: &[EndpointsDocument],
        pod_counts: &HashMap<String, usize>,
        now: DateTime<Utc>,
    ) -> Self {
        let node_ip = node.node_ip().to_string();
        let created_at = node.created_at();
        Self {
            cluster_id: cluster_id.to_string(),
            name: node.name().to_string(),
            pod_count: pod_counts.get(&node_ip).copied().unwrap_or(0),
            node_ip,
            labels: node.metadata.labels.clone(),
            label_list: node
                .metadata
                .labels
                .iter()
                .map(|(k, v)| LabelPair {
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect(),
            taints: node.taints(),
            roles: node.roles(),
            status: node.service_status(),
            endpoint_count: node.endpoint_count(endpoints),
            created_at,
            age_secs: created_at.map(|t| (now - t).num_seconds()),
        }
    }
}

fn decode_all<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    rows: Vec<Value>,
) -> ClusterResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| ClusterError::Decode {
                kind,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Pod counts keyed by node ip for one cluster.
pub fn pod_count_statistics<S: MetadataStore>(
    store: &S,
    cluster_id: &str,
) -> ClusterResult<HashMap<String, usize>> {
    let pods: Vec<PodRecord> = store.list_where(|p: &PodRecord| p.cluster_id == cluster_id)?;
    let mut counts = HashMap::new();
    for pod in pods {
        *counts.entry(pod.node_ip).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Fetch and parse every node of a cluster.
pub async fn fetch_node_list<S: MetadataStore>(
    store: &S,
    inventory: &dyn Inventory,
    cluster_id: &str,
    now: DateTime<Utc>,
) -> ClusterResult<Vec<K8sNode>> {
    let nodes = inventory
        .fetch_resources(cluster_id, ResourceKind::Node, NODE_FIELDS)
        .await
        .map_err(ClusterError::Inventory)?;
    let endpoints = inventory
        .fetch_resources(cluster_id, ResourceKind::Endpoints, ENDPOINT_FIELDS)
        .await
        .map_err(ClusterError::Inventory)?;
    let nodes: Vec<NodeDocument> = decode_all("Node", nodes)?;
    let endpoints: Vec<EndpointsDocument> = decode_all("Endpoints", endpoints)?;
    let pod_counts = pod_count_statistics(store, cluster_id)?;

    let result: Vec<K8sNode> = nodes
        .iter()
        .map(|node| K8sNode::from_document(cluster_id, node, &endpoints, &pod_counts, now))
        .collect();
    debug!(%cluster_id, nodes = result.len(), "fetched cluster topology");
    Ok(result)
}
