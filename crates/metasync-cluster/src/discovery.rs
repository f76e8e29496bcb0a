//! Cluster listing from the cluster manager.

use metasync_core::ClusterConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ClusterManager;
use crate::error::{ClusterError, ClusterResult};

/// A cluster as reported by the cluster manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredCluster {
    pub cluster_id: String,
    pub bk_biz_id: String,
    pub name: String,
    pub project_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: String,
    pub environment: String,
}

fn string_field<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key)?.as_str()
}

fn required(entry: &Value, cluster_id: &str, field: &'static str) -> ClusterResult<String> {
    string_field(entry, field)
        .map(str::to_string)
        .ok_or_else(|| ClusterError::MissingField {
            cluster_id: cluster_id.to_string(),
            field,
        })
}

/// Fetch and normalize the cluster list.
///
/// Entries without `clusterID` or `businessID` are skipped. Shared
/// clusters show up once per project, so later duplicates are dropped.
/// Any other missing field fails the whole listing.
pub async fn fetch_k8s_clusters(
    manager: &dyn ClusterManager,
    config: &ClusterConfig,
) -> ClusterResult<Vec<DiscoveredCluster>> {
    let raw = manager
        .fetch_clusters()
        .await
        .map_err(ClusterError::ClusterManager)?;

    let mut clusters: Vec<DiscoveredCluster> = Vec::new();
    for entry in &raw {
        let Some(cluster_id) = string_field(entry, "clusterID") else {
            warn!(entry = %entry, "cluster entry without clusterID, skipping");
            continue;
        };
        let Some(bk_biz_id) = string_field(entry, "businessID") else {
            warn!(entry = %entry, "cluster entry without businessID, skipping");
            continue;
        };
        if !config.is_cluster_in_gray(cluster_id) {
            continue;
        }
        if clusters.iter().any(|c| c.cluster_id == cluster_id) {
            debug!(cluster_id, "duplicate cluster entry ignored");
            continue;
        }

        clusters.push(DiscoveredCluster {
            cluster_id: cluster_id.to_string(),
            bk_biz_id: bk_biz_id.to_string(),
            name: required(entry, cluster_id, "clusterName")?,
            project_id: required(entry, cluster_id, "projectID")?,
            created_at: required(entry, cluster_id, "createTime")?,
            updated_at: required(entry, cluster_id, "updateTime")?,
            status: required(entry, cluster_id, "status")?,
            environment: required(entry, cluster_id, "environment")?,
        });
    }
    Ok(clusters)
}
