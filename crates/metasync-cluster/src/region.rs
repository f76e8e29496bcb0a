//! Cloud-area inference for clusters registered without one.
//!
//! Node ips are resolved against the host inventory in batches; the cloud
//! id carried by most nodes wins and is written to the registration row
//! once.

use std::collections::HashMap;
use std::net::IpAddr;

use metasync_state::{ClusterRegistration, MetadataStore};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::client::Inventory;
use crate::error::{ClusterError, ClusterResult};
use crate::topology::K8sNode;

/// Max ips per host lookup.
pub const IP_BATCH_SIZE: usize = 100;

/// Cloud id marker meaning "any cloud area".
pub const UNSCOPED_CLOUD_ID: i64 = -1;

/// Cloud area assigned when no node ip resolves.
pub const DEFAULT_CLOUD_ID: i64 = 0;

const HOST_PAGE_LIMIT: u32 = 500;

const HOST_FIELDS: &[&str] = &[
    "bk_host_innerip",
    "bk_host_innerip_v6",
    "bk_cloud_id",
    "bk_host_id",
    "bk_biz_id",
    "bk_agent_id",
    "bk_host_outerip",
    "bk_host_outerip_v6",
    "bk_host_name",
    "bk_os_name",
    "bk_os_type",
    "operator",
    "bk_bak_operator",
    "bk_state_name",
    "bk_isp_name",
    "bk_province_name",
    "bk_supplier_account",
    "bk_state",
    "bk_os_version",
    "service_template_id",
    "srv_status",
    "bk_comment",
    "idc_unit_name",
    "net_device_id",
    "rack_id",
    "bk_svr_device_cls_name",
    "svr_device_class",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpParam {
    pub ip: String,
    pub bk_cloud_id: i64,
}

/// Host lookup for one batch of ips within a business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostQuery {
    pub bk_biz_id: i64,
    pub ips: Vec<IpParam>,
}

/// A host as returned by the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRecord {
    /// Comma-separated inner IPv4 addresses.
    pub bk_host_innerip: String,
    /// Comma-separated inner IPv6 addresses.
    pub bk_host_innerip_v6: String,
    pub bk_cloud_id: i64,
}

/// True for IPv6 literals that are not IPv4-mapped. Unparseable input
/// counts as IPv4.
pub fn is_ipv6(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => v6.to_ipv4_mapped().is_none(),
        _ => false,
    }
}

fn rule(field: &str, operator: &str, value: Value) -> Value {
    json!({"field": field, "operator": operator, "value": value})
}

impl HostQuery {
    pub fn unscoped(bk_biz_id: i64, ips: &[String]) -> Self {
        Self {
            bk_biz_id,
            ips: ips
                .iter()
                .map(|ip| IpParam {
                    ip: ip.clone(),
                    bk_cloud_id: UNSCOPED_CLOUD_ID,
                })
                .collect(),
        }
    }

    /// Request body for the inventory's host-topology search.
    ///
    /// Ips are grouped by cloud id (first-seen order). Each group yields
    /// an IPv4 and/or IPv6 `AND` branch; a concrete cloud id adds an
    /// equality rule to each branch. Multiple branches are `OR`ed.
    pub fn to_body(&self) -> Value {
        let mut groups: Vec<(i64, Vec<&str>)> = Vec::new();
        for param in &self.ips {
            match groups.iter_mut().find(|(cloud, _)| *cloud == param.bk_cloud_id) {
                Some((_, ips)) => ips.push(param.ip.as_str()),
                None => groups.push((param.bk_cloud_id, vec![param.ip.as_str()])),
            }
        }

        let mut conditions = Vec::new();
        for (cloud_id, ips) in groups {
            let (v6, v4): (Vec<&str>, Vec<&str>) = ips.into_iter().partition(|ip| is_ipv6(ip));
            for (field, family) in [("bk_host_innerip", v4), ("bk_host_innerip_v6", v6)] {
                if family.is_empty() {
                    continue;
                }
                let mut rules = vec![rule(field, "in", json!(family))];
                if cloud_id != UNSCOPED_CLOUD_ID {
                    rules.push(rule("bk_cloud_id", "equal", json!(cloud_id)));
                }
                conditions.push(json!({"condition": "AND", "rules": rules}));
            }
        }

        let filter = if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            json!({"condition": "OR", "rules": conditions})
        };

        json!({
            "bk_biz_id": self.bk_biz_id,
            "host_property_filter": filter,
            "fields": HOST_FIELDS,
            "page": {"limit": HOST_PAGE_LIMIT},
        })
    }
}

/// Split non-empty node ips into lookup batches.
pub fn ip_batches(nodes: &[K8sNode]) -> Vec<Vec<String>> {
    let ips: Vec<String> = nodes
        .iter()
        .filter(|n| !n.node_ip.is_empty())
        .map(|n| n.node_ip.clone())
        .collect();
    ips.chunks(IP_BATCH_SIZE).map(<[String]>::to_vec).collect()
}

/// Map the first inner ip (v4 and v6) of each host to its cloud id.
pub fn index_hosts(hosts: &[HostRecord], into: &mut HashMap<String, i64>) {
    for host in hosts {
        for addresses in [&host.bk_host_innerip, &host.bk_host_innerip_v6] {
            if addresses.is_empty() {
                continue;
            }
            if let Some(first) = addresses.split(',').next() {
                into.insert(first.to_string(), host.bk_cloud_id);
            }
        }
    }
}

/// Most common cloud id across `node_ips`. Ties go to the id whose first
/// vote came earliest.
pub fn majority_cloud_id<'a>(
    node_ips: impl IntoIterator<Item = &'a str>,
    ip_to_cloud: &HashMap<String, i64>,
) -> Option<i64> {
    let mut tally: Vec<(i64, usize)> = Vec::new();
    for ip in node_ips {
        let Some(cloud_id) = ip_to_cloud.get(ip) else {
            continue;
        };
        match tally.iter_mut().find(|(id, _)| id == cloud_id) {
            Some((_, count)) => *count += 1,
            None => tally.push((*cloud_id, 1)),
        }
    }
    let mut best: Option<(i64, usize)> = None;
    for (id, count) in tally {
        if best.is_none_or(|(_, max)| count > max) {
            best = Some((id, count));
        }
    }
    best.map(|(id, _)| id)
}

/// Resolve node ips and vote on a cloud id. Falls back to
/// [`DEFAULT_CLOUD_ID`] when nothing resolves.
pub async fn infer_cloud_id(
    inventory: &dyn Inventory,
    bk_biz_id: i64,
    nodes: &[K8sNode],
) -> ClusterResult<i64> {
    let mut ip_to_cloud = HashMap::new();
    for batch in ip_batches(nodes) {
        let query = HostQuery::unscoped(bk_biz_id, &batch);
        let hosts = inventory
            .lookup_hosts(&query)
            .await
            .map_err(ClusterError::Inventory)?;
        index_hosts(&hosts, &mut ip_to_cloud);
    }
    let cloud_id = majority_cloud_id(nodes.iter().map(|n| n.node_ip.as_str()), &ip_to_cloud)
        .unwrap_or(DEFAULT_CLOUD_ID);
    Ok(cloud_id)
}

/// Fill in a running cluster's cloud id if it has none.
///
/// The row is re-read before writing so a value set concurrently is kept.
/// Returns the id written, if any.
pub async fn ensure_cloud_id<S: MetadataStore>(
    store: &S,
    inventory: &dyn Inventory,
    cluster: &ClusterRegistration,
    nodes: &[K8sNode],
) -> ClusterResult<Option<i64>> {
    if !cluster.needs_cloud_id() {
        return Ok(None);
    }
    let cloud_id = infer_cloud_id(inventory, cluster.bk_biz_id, nodes).await?;

    let Some(mut current) = store.get::<ClusterRegistration>(&cluster.cluster_id)? else {
        debug!(cluster_id = %cluster.cluster_id, "cluster row vanished before cloud id write");
        return Ok(None);
    };
    if !current.needs_cloud_id() || !current.assign_cloud_id(cloud_id) {
        return Ok(None);
    }
    store.put(&current)?;
    info!(cluster_id = %cluster.cluster_id, bk_cloud_id = cloud_id, "cluster cloud id assigned");
    Ok(Some(cloud_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_map(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(ip, c)| (ip.to_string(), *c)).collect()
    }

    #[test]
    fn majority_picks_highest_count() {
        let map = cloud_map(&[("a", 1), ("b", 2), ("c", 1), ("d", 2), ("e", 1)]);
        assert_eq!(majority_cloud_id(["a", "b", "c", "d", "e"], &map), Some(1));
    }

    #[test]
    fn majority_tie_goes_to_first_seen() {
        let map = cloud_map(&[("a", 7), ("b", 3), ("c", 3), ("d", 7)]);
        assert_eq!(majority_cloud_id(["b", "a", "c", "d"], &map), Some(3));
        assert_eq!(majority_cloud_id(["a", "b", "c", "d"], &map), Some(7));
    }

    #[test]
    fn majority_ignores_unresolved() {
        let map = cloud_map(&[("a", 4)]);
        assert_eq!(majority_cloud_id(["x", "a", "y"], &map), Some(4));
        assert_eq!(majority_cloud_id(["x"], &map), None);
    }

    #[test]
    fn ipv4_mapped_ipv6_counts_as_v4() {
        assert!(!is_ipv6("10.0.0.1"));
        assert!(is_ipv6("fd00::1"));
        assert!(!is_ipv6("::ffff:10.0.0.1"));
        assert!(!is_ipv6("not-an-ip"));
    }

    #[test]
    fn index_uses_first_inner_ip() {
        let hosts = vec![
            HostRecord {
                bk_host_innerip: "10.0.0.1,10.0.0.9".to_string(),
                bk_host_innerip_v6: "fd00::1".to_string(),
                bk_cloud_id: 5,
            },
            HostRecord {
                bk_host_innerip: String::new(),
                bk_host_innerip_v6: String::new(),
                bk_cloud_id: 6,
            },
        ];
        let mut map = HashMap::new();
        index_hosts(&hosts, &mut map);
        assert_eq!(map.len(), 2);
        assert_eq!(map["10.0.0.1"], 5);
        assert_eq!(map["fd00::1"], 5);
    }

    #[test]
    fn unscoped_body_has_no_cloud_rule() {
        let query = HostQuery::unscoped(2, &["10.0.0.1".to_string()]);
        let body = query.to_body();
        assert_eq!(body["bk_biz_id"], 2);
        assert_eq!(body["page"]["limit"], 500);
        assert_eq!(
            body["host_property_filter"],
            json!({"condition": "AND", "rules": [
                {"field": "bk_host_innerip", "operator": "in", "value": ["10.0.0.1"]}
            ]})
        );
    }

    #[test]
    fn mixed_families_are_ored_with_cloud_rule() {
        let query = HostQuery {
            bk_biz_id: 2,
            ips: vec![
                IpParam {
                    ip: "10.0.0.1".to_string(),
                    bk_cloud_id: 3,
                },
                IpParam {
                    ip: "fd00::1".to_string(),
                    bk_cloud_id: 3,
                },
            ],
        };
        let filter = &query.to_body()["host_property_filter"];
        assert_eq!(filter["condition"], "OR");
        let branches = filter["rules"].as_array().unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0]["rules"][0]["field"], "bk_host_innerip");
        assert_eq!(branches[1]["rules"][0]["field"], "bk_host_innerip_v6");
        for branch in branches {
            assert_eq!(
                branch["rules"][1],
                json!({"field": "bk_cloud_id", "operator": "equal", "value": 3})
            );
        }
    }
}
