//! Built-in data-id resources pushed into every registered cluster.
//!
//! Each catalog usage becomes one `DataID` custom resource that tells the
//! in-cluster collector which data id to report to, which labels to stamp
//! and which metric/dimension names to rewrite.

use std::collections::{BTreeMap, HashMap};

use metasync_core::{ClusterConfig, ResourceConfig};
use metasync_state::{ClusterRegistration, DataIdSlot, MetadataStore, ReplaceConfig, ReplaceType};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::client::{ReportGroupKind, ResourceStore};
use crate::error::ClusterResult;
use crate::resource::{CustomResource, UpsertAction, apply_upsert, ensure_resource, plan_upsert};

/// Whether a usage carries metrics or events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageClass {
    Metric,
    Event,
}

impl UsageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageClass::Metric => "metric",
            UsageClass::Event => "event",
        }
    }
}

/// One entry of the static usage catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterUsage {
    pub usage: &'static str,
    pub etl_config: &'static str,
    pub group_kind: ReportGroupKind,
    pub slot: DataIdSlot,
    pub is_split_measurement: bool,
    pub is_system: bool,
    pub class: UsageClass,
}

pub const USAGE_CATALOG: &[ClusterUsage] = &[
    ClusterUsage {
        usage: "k8s_metric",
        etl_config: "bk_standard_v2_time_series",
        group_kind: ReportGroupKind::TimeSeriesGroup,
        slot: DataIdSlot::K8sMetric,
        is_split_measurement: true,
        is_system: true,
        class: UsageClass::Metric,
    },
    ClusterUsage {
        usage: "custom_metric",
        etl_config: "bk_standard_v2_time_series",
        group_kind: ReportGroupKind::TimeSeriesGroup,
        slot: DataIdSlot::CustomMetric,
        is_split_measurement: true,
        is_system: false,
        class: UsageClass::Metric,
    },
    ClusterUsage {
        usage: "k8s_event",
        etl_config: "bk_standard_v2_event",
        group_kind: ReportGroupKind::EventGroup,
        slot: DataIdSlot::K8sEvent,
        is_split_measurement: false,
        is_system: true,
        class: UsageClass::Event,
    },
];

/// Merged metric and dimension rename maps for a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceRules {
    pub metric: BTreeMap<String, String>,
    pub dimension: BTreeMap<String, String>,
}

impl ReplaceRules {
    fn apply(&mut self, rule: ReplaceConfig) {
        let target = match rule.replace_type {
            ReplaceType::Metric => &mut self.metric,
            ReplaceType::Dimension => &mut self.dimension,
        };
        target.insert(rule.source_name, rule.target_name);
    }

    /// Common rules, overridden by rules scoped to `cluster_id`.
    pub fn load<S: MetadataStore>(store: &S, cluster_id: &str) -> ClusterResult<Self> {
        let rules: Vec<ReplaceConfig> = store.list_where(|r: &ReplaceConfig| {
            r.cluster_id.is_none() || r.cluster_id.as_deref() == Some(cluster_id)
        })?;
        let (common, scoped): (Vec<_>, Vec<_>) =
            rules.into_iter().partition(|r| r.cluster_id.is_none());
        let mut merged = Self::default();
        for rule in common.into_iter().chain(scoped) {
            merged.apply(rule);
        }
        Ok(merged)
    }
}

/// Environment label for a cluster: its own, else the configured default.
pub fn env_label<'a>(cluster: &'a ClusterRegistration, config: &'a ClusterConfig) -> &'a str {
    cluster.bk_env.as_deref().unwrap_or(&config.bk_env_label)
}

/// `{env}-{slot}` with the slot lowercased, or just the slot without env.
pub fn resource_name(env: &str, slot: DataIdSlot) -> String {
    let slot = slot.as_str().to_lowercase();
    if env.is_empty() {
        slot
    } else {
        format!("{env}-{slot}")
    }
}

/// Build the desired `DataID` resource for one usage.
pub fn desired_resource(
    cluster: &ClusterRegistration,
    usage: &ClusterUsage,
    rules: &ReplaceRules,
    env: &str,
    resource: &ResourceConfig,
) -> CustomResource {
    let is_system = if usage.is_system { "true" } else { "false" };
    let mut labels = json!({
        "usage": usage.class.as_str(),
        "isCommon": "true",
        "isSystem": is_system,
    });
    if !env.is_empty() {
        labels["bk_env"] = Value::String(env.to_string());
    }
    CustomResource::new(json!({
        "apiVersion": resource.api_version(),
        "kind": resource.kind,
        "metadata": {
            "name": resource_name(env, usage.slot),
            "labels": labels,
        },
        "spec": {
            "dataID": cluster.data_id(usage.slot),
            "labels": {
                "bcs_cluster_id": cluster.cluster_id,
                "bk_biz_id": cluster.bk_biz_id.to_string(),
            },
            "metricReplace": rules.metric,
            "dimensionReplace": rules.dimension,
        },
    }))
}

/// Per-cluster tally of a resource sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSyncStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ResourceSyncStats {
    fn record(&mut self, action: &UpsertAction) {
        match action {
            UpsertAction::Create => self.created += 1,
            UpsertAction::Update { .. } => self.updated += 1,
            UpsertAction::NoOp => self.unchanged += 1,
        }
    }
}

/// Desired resources for every catalog usage, keyed by resource name.
fn desired_resources<S: MetadataStore>(
    store: &S,
    cluster: &ClusterRegistration,
    config: &ClusterConfig,
) -> ClusterResult<Vec<(String, CustomResource)>> {
    let rules = ReplaceRules::load(store, &cluster.cluster_id)?;
    let env = env_label(cluster, config);
    Ok(USAGE_CATALOG
        .iter()
        .map(|usage| {
            (
                resource_name(env, usage.slot),
                desired_resource(cluster, usage, &rules, env, &config.resource),
            )
        })
        .collect())
}

/// Reconcile every usage against one `list` of the cluster's resources.
///
/// A failure on one resource is logged and counted; the others still run.
pub async fn refresh_common_resources<S: MetadataStore>(
    store: &S,
    resources: &dyn ResourceStore,
    cluster: &ClusterRegistration,
    config: &ClusterConfig,
) -> ClusterResult<ResourceSyncStats> {
    let observed: HashMap<String, CustomResource> = resources
        .list()
        .await?
        .into_iter()
        .filter_map(|r| {
            let name = r.name()?.to_string();
            Some((name, r))
        })
        .collect();
    info!(
        cluster_id = %cluster.cluster_id,
        total = observed.len(),
        "listed data id resources"
    );

    let mut stats = ResourceSyncStats::default();
    for (name, desired) in desired_resources(store, cluster, config)? {
        let action = plan_upsert(&desired, observed.get(&name));
        match apply_upsert(resources, &name, desired, &action).await {
            Ok(()) => stats.record(&action),
            Err(e) => {
                warn!(cluster_id = %cluster.cluster_id, resource = %name, error = %e, "data id resource sync failed");
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

/// Reconcile every usage, probing each resource by name.
pub async fn init_resources<S: MetadataStore>(
    store: &S,
    resources: &dyn ResourceStore,
    cluster: &ClusterRegistration,
    config: &ClusterConfig,
) -> ClusterResult<ResourceSyncStats> {
    let mut stats = ResourceSyncStats::default();
    for (name, desired) in desired_resources(store, cluster, config)? {
        match ensure_resource(resources, &name, desired).await {
            Ok(action) => stats.record(&action),
            Err(e) => {
                warn!(cluster_id = %cluster.cluster_id, resource = %name, error = %e, "data id resource init failed");
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}
