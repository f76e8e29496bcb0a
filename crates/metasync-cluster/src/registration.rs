//! Onboarding a new cluster.
//!
//! Registration persists the cluster row, then provisions one data source
//! and one custom report group per catalog usage, and finally writes all
//! resulting data ids back to the row in one go.

use std::collections::BTreeMap;

use metasync_core::ClusterConfig;
use metasync_state::{ClusterRegistration, ClusterStatus, MetadataStore};
use serde_json::json;
use tracing::info;
use url::Url;

use crate::client::{CustomGroupRequest, DataSourceRequest, PipelineProvisioner};
use crate::dataid::{ClusterUsage, USAGE_CATALOG, UsageClass};
use crate::error::{ClusterError, ClusterResult};

const DEFAULT_GATEWAY_PORT: u16 = 443;
const SERVER_ADDRESS_PATH: &str = "clusters";
const API_KEY_TYPE: &str = "authorization";
const API_KEY_PREFIX: &str = "Bearer";
const DATA_SOURCE_SYSTEM: &str = "bk_monitor";
const GROUP_LABEL: &str = "other_rt";
const DIMENSION_VALUES_OPTION: &str = "custom_report_dimension_values";
const SERVICE_MONITOR_DIMENSIONS: &[&str] = &["bk_monitor_name", "bk_monitor_namespace"];

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    /// Business id as supplied by the caller; must parse as an integer.
    pub bk_biz_id: String,
    pub cluster_id: String,
    pub project_id: String,
    pub creator: String,
}

/// Data-source type label for an etl config.
pub fn type_label(etl_config: &str) -> &'static str {
    match etl_config {
        "bk_standard_v2_time_series" => "time_series",
        "bk_standard_v2_event" => "event",
        "bk_flat_batch" => "log",
        _ => "",
    }
}

/// Pipeline name shared by a usage's data source and report group.
pub fn pipeline_name(cluster_id: &str, usage: &str) -> String {
    format!("bcs_{cluster_id}_{usage}")
}

fn gateway_host_port(gateway: &str) -> ClusterResult<(String, u16)> {
    let invalid = |reason: String| ClusterError::InvalidGatewayUrl {
        url: gateway.to_string(),
        reason,
    };
    let url = Url::parse(gateway).map_err(|e| invalid(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?;
    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_GATEWAY_PORT)))
}

fn new_registration(
    request: &RegisterRequest,
    bk_biz_id: i64,
    config: &ClusterConfig,
) -> ClusterResult<ClusterRegistration> {
    let (domain_name, port) = gateway_host_port(&config.api_gateway_domain)?;
    Ok(ClusterRegistration {
        cluster_id: request.cluster_id.clone(),
        bk_biz_id,
        project_id: request.project_id.clone(),
        domain_name,
        port,
        server_address_path: SERVER_ADDRESS_PATH.to_string(),
        api_key_type: API_KEY_TYPE.to_string(),
        api_key_content: config.api_gateway_token.clone(),
        api_key_prefix: API_KEY_PREFIX.to_string(),
        status: ClusterStatus::Running,
        is_skip_ssl_verify: true,
        bk_env: Some(config.bk_env_label.clone()),
        bk_cloud_id: None,
        k8s_metric_data_id: 0,
        custom_metric_data_id: 0,
        k8s_event_data_id: 0,
        custom_event_data_id: 0,
        creator: request.creator.clone(),
        last_modify_user: request.creator.clone(),
    })
}

fn group_request(
    cluster: &ClusterRegistration,
    usage: &ClusterUsage,
    bk_data_id: u32,
    operator: &str,
    config: &ClusterConfig,
) -> CustomGroupRequest {
    let (default_storage_config, additional_options) = match usage.class {
        UsageClass::Metric => (
            json!({"proxy_cluster_name": config.influxdb_default_proxy_cluster_name}),
            BTreeMap::from([(
                DIMENSION_VALUES_OPTION.to_string(),
                SERVICE_MONITOR_DIMENSIONS
                    .iter()
                    .map(|d| d.to_string())
                    .collect(),
            )]),
        ),
        UsageClass::Event => (
            json!({"cluster_id": config.custom_event_storage_cluster_id}),
            BTreeMap::new(),
        ),
    };
    CustomGroupRequest {
        kind: usage.group_kind,
        bk_data_id,
        bk_biz_id: cluster.bk_biz_id,
        group_name: pipeline_name(&cluster.cluster_id, usage.usage),
        label: GROUP_LABEL.to_string(),
        operator: operator.to_string(),
        is_split_measurement: usage.is_split_measurement,
        default_storage_config,
        additional_options,
    }
}

/// Register a cluster and provision its pipelines.
///
/// Fails without writing anything if the business id is malformed or the
/// cluster is already registered. A provisioning failure leaves the row
/// persisted with whatever data ids were never written back.
pub async fn register_cluster<S: MetadataStore>(
    store: &S,
    provisioner: &dyn PipelineProvisioner,
    config: &ClusterConfig,
    request: &RegisterRequest,
) -> ClusterResult<ClusterRegistration> {
    let bk_biz_id: i64 = request
        .bk_biz_id
        .parse()
        .map_err(|_| ClusterError::InvalidBizId(request.bk_biz_id.clone()))?;

    if store
        .get::<ClusterRegistration>(&request.cluster_id)?
        .is_some()
    {
        return Err(ClusterError::AlreadyRegistered {
            cluster_id: request.cluster_id.clone(),
            project_id: request.project_id.clone(),
        });
    }

    let mut cluster = new_registration(request, bk_biz_id, config)?;
    store.put(&cluster)?;
    info!(cluster_id = %cluster.cluster_id, "cluster record created");

    for usage in USAGE_CATALOG {
        let data_source = DataSourceRequest {
            data_name: pipeline_name(&cluster.cluster_id, usage.usage),
            etl_config: usage.etl_config.to_string(),
            operator: request.creator.clone(),
            source_system: DATA_SOURCE_SYSTEM.to_string(),
            mq_cluster_id: config.kafka_storage_cluster_id,
            type_label: type_label(usage.etl_config).to_string(),
            transfer_cluster_id: config.transfer_cluster_id.clone(),
            source_label: config.app_code.clone(),
        };
        let bk_data_id = provisioner
            .create_data_source(&data_source)
            .await
            .map_err(ClusterError::Provision)?;
        info!(cluster_id = %cluster.cluster_id, usage = usage.usage, bk_data_id, "data source registered");

        let group = provisioner
            .create_custom_group(&group_request(
                &cluster,
                usage,
                bk_data_id,
                &request.creator,
                config,
            ))
            .await
            .map_err(ClusterError::Provision)?;
        info!(cluster_id = %cluster.cluster_id, usage = usage.usage, group = %group.group_name, "report group registered");

        cluster.set_data_id(usage.slot, group.bk_data_id);
    }

    store.put(&cluster)?;
    info!(cluster_id = %cluster.cluster_id, "cluster data ids saved");
    Ok(cluster)
}
