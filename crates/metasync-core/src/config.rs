//! metasync.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Concurrency used for refresh tasks that have no explicit entry.
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,
    /// Max ids per metadata lookup. 0 disables chunking.
    #[serde(default)]
    pub query_chunk_size: usize,
    /// Task name to worker cap.
    #[serde(default)]
    pub concurrency: HashMap<String, usize>,
}

/// Per-task worker caps for refresh passes.
///
/// Tasks are looked up by name (`refresh_es_storage`, `refresh_datasource`,
/// ...). Names without an entry get the default, which is
/// [`DEFAULT_CONCURRENCY`] unless configured. A zero is treated as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    default_concurrency: usize,
    per_task: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Base URL of the cluster API gateway, e.g. `https://bcs-api.example.com:443`.
    #[serde(default = "default_gateway_domain")]
    pub api_gateway_domain: String,
    #[serde(default)]
    pub api_gateway_token: String,
    /// Environment label stamped on generated resources when the cluster
    /// row does not carry its own.
    #[serde(default)]
    pub bk_env_label: String,
    #[serde(default)]
    pub enable_gray: bool,
    #[serde(default)]
    pub gray_cluster_ids: Vec<String>,
    #[serde(default)]
    pub kafka_storage_cluster_id: u32,
    #[serde(default)]
    pub custom_event_storage_cluster_id: u32,
    #[serde(default = "default_proxy_cluster_name")]
    pub influxdb_default_proxy_cluster_name: String,
    #[serde(default = "default_app_code")]
    pub app_code: String,
    #[serde(default = "default_transfer_cluster")]
    pub transfer_cluster_id: String,
    #[serde(default)]
    pub resource: ResourceConfig,
}

/// Coordinates of the data-id custom resource definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_resource_group")]
    pub group: String,
    #[serde(default = "default_resource_version")]
    pub version: String,
    #[serde(default = "default_resource_kind")]
    pub kind: String,
    #[serde(default = "default_resource_plural")]
    pub plural: String,
}

impl ConcurrencyLimits {
    pub fn new(default_concurrency: usize) -> Self {
        Self {
            default_concurrency,
            per_task: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, task: &str, limit: usize) -> Self {
        self.per_task.insert(task.to_string(), limit);
        self
    }

    /// Resolve the worker cap for a refresh task.
    pub fn limit_for(&self, task: &str) -> usize {
        self.per_task
            .get(task)
            .copied()
            .unwrap_or(self.default_concurrency)
            .max(1)
    }
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            default_concurrency: DEFAULT_CONCURRENCY,
            query_chunk_size: 0,
            concurrency: HashMap::new(),
        }
    }
}

impl RefreshConfig {
    pub fn limits(&self) -> ConcurrencyLimits {
        ConcurrencyLimits {
            default_concurrency: self.default_concurrency,
            per_task: self.concurrency.clone(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_gateway_domain: default_gateway_domain(),
            api_gateway_token: String::new(),
            bk_env_label: String::new(),
            enable_gray: false,
            gray_cluster_ids: Vec::new(),
            kafka_storage_cluster_id: 0,
            custom_event_storage_cluster_id: 0,
            influxdb_default_proxy_cluster_name: default_proxy_cluster_name(),
            app_code: default_app_code(),
            transfer_cluster_id: default_transfer_cluster(),
            resource: ResourceConfig::default(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            group: default_resource_group(),
            version: default_resource_version(),
            kind: default_resource_kind(),
            plural: default_resource_plural(),
        }
    }
}

impl ResourceConfig {
    /// `group/version` as used in a resource's `apiVersion`.
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }
}

impl ClusterConfig {
    /// Whether a cluster passes the gray-release allow list.
    pub fn is_cluster_in_gray(&self, cluster_id: &str) -> bool {
        if !self.enable_gray {
            return true;
        }
        self.gray_cluster_ids.iter().any(|id| id == cluster_id)
    }
}

impl ControlPlaneConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ControlPlaneConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gateway_domain() -> String {
    "https://127.0.0.1:443".to_string()
}

fn default_proxy_cluster_name() -> String {
    "default".to_string()
}

fn default_app_code() -> String {
    "bk_monitorv3".to_string()
}

fn default_transfer_cluster() -> String {
    "default".to_string()
}

fn default_resource_group() -> String {
    "monitoring.bk.tencent.com".to_string()
}

fn default_resource_version() -> String {
    "v1beta1".to_string()
}

fn default_resource_kind() -> String {
    "DataID".to_string()
}

fn default_resource_plural() -> String {
    "dataids".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ControlPlaneConfig::from_toml_str("").unwrap();
        assert_eq!(config.refresh.limits().limit_for("refresh_es_storage"), DEFAULT_CONCURRENCY);
        assert_eq!(config.refresh.query_chunk_size, 0);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.cluster.resource.api_version(), "monitoring.bk.tencent.com/v1beta1");
    }

    #[test]
    fn parses_per_task_limits() {
        let toml_str = r#"
[refresh]
default_concurrency = 4
query_chunk_size = 500

[refresh.concurrency]
refresh_es_storage = 2
refresh_datasource = 0
"#;
        let config = ControlPlaneConfig::from_toml_str(toml_str).unwrap();
        let limits = config.refresh.limits();
        assert_eq!(limits.limit_for("refresh_es_storage"), 2);
        assert_eq!(limits.limit_for("refresh_kafka_topic_info"), 4);
        // Zero is clamped so a pass can always make progress.
        assert_eq!(limits.limit_for("refresh_datasource"), 1);
        assert_eq!(config.refresh.query_chunk_size, 500);
    }

    #[test]
    fn gray_list_only_applies_when_enabled() {
        let mut cluster = ClusterConfig::default();
        cluster.gray_cluster_ids = vec!["BCS-K8S-00001".to_string()];
        assert!(cluster.is_cluster_in_gray("BCS-K8S-00002"));

        cluster.enable_gray = true;
        assert!(cluster.is_cluster_in_gray("BCS-K8S-00001"));
        assert!(!cluster.is_cluster_in_gray("BCS-K8S-00002"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metasync.toml");
        std::fs::write(
            &path,
            "[cluster]\nenable_gray = true\ngray_cluster_ids = [\"BCS-K8S-1\"]\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = ControlPlaneConfig::from_file(&path).unwrap();
        assert!(config.cluster.enable_gray);
        assert_eq!(config.cluster.gray_cluster_ids, vec!["BCS-K8S-1"]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ControlPlaneConfig::from_file(Path::new("/nonexistent/metasync.toml")).is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = ControlPlaneConfig::default();
        config.cluster.bk_env_label = "prod".to_string();
        config.refresh.default_concurrency = 3;
        config.refresh.concurrency.insert("refresh_es_restore".to_string(), 7);

        let rendered = config.to_toml_string().unwrap();
        let parsed = ControlPlaneConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.cluster.bk_env_label, "prod");
        assert_eq!(parsed.refresh.limits(), config.refresh.limits());
        assert_eq!(
            parsed.refresh.limits(),
            ConcurrencyLimits::new(3).with_limit("refresh_es_restore", 7)
        );
    }
}
