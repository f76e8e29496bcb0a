//! Client coordinates for a registered cluster's API.

use metasync_state::ClusterRegistration;
use url::Url;

use crate::error::{ClusterError, ClusterResult};

const DEFAULT_SCHEME: &str = "https";

/// Where and how to reach a cluster through the API gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConnection {
    pub cluster_id: String,
    /// `{scheme}://{domain}:{port}/{server_address_path}/{cluster_id}`
    pub endpoint: String,
    /// Full `Authorization` value, e.g. `Bearer <token>`.
    pub bearer_token: String,
    pub skip_tls_verify: bool,
}

impl ClusterConnection {
    /// Build the connection for a cluster. The scheme is taken from the
    /// gateway url; host and port come from the registration row.
    pub fn for_cluster(cluster: &ClusterRegistration, gateway: &str) -> ClusterResult<Self> {
        let scheme = match Url::parse(gateway) {
            Ok(url) => url.scheme().to_string(),
            Err(url::ParseError::RelativeUrlWithoutBase) => DEFAULT_SCHEME.to_string(),
            Err(e) => {
                return Err(ClusterError::InvalidGatewayUrl {
                    url: gateway.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Ok(Self {
            cluster_id: cluster.cluster_id.clone(),
            endpoint: format!(
                "{}://{}:{}/{}/{}",
                scheme,
                cluster.domain_name,
                cluster.port,
                cluster.server_address_path,
                cluster.cluster_id
            ),
            bearer_token: format!("{} {}", cluster.api_key_prefix, cluster.api_key_content),
            skip_tls_verify: cluster.is_skip_ssl_verify,
        })
    }
}
