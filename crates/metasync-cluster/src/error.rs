//! Error types for cluster reconciliation.

use metasync_state::StateError;
use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster {cluster_id} under project {project_id} is already registered")]
    AlreadyRegistered {
        cluster_id: String,
        project_id: String,
    },

    #[error("invalid business id: {0}")]
    InvalidBizId(String),

    #[error("invalid api gateway url {url}: {reason}")]
    InvalidGatewayUrl { url: String, reason: String },

    #[error("cluster {cluster_id} is missing field {field}")]
    MissingField {
        cluster_id: String,
        field: &'static str,
    },

    #[error("malformed {kind} document: {reason}")]
    Decode { kind: &'static str, reason: String },

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("inventory error: {0}")]
    Inventory(#[source] anyhow::Error),

    #[error("cluster manager error: {0}")]
    ClusterManager(#[source] anyhow::Error),

    #[error("provisioning error: {0}")]
    Provision(#[source] anyhow::Error),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Outcome of a call against a cluster's custom-resource API.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource {0} not found")]
    NotFound(String),

    #[error("resource api error: {0}")]
    Api(#[from] anyhow::Error),
}

impl ResourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::NotFound(_))
    }
}
