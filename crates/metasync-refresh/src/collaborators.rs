//! Downstream sinks driven by the refresh passes.
//!
//! Each pass hands its eligible entities to one of these, one call per
//! entity. Implementations talk to the search engine, the message broker,
//! the routing store and so on; none of that lives in this crate.

use async_trait::async_trait;
use metasync_state::{
    AccessVmRecord, DataSource, EsStorage, InfluxdbClusterInfo, InfluxdbHostInfo, InfluxdbStorage,
    InfluxdbTagInfo, KafkaTopicInfo, Record, RestoreJob,
};

use crate::dispatch::Entity;

#[async_trait]
pub trait EsStorageManager: Send + Sync {
    /// Create or rotate indices and apply retention for one storage.
    async fn manage(&self, storage: &EsStorage) -> anyhow::Result<()>;
}

#[async_trait]
pub trait OuterConfigPublisher: Send + Sync {
    /// Re-publish everything derived from a data source.
    async fn refresh_outer_config(&self, source: &DataSource) -> anyhow::Result<()>;
}

#[async_trait]
pub trait RestorePoller: Send + Sync {
    /// Poll a restore job and return its completed document count.
    async fn poll_progress(&self, job: &RestoreJob) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait TopicCatalog: Send + Sync {
    /// Refresh partition metadata for one topic.
    async fn refresh_topic(&self, topic: &KafkaTopicInfo) -> anyhow::Result<()>;
}

/// One routing record published by the influxdb-route pass.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteEntry {
    Host(InfluxdbHostInfo),
    Cluster(InfluxdbClusterInfo),
    Storage(InfluxdbStorage),
    VmRoute(AccessVmRecord),
}

impl Entity for RouteEntry {
    fn id(&self) -> String {
        fn keyed<R: Record>(r: &R) -> String {
            format!("{}/{}", R::KIND, r.key())
        }
        match self {
            RouteEntry::Host(r) => keyed(r),
            RouteEntry::Cluster(r) => keyed(r),
            RouteEntry::Storage(r) => keyed(r),
            RouteEntry::VmRoute(r) => keyed(r),
        }
    }
}

#[async_trait]
pub trait RouteRegistry: Send + Sync {
    async fn publish(&self, entry: &RouteEntry) -> anyhow::Result<()>;

    /// Signal consumers that the routing table changed.
    async fn bump_version(&self) -> anyhow::Result<()>;

    /// Refresh what depends on a time-series storage outside the routing table.
    async fn refresh_storage_dependence(&self, storage: &InfluxdbStorage) -> anyhow::Result<()>;

    async fn publish_tag(&self, tag: &InfluxdbTagInfo) -> anyhow::Result<()>;
}
