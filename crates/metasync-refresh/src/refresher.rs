//! Refresh passes over the metadata store.
//!
//! Every pass follows the same shape: check for shutdown, load candidate
//! records, narrow them, return early when nothing is left, check for
//! shutdown again, then fan the survivors out through the [`Dispatcher`]
//! and wait for all of them. A failed initial load aborts the pass;
//! everything after that is per entity.

use std::sync::Arc;

use metasync_cluster::ClusterService;
use metasync_core::config::RefreshConfig;
use metasync_state::{
    AccessVmRecord, ClusterRegistration, DataSource, DataSourceResultTable, EsStorage, InfluxdbClusterInfo,
    InfluxdbHostInfo, InfluxdbStorage, InfluxdbTagInfo, KafkaTopicInfo, MetadataStore, Record,
    RestoreJob,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::collaborators::{
    EsStorageManager, OuterConfigPublisher, RestorePoller, RouteEntry, RouteRegistry, TopicCatalog,
};
use crate::dispatch::{DispatchSummary, Dispatcher, Entity};
use crate::error::{RefreshError, RefreshResult};
use crate::filter;

pub const REFRESH_ES_STORAGE: &str = "refresh_es_storage";
pub const REFRESH_DATASOURCE: &str = "refresh_datasource";
pub const REFRESH_ES_RESTORE: &str = "refresh_es_restore";
pub const REFRESH_KAFKA_TOPIC_INFO: &str = "refresh_kafka_topic_info";
pub const REFRESH_INFLUXDB_ROUTE: &str = "refresh_influxdb_route";
pub const REFRESH_CLUSTER_RESOURCE: &str = "refresh_cluster_resource";

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing was eligible.
    Empty,
    /// Shutdown was requested before dispatch.
    Cancelled,
    Dispatched { entities: usize },
}

pub struct Refresher<S> {
    store: S,
    dispatcher: Dispatcher,
    chunk_size: usize,
    shutdown: watch::Receiver<bool>,
}

impl<S: MetadataStore> Refresher<S> {
    pub fn new(store: S, config: &RefreshConfig) -> Self {
        let (_tx, shutdown) = watch::channel(false);
        Self {
            store,
            dispatcher: Dispatcher::new(config.limits()),
            chunk_size: config.query_chunk_size,
            shutdown,
        }
    }

    /// Stop starting new passes once `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn cancelled(&self, task: &str) -> bool {
        let cancelled = *self.shutdown.borrow();
        if cancelled {
            info!(task, "shutdown requested, skipping refresh");
        }
        cancelled
    }

    fn load<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> RefreshResult<Vec<R>> {
        self.store
            .list_where(predicate)
            .map_err(RefreshError::load(R::KIND))
    }

    /// Shared tail of every pass: empty check, cancel check, dispatch.
    async fn dispatch<T, F, Fut>(&self, task: &str, entities: Vec<T>, reconcile: F) -> PassOutcome
    where
        T: Entity,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if entities.is_empty() {
            info!(task, "nothing to refresh");
            return PassOutcome::Empty;
        }
        if self.cancelled(task) {
            return PassOutcome::Cancelled;
        }
        let DispatchSummary { dispatched, .. } = self.dispatcher.run(task, entities, reconcile).await;
        PassOutcome::Dispatched { entities: dispatched }
    }

    /// Manage indices for every search-engine storage whose table is active.
    pub async fn refresh_es_storage(
        &self,
        manager: Arc<dyn EsStorageManager>,
    ) -> RefreshResult<PassOutcome> {
        if self.cancelled(REFRESH_ES_STORAGE) {
            return Ok(PassOutcome::Cancelled);
        }
        let storages: Vec<EsStorage> = self.load(|_| true)?;
        let storages = filter::retain_active(
            &self.store,
            storages,
            |s: &EsStorage| s.table_id.as_str(),
            self.chunk_size,
        );

        Ok(self
            .dispatch(REFRESH_ES_STORAGE, storages, move |storage| {
                let manager = manager.clone();
                async move { manager.manage(&storage).await }
            })
            .await)
    }

    /// Re-publish outer config for data sources feeding active tables.
    pub async fn refresh_datasource(
        &self,
        publisher: Arc<dyn OuterConfigPublisher>,
    ) -> RefreshResult<PassOutcome> {
        if self.cancelled(REFRESH_DATASOURCE) {
            return Ok(PassOutcome::Cancelled);
        }
        let links: Vec<DataSourceResultTable> = self.load(|_| true)?;
        if links.is_empty() {
            info!(task = REFRESH_DATASOURCE, "no data source links");
            return Ok(PassOutcome::Empty);
        }

        let table_ids: Vec<String> = links.iter().map(|l| l.table_id.clone()).collect();
        let active = filter::active_table_ids(&self.store, &table_ids, self.chunk_size);
        if active.is_empty() {
            warn!(task = REFRESH_DATASOURCE, "no enabled result table found");
            return Ok(PassOutcome::Empty);
        }
        let data_ids = filter::eligible_data_ids(&links, &active);
        let sources = filter::refreshable_data_sources(&self.store, &data_ids)
            .map_err(RefreshError::load(DataSource::KIND))?;
        debug!(
            task = REFRESH_DATASOURCE,
            links = links.len(),
            data_ids = data_ids.len(),
            sources = sources.len(),
            "data sources resolved"
        );

        Ok(self
            .dispatch(REFRESH_DATASOURCE, sources, move |source| {
                let publisher = publisher.clone();
                async move { publisher.refresh_outer_config(&source).await }
            })
            .await)
    }

    /// Poll progress of restore jobs that have not finished.
    pub async fn refresh_es_restore(
        &self,
        poller: Arc<dyn RestorePoller>,
    ) -> RefreshResult<PassOutcome> {
        if self.cancelled(REFRESH_ES_RESTORE) {
            return Ok(PassOutcome::Cancelled);
        }
        let jobs: Vec<RestoreJob> = self.load(|j: &RestoreJob| !j.is_deleted)?;
        let pending: Vec<RestoreJob> = jobs.into_iter().filter(|j| !j.is_done()).collect();

        Ok(self
            .dispatch(REFRESH_ES_RESTORE, pending, move |job| {
                let poller = poller.clone();
                async move {
                    let complete = poller.poll_progress(&job).await?;
                    debug!(restore_id = job.restore_id, complete, total = job.total_doc_count, "restore progress");
                    Ok::<(), anyhow::Error>(())
                }
            })
            .await)
    }

    /// Refresh partition metadata for every topic.
    pub async fn refresh_kafka_topic_info(
        &self,
        catalog: Arc<dyn TopicCatalog>,
    ) -> RefreshResult<PassOutcome> {
        if self.cancelled(REFRESH_KAFKA_TOPIC_INFO) {
            return Ok(PassOutcome::Cancelled);
        }
        let topics: Vec<KafkaTopicInfo> = self.load(|_| true)?;

        Ok(self
            .dispatch(REFRESH_KAFKA_TOPIC_INFO, topics, move |topic| {
                let catalog = catalog.clone();
                async move { catalog.refresh_topic(&topic).await }
            })
            .await)
    }

    /// Load one stage's records, logging and skipping on failure.
    fn load_stage<R: Record>(&self) -> Option<Vec<R>> {
        match self.store.list_all::<R>() {
            Ok(records) => Some(records),
            Err(e) => {
                warn!(task = REFRESH_INFLUXDB_ROUTE, kind = R::KIND, error = %e, "stage load failed, skipping");
                None
            }
        }
    }

    async fn publish_routes<R: Record>(
        &self,
        registry: &Arc<dyn RouteRegistry>,
        records: &[R],
        wrap: fn(R) -> RouteEntry,
    ) {
        if records.is_empty() {
            return;
        }
        let entries: Vec<RouteEntry> = records.iter().cloned().map(wrap).collect();
        let registry = registry.clone();
        self.dispatcher
            .run(REFRESH_INFLUXDB_ROUTE, entries, move |entry| {
                let registry = registry.clone();
                async move { registry.publish(&entry).await }
            })
            .await;
    }

    /// Publish the time-series routing table.
    ///
    /// Stages run in a fixed order: hosts, clusters, storages, vm routes,
    /// version bump, storage dependencies, tags. A stage whose records
    /// cannot be loaded is skipped; later stages still run. The reported
    /// entity count covers each loaded record once.
    pub async fn refresh_influxdb_route(
        &self,
        registry: Arc<dyn RouteRegistry>,
    ) -> RefreshResult<PassOutcome> {
        let task = REFRESH_INFLUXDB_ROUTE;
        if self.cancelled(task) {
            return Ok(PassOutcome::Cancelled);
        }

        let hosts = self.load_stage::<InfluxdbHostInfo>().unwrap_or_default();
        let clusters = self.load_stage::<InfluxdbClusterInfo>().unwrap_or_default();
        let storages = self.load_stage::<InfluxdbStorage>();
        let vm_routes = self.load_stage::<AccessVmRecord>().unwrap_or_default();
        let tags = self.load_stage::<InfluxdbTagInfo>().unwrap_or_default();
        let entities = hosts.len()
            + clusters.len()
            + storages.as_ref().map_or(0, Vec::len)
            + vm_routes.len()
            + tags.len();
        if self.cancelled(task) {
            return Ok(PassOutcome::Cancelled);
        }

        self.publish_routes(&registry, &hosts, RouteEntry::Host).await;
        self.publish_routes(&registry, &clusters, RouteEntry::Cluster).await;
        if let Some(storages) = &storages {
            self.publish_routes(&registry, storages, RouteEntry::Storage).await;
        }
        self.publish_routes(&registry, &vm_routes, RouteEntry::VmRoute).await;

        match registry.bump_version().await {
            Ok(()) => info!(task, "route version refreshed"),
            Err(e) => warn!(task, error = %e, "route version refresh failed"),
        }

        // Dependencies still refresh when the publish stage lost its storages.
        let storages = match storages {
            Some(storages) => Some(storages),
            None => self.load_stage::<InfluxdbStorage>(),
        };
        if let Some(storages) = storages.filter(|s| !s.is_empty()) {
            let registry = registry.clone();
            self.dispatcher
                .run(task, storages, move |storage| {
                    let registry = registry.clone();
                    async move { registry.refresh_storage_dependence(&storage).await }
                })
                .await;
        }

        if !tags.is_empty() {
            let registry = registry.clone();
            self.dispatcher
                .run(task, tags, move |tag| {
                    let registry = registry.clone();
                    async move { registry.publish_tag(&tag).await }
                })
                .await;
        }

        if entities == 0 {
            return Ok(PassOutcome::Empty);
        }
        Ok(PassOutcome::Dispatched { entities })
    }

    /// Cloud-id inference and data-id resource sync for running clusters.
    pub async fn refresh_cluster_resource(
        &self,
        service: Arc<ClusterService<S>>,
    ) -> RefreshResult<PassOutcome> {
        if self.cancelled(REFRESH_CLUSTER_RESOURCE) {
            return Ok(PassOutcome::Cancelled);
        }
        let clusters: Vec<ClusterRegistration> = self.load(ClusterRegistration::is_running)?;

        Ok(self
            .dispatch(REFRESH_CLUSTER_RESOURCE, clusters, move |cluster| {
                let service = service.clone();
                async move {
                    let stats = service.refresh_cluster_resource(&cluster).await?;
                    info!(
                        cluster_id = %cluster.cluster_id,
                        created = stats.created,
                        updated = stats.updated,
                        unchanged = stats.unchanged,
                        failed = stats.failed,
                        "cluster resources refreshed"
                    );
                    Ok::<(), anyhow::Error>(())
                }
            })
            .await)
    }
}
