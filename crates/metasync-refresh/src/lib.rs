//! metasync-refresh: periodic refresh passes over control-plane metadata.
//!
//! Each pass loads candidate records from the [`MetadataStore`], narrows
//! them to the ones still backed by an active result table, and hands the
//! survivors to a downstream sink with bounded concurrency.
//!
//! # Architecture
//!
//! ```text
//! Refresher<S: MetadataStore>
//!   ├── load        list_where / list_all (failure aborts the pass)
//!   ├── filter      chunked result-table lookups, data-id dedup
//!   ├── Dispatcher  Semaphore(limit_for(task)) + JoinSet + catch_unwind
//!   └── sinks       EsStorageManager, OuterConfigPublisher, RestorePoller,
//!                   TopicCatalog, RouteRegistry, ClusterService
//! ```
//!
//! [`MetadataStore`]: metasync_state::MetadataStore

pub mod collaborators;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod refresher;

pub use collaborators::{
    EsStorageManager, OuterConfigPublisher, RestorePoller, RouteEntry, RouteRegistry, TopicCatalog,
};
pub use dispatch::{DispatchSummary, Dispatcher, Entity};
pub use error::{RefreshError, RefreshResult};
pub use refresher::{PassOutcome, Refresher};
