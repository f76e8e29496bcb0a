//! metasync-state: canonical metadata records and their store.
//!
//! Refresh passes and cluster reconcilers read metadata through the
//! [`MetadataStore`] trait. The crate ships one implementation,
//! [`StateStore`], backed by [redb](https://docs.rs/redb).
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  list_where / list_by_keys   ┌──────────────────┐
//!  │ refresh pass │ ───────────────────────────▶ │  MetadataStore   │
//!  └──────────────┘                              │  (trait)         │
//!  ┌──────────────┐  get / put / put_batch       │                  │
//!  │ cluster svc  │ ───────────────────────────▶ │  StateStore      │
//!  └──────────────┘                              │  redb, one table │
//!                                                │  per Record::KIND│
//!                                                └──────────────────┘
//! ```
//!
//! Every record kind lives in its own table keyed by [`Record::key`], with
//! the record JSON-serialized into a `&[u8]` value column. `StateStore` is
//! `Clone + Send + Sync` (backed by `Arc<Database>`) and can be shared
//! across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{MetadataStore, StateStore};
pub use types::*;
