//! StateStore: redb-backed metadata persistence.
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns, one
//! table per record kind. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::{ALL_KINDS, table_for};
use crate::types::Record;

/// `Display` error to a string-carrying `StateError` variant.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Read/write access to canonical metadata.
///
/// Reads may run concurrently from many tasks. Writes are rare (cluster
/// registration and cloud-id inference) and need no cross-record
/// transactions.
pub trait MetadataStore: Clone + Send + Sync + 'static {
    /// All records of kind `R` matching `predicate`.
    fn list_where<R, F>(&self, predicate: F) -> StateResult<Vec<R>>
    where
        R: Record,
        F: Fn(&R) -> bool;

    fn list_all<R: Record>(&self) -> StateResult<Vec<R>> {
        self.list_where(|_: &R| true)
    }

    /// Records whose key is in `keys`. Missing keys are skipped.
    fn list_by_keys<R: Record>(&self, keys: &[String]) -> StateResult<Vec<R>>;

    fn get<R: Record>(&self, key: &str) -> StateResult<Option<R>>;

    /// Insert or replace a record.
    fn put<R: Record>(&self, record: &R) -> StateResult<()>;

    /// Insert or replace several records in one transaction.
    fn put_batch<R: Record>(&self, records: &[R]) -> StateResult<()>;
}

/// Thread-safe metadata store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "metadata store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory metadata store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        for kind in ALL_KINDS {
            let def: TableDefinition<&str, &[u8]> = TableDefinition::new(*kind);
            txn.open_table(def).map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }

    fn decode<R: Record>(bytes: &[u8]) -> StateResult<R> {
        serde_json::from_slice(bytes).map_err(|e| StateError::Decode {
            kind: R::KIND,
            reason: e.to_string(),
        })
    }
}

impl MetadataStore for StateStore {
    fn list_where<R, F>(&self, predicate: F) -> StateResult<Vec<R>>
    where
        R: Record,
        F: Fn(&R) -> bool,
    {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(table_for::<R>()).map_err(map_err!(Backend))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Backend))? {
            let (_, value) = entry.map_err(map_err!(Backend))?;
            let record: R = Self::decode(value.value())?;
            if predicate(&record) {
                results.push(record);
            }
        }
        Ok(results)
    }

    fn list_by_keys<R: Record>(&self, keys: &[String]) -> StateResult<Vec<R>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(table_for::<R>()).map_err(map_err!(Backend))?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(guard) = table.get(key.as_str()).map_err(map_err!(Backend))? {
                results.push(Self::decode(guard.value())?);
            }
        }
        Ok(results)
    }

    fn get<R: Record>(&self, key: &str) -> StateResult<Option<R>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(table_for::<R>()).map_err(map_err!(Backend))?;
        match table.get(key).map_err(map_err!(Backend))? {
            Some(guard) => Ok(Some(Self::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn put<R: Record>(&self, record: &R) -> StateResult<()> {
        self.put_batch(std::slice::from_ref(record))
    }

    fn put_batch<R: Record>(&self, records: &[R]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(table_for::<R>()).map_err(map_err!(Backend))?;
            for record in records {
                let key = record.key();
                let value = serde_json::to_vec(record).map_err(|e| StateError::Encode {
                    kind: R::KIND,
                    reason: e.to_string(),
                })?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Backend))?;
            }
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(kind = R::KIND, count = records.len(), "records stored");
        Ok(())
    }
}
