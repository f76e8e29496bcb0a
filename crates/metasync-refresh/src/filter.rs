//! Metadata consistency filtering.
//!
//! Storage and data-source records are only refreshed while the result
//! tables they feed are enabled and not soft-deleted.

use std::collections::HashSet;

use metasync_state::{
    DataSource, DataSourceResultTable, MetadataStore, Record, ResultTable, StateResult,
};
use tracing::warn;

/// Split `ids` into query chunks. A chunk size of 0 means one chunk.
pub fn chunk_ids(ids: &[String], chunk_size: usize) -> Vec<&[String]> {
    if ids.is_empty() {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![ids];
    }
    ids.chunks(chunk_size).collect()
}

/// Fetch records by key, one query per chunk.
///
/// A failing chunk is logged and skipped; the rest are still returned.
pub fn list_chunked<R: Record, S: MetadataStore>(store: &S, ids: &[String], chunk_size: usize) -> Vec<R> {
    let mut records = Vec::new();
    for chunk in chunk_ids(ids, chunk_size) {
        match store.list_by_keys::<R>(chunk) {
            Ok(found) => records.extend(found),
            Err(e) => warn!(kind = R::KIND, chunk = chunk.len(), error = %e, "chunk query failed, skipping"),
        }
    }
    records
}

/// The subset of `table_ids` that exist, are enabled and are not deleted.
pub fn active_table_ids<S: MetadataStore>(store: &S, table_ids: &[String], chunk_size: usize) -> HashSet<String> {
    list_chunked::<ResultTable, S>(store, table_ids, chunk_size)
        .into_iter()
        .filter(ResultTable::is_active)
        .map(|rt| rt.table_id)
        .collect()
}

/// Keep the records whose owning table is active.
pub fn retain_active<R, S, F>(store: &S, records: Vec<R>, table_of: F, chunk_size: usize) -> Vec<R>
where
    S: MetadataStore,
    F: Fn(&R) -> &str,
{
    let table_ids: Vec<String> = records.iter().map(|r| table_of(r).to_string()).collect();
    let active = active_table_ids(store, &table_ids, chunk_size);
    records
        .into_iter()
        .filter(|r| active.contains(table_of(r)))
        .collect()
}

/// Data ids linked to an active table, first occurrence order.
pub fn eligible_data_ids(links: &[DataSourceResultTable], active: &HashSet<String>) -> Vec<u32> {
    let mut seen = HashSet::new();
    links
        .iter()
        .filter(|link| active.contains(&link.table_id))
        .filter(|link| seen.insert(link.bk_data_id))
        .map(|link| link.bk_data_id)
        .collect()
}

/// Enabled data sources from the recognized channel, newest first.
///
/// Unlike the table lookup, a failed query here fails the whole call.
pub fn refreshable_data_sources<S: MetadataStore>(
    store: &S,
    data_ids: &[u32],
) -> StateResult<Vec<DataSource>> {
    let keys: Vec<String> = data_ids.iter().map(u32::to_string).collect();
    let mut sources: Vec<DataSource> = store
        .list_by_keys::<DataSource>(&keys)?
        .into_iter()
        .filter(DataSource::is_refreshable)
        .collect();
    sources.sort_by(|a, b| b.last_modify_time.cmp(&a.last_modify_time));
    Ok(sources)
}
