//! redb table definitions, one per record kind.

use redb::TableDefinition;

use crate::types::*;

pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Table holding records of kind `R`.
pub fn table_for<R: Record>() -> RecordTable {
    TableDefinition::new(R::KIND)
}

/// Every table the store creates on open.
pub const ALL_KINDS: &[&str] = &[
    ResultTable::KIND,
    DataSourceResultTable::KIND,
    DataSource::KIND,
    EsStorage::KIND,
    InfluxdbHostInfo::KIND,
    InfluxdbClusterInfo::KIND,
    InfluxdbStorage::KIND,
    AccessVmRecord::KIND,
    InfluxdbTagInfo::KIND,
    KafkaTopicInfo::KIND,
    RestoreJob::KIND,
    PodRecord::KIND,
    ReplaceConfig::KIND,
    ClusterRegistration::KIND,
];
