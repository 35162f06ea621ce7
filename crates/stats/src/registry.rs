//! Process-wide registry of computed table statistics, keyed by table
//! name.

use crate::TableStats;
use buffer::BufferPool;
use catalog::Catalog;
use common::DbResult;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};

/// Thread-safe table-name → `TableStats` map, populated by
/// [`compute_statistics`](StatisticsRegistry::compute_statistics) against
/// a catalog collaborator.
pub struct StatisticsRegistry {
    entries: RwLock<HashMap<String, Arc<TableStats>>>,
}

impl StatisticsRegistry {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide instance every planner-facing caller should use.
    pub fn global() -> &'static StatisticsRegistry {
        static INSTANCE: Lazy<StatisticsRegistry> = Lazy::new(StatisticsRegistry::new);
        &INSTANCE
    }

    /// Recompute statistics for every table the catalog knows about and
    /// replace this registry's contents with the results.
    pub fn compute_statistics(&self, pool: &BufferPool, catalog: &dyn Catalog, io_cost_per_page: i64, histogram_buckets: usize) -> DbResult<()> {
        for table_id in catalog.table_id_iterator() {
            let name = catalog.get_table_name(table_id)?.to_string();
            let stats = TableStats::new(pool, catalog, table_id, io_cost_per_page, histogram_buckets)?;
            self.entries.write().unwrap().insert(name, Arc::new(stats));
        }
        Ok(())
    }

    pub fn get(&self, table_name: &str) -> Option<Arc<TableStats>> {
        self.entries.read().unwrap().get(table_name).cloned()
    }
}

impl Default for StatisticsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::HeapFile;
    use tempfile::tempdir;
    use types::{Field, FieldDesc, FieldType, TableId, TransactionId, Tuple, TupleDesc};

    fn desc() -> TupleDesc {
        TupleDesc::try_new(vec![FieldDesc::new("id", FieldType::Int32)]).unwrap()
    }

    /// A single-table catalog view keyed by whatever table id the buffer
    /// pool actually assigned, since that id (a hash of the heap file's
    /// path) is independent of any id a separate catalog registration
    /// would hand out.
    struct SingleTableCatalog {
        table_id: TableId,
        name: &'static str,
        desc: TupleDesc,
    }

    impl Catalog for SingleTableCatalog {
        fn table_id_iterator(&self) -> Box<dyn Iterator<Item = TableId> + '_> {
            Box::new(std::iter::once(self.table_id))
        }
        fn get_table_name(&self, _id: TableId) -> DbResult<&str> {
            Ok(self.name)
        }
        fn get_database_file(&self, _id: TableId) -> DbResult<&std::path::Path> {
            unimplemented!("not exercised by this test")
        }
        fn tuple_desc(&self, _id: TableId) -> DbResult<&TupleDesc> {
            Ok(&self.desc)
        }
    }

    #[test]
    fn compute_statistics_populates_one_entry_per_table() {
        let dir = tempdir().unwrap();
        let pool = BufferPool::new(8);
        let path = dir.path().join("t.tbl");
        let heap = HeapFile::open(&path, desc(), 4096).unwrap();
        let table_id = pool.register_table(heap);

        let tid = TransactionId::new();
        let tuple = Tuple::new(&desc(), vec![Field::Int(1)]).unwrap();
        pool.insert_tuple(tid, table_id, &tuple).unwrap();
        pool.transaction_complete(tid, true).unwrap();

        let catalog = SingleTableCatalog {
            table_id,
            name: "people",
            desc: desc(),
        };

        let registry = StatisticsRegistry::default();
        registry.compute_statistics(&pool, &catalog, 1000, 10).unwrap();
        assert!(registry.get("people").is_some());
        assert!(registry.get("nobody").is_none());
    }
}
