//! Per-table statistics: one histogram per column, built by a two-pass
//! scan through the buffer pool, plus the cost/cardinality queries a
//! planner would want from them.

use crate::{IntHistogram, Operator, StringHistogram};
use buffer::{BufferPool, BufferPoolCursor};
use catalog::Catalog;
use common::{DbError, DbResult};
use hashbrown::HashMap;
use storage::HeapFileIter;
use types::{Field, FieldType, TableId, TransactionId};

/// Collected per-column histograms and scan-cost inputs for one table.
pub struct TableStats {
    table_id: TableId,
    num_pages: i64,
    total_tuples: u64,
    io_cost_per_page: i64,
    int_histograms: HashMap<usize, IntHistogram>,
    string_histograms: HashMap<usize, StringHistogram>,
}

impl TableStats {
    /// Scan `table_id` twice through `pool`: once to discover each int
    /// column's `[min, max]`, once to fill every column's histogram.
    pub fn new(pool: &BufferPool, catalog: &dyn Catalog, table_id: TableId, io_cost_per_page: i64, histogram_buckets: usize) -> DbResult<Self> {
        let desc = catalog.tuple_desc(table_id)?.clone();

        let mut mins: HashMap<usize, i32> = HashMap::new();
        let mut maxs: HashMap<usize, i32> = HashMap::new();
        let mut total_tuples = 0u64;

        let pass1_tid = TransactionId::new();
        {
            let mut cursor = BufferPoolCursor::new(pool, pass1_tid);
            let mut iter = HeapFileIter::new(&mut cursor, table_id);
            iter.open()?;
            while let Some(tuple) = iter.next()? {
                total_tuples += 1;
                for (idx, field_desc) in desc.fields().iter().enumerate() {
                    if field_desc.field_type == FieldType::Int32
                        && let Some(Field::Int(v)) = tuple.field(idx)
                    {
                        mins.entry(idx).and_modify(|m| *m = (*m).min(*v)).or_insert(*v);
                        maxs.entry(idx).and_modify(|m| *m = (*m).max(*v)).or_insert(*v);
                    }
                }
            }
        }
        pool.transaction_complete(pass1_tid, true)?;

        let mut int_histograms = HashMap::new();
        let mut string_histograms = HashMap::new();
        for (idx, field_desc) in desc.fields().iter().enumerate() {
            match field_desc.field_type {
                FieldType::Int32 => {
                    let min = *mins.get(&idx).unwrap_or(&0);
                    let max = *maxs.get(&idx).unwrap_or(&0);
                    int_histograms.insert(idx, IntHistogram::new(histogram_buckets, min, max)?);
                }
                FieldType::Str(_) => {
                    string_histograms.insert(idx, StringHistogram::new(histogram_buckets)?);
                }
            }
        }

        let pass2_tid = TransactionId::new();
        {
            let mut cursor = BufferPoolCursor::new(pool, pass2_tid);
            let mut iter = HeapFileIter::new(&mut cursor, table_id);
            iter.open()?;
            while let Some(tuple) = iter.next()? {
                for (idx, value) in tuple.values().iter().enumerate() {
                    match value {
                        Field::Int(v) => {
                            if let Some(h) = int_histograms.get_mut(&idx) {
                                h.add_value(*v);
                            }
                        }
                        Field::Str(s) => {
                            if let Some(h) = string_histograms.get_mut(&idx) {
                                h.add_value(s);
                            }
                        }
                    }
                }
            }
        }
        pool.transaction_complete(pass2_tid, true)?;

        Ok(Self {
            table_id,
            num_pages: pool.num_pages(table_id)?,
            total_tuples,
            io_cost_per_page,
            int_histograms,
            string_histograms,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn total_tuples(&self) -> u64 {
        self.total_tuples
    }

    pub fn estimate_scan_cost(&self) -> i64 {
        self.num_pages * self.io_cost_per_page
    }

    pub fn estimate_cardinality(&self, selectivity: f64) -> u64 {
        (self.total_tuples as f64 * selectivity).floor() as u64
    }

    pub fn estimate_selectivity(&self, field: usize, op: Operator, constant: &Field) -> DbResult<f64> {
        match constant {
            Field::Int(v) => self
                .int_histograms
                .get(&field)
                .map(|h| h.estimate_selectivity(op, *v))
                .ok_or_else(|| DbError::InvalidArgument(format!("no int histogram for field {field}"))),
            Field::Str(s) => self
                .string_histograms
                .get(&field)
                .map(|h| h.estimate_selectivity(op, s))
                .ok_or_else(|| DbError::InvalidArgument(format!("no string histogram for field {field}"))),
        }
    }

    pub fn avg_selectivity(&self, field: usize) -> DbResult<f64> {
        if let Some(h) = self.int_histograms.get(&field) {
            return Ok(h.avg_selectivity());
        }
        if let Some(h) = self.string_histograms.get(&field) {
            return Ok(h.avg_selectivity());
        }
        Err(DbError::InvalidArgument(format!("no histogram for field {field}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::HeapFile;
    use tempfile::tempdir;
    use types::{FieldDesc, FieldType, Tuple, TupleDesc};

    fn desc() -> TupleDesc {
        TupleDesc::try_new(vec![
            FieldDesc::new("id", FieldType::Int32),
            FieldDesc::new("name", FieldType::Str(16)),
        ])
        .unwrap()
    }

    #[test]
    fn two_pass_scan_builds_consistent_histograms() {
        let dir = tempdir().unwrap();
        let pool = BufferPool::new(8);
        let path = dir.path().join("t.tbl");
        let heap = HeapFile::open(&path, desc(), 4096).unwrap();
        let table_id = pool.register_table(heap);

        let setup_tid = TransactionId::new();
        for i in 0..20 {
            let tuple = Tuple::new(&desc(), vec![Field::Int(i), Field::Str(format!("n{i}"))]).unwrap();
            pool.insert_tuple(setup_tid, table_id, &tuple).unwrap();
        }
        pool.transaction_complete(setup_tid, true).unwrap();

        struct FixedCatalog(TupleDesc);
        impl Catalog for FixedCatalog {
            fn table_id_iterator(&self) -> Box<dyn Iterator<Item = TableId> + '_> {
                Box::new(std::iter::empty())
            }
            fn get_table_name(&self, _id: TableId) -> DbResult<&str> {
                Ok("t")
            }
            fn get_database_file(&self, _id: TableId) -> DbResult<&std::path::Path> {
                unimplemented!()
            }
            fn tuple_desc(&self, _id: TableId) -> DbResult<&TupleDesc> {
                Ok(&self.0)
            }
        }
        let fixed = FixedCatalog(desc());

        let stats = TableStats::new(&pool, &fixed, table_id, 1000, 10).unwrap();
        assert_eq!(stats.total_tuples(), 20);
        assert!(stats.estimate_scan_cost() > 0);
        assert_eq!(stats.estimate_cardinality(0.5), 10);

        let sel = stats.estimate_selectivity(0, Operator::LessThan, &Field::Int(10)).unwrap();
        assert!(sel > 0.0 && sel < 1.0);
    }
}
