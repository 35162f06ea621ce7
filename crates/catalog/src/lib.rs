//! Minimal catalog collaborator: a name/id registry sufficient to drive
//! table statistics and exercise the storage/buffer layers in tests,
//! standing in for the full SQL-facing catalog service (DDL, indexes,
//! on-disk persistence), which sit outside this build.

use ahash::RandomState;
use common::{DbError, DbResult};
use hashbrown::HashMap;
use std::path::{Path, PathBuf};
use types::{TableId, TupleDesc};

#[cfg(test)]
mod tests;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Name/id/schema registry a table statistics computation and a query
/// planner would consult. Implementors need not persist anything; the
/// in-memory implementation below is the only one this build ships.
pub trait Catalog {
    fn table_id_iterator(&self) -> Box<dyn Iterator<Item = TableId> + '_>;
    fn get_table_name(&self, id: TableId) -> DbResult<&str>;
    fn get_database_file(&self, id: TableId) -> DbResult<&Path>;
    fn tuple_desc(&self, id: TableId) -> DbResult<&TupleDesc>;
}

struct TableEntry {
    name: String,
    path: PathBuf,
    desc: TupleDesc,
}

/// A small in-process registry implementing [`Catalog`]. Not the
/// SQL-facing catalog service: no indexes, no DDL, no persistence.
#[derive(Default)]
pub struct InMemoryCatalog {
    tables: Vec<TableEntry>,
    by_name: Map<String, usize>,
    by_id: Map<TableId, usize>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table, returning a fresh `TableId`. Ids are assigned
    /// sequentially starting at 1; they are not derived from the heap
    /// file's own path hash, since a catalog entry may be registered
    /// before its file exists on disk.
    pub fn register_table(&mut self, name: impl Into<String>, desc: TupleDesc, path: impl Into<PathBuf>) -> DbResult<TableId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(DbError::Catalog(format!("table '{name}' already registered")));
        }
        let id = TableId(self.tables.len() as i64 + 1);
        let index = self.tables.len();
        self.tables.push(TableEntry {
            name: name.clone(),
            path: path.into(),
            desc,
        });
        self.by_name.insert(name, index);
        self.by_id.insert(id, index);
        Ok(id)
    }

    fn entry(&self, id: TableId) -> DbResult<&TableEntry> {
        let index = self
            .by_id
            .get(&id)
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {id:?}")))?;
        Ok(&self.tables[*index])
    }
}

impl Catalog for InMemoryCatalog {
    fn table_id_iterator(&self) -> Box<dyn Iterator<Item = TableId> + '_> {
        Box::new(self.by_id.keys().copied())
    }

    fn get_table_name(&self, id: TableId) -> DbResult<&str> {
        Ok(self.entry(id)?.name.as_str())
    }

    fn get_database_file(&self, id: TableId) -> DbResult<&Path> {
        Ok(self.entry(id)?.path.as_path())
    }

    fn tuple_desc(&self, id: TableId) -> DbResult<&TupleDesc> {
        Ok(&self.entry(id)?.desc)
    }
}
