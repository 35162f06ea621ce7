//! Buffer pool manager: page-level caching fronting one or more heap
//! files, enforcing two-phase locking on access and a NO-STEAL eviction
//! policy so that transaction rollback can always fall back to re-reading
//! a page from disk.
//!
//! Insert/delete are orchestrated here rather than in `storage::HeapFile`:
//! the pool already owns both the cache and the registered heap files, so
//! giving it the scan/allocate logic avoids a circular call graph between
//! the storage and buffer layers.

#[cfg(test)]
mod tests;

use common::{DbError, DbResult};
use hashbrown::HashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use storage::{HeapFile, Page, PageSource};
use txn::LockManager;
use types::{LockMode, PageId, Permission, RecordId, TableId, TransactionId, Tuple};

#[derive(Debug)]
struct CacheEntry {
    page: Page,
    dirty_by: Option<TransactionId>,
}

struct Inner {
    cache: LruCache<PageId, CacheEntry>,
    capacity: usize,
    tables: HashMap<TableId, HeapFile>,
}

impl Inner {
    fn heap_file_mut(&mut self, table_id: TableId) -> DbResult<&mut HeapFile> {
        self.tables
            .get_mut(&table_id)
            .ok_or_else(|| DbError::Storage(format!("table {table_id:?} is not registered with this buffer pool")))
    }

    /// Fetch a page from cache, promoting it to most-recently-used, or load
    /// it from its heap file on a miss, evicting first if necessary.
    fn get_or_load(&mut self, pid: PageId) -> DbResult<Page> {
        if let Some(entry) = self.cache.get(&pid) {
            return Ok(entry.page.clone());
        }
        self.evict_if_needed()?;
        let page = self.heap_file_mut(TableId(pid.table_id))?.read_page(pid.page_number)?;
        self.cache.put(
            pid,
            CacheEntry {
                page: page.clone(),
                dirty_by: None,
            },
        );
        Ok(page)
    }

    /// Evict the least-recently-used *clean* entry. Never writes to disk;
    /// fails with `DbError::Storage` ("NoCleanPage") if every resident
    /// page is dirty.
    fn evict_if_needed(&mut self) -> DbResult<()> {
        if self.cache.len() < self.capacity {
            return Ok(());
        }
        // `iter()` walks most-recently-used first; the last clean entry
        // seen is therefore the one nearest the LRU tail.
        let victim = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.dirty_by.is_none())
            .map(|(pid, _)| *pid)
            .last();
        match victim {
            Some(pid) => {
                self.cache.pop(&pid);
                Ok(())
            }
            None => Err(DbError::Storage("no clean page available to evict (NoCleanPage)".into())),
        }
    }

    fn store_dirty(&mut self, tid: TransactionId, pid: PageId, page: Page) {
        self.cache.put(pid, CacheEntry { page, dirty_by: Some(tid) });
    }

    fn flush_one(&mut self, pid: PageId) -> DbResult<()> {
        let is_dirty = matches!(self.cache.peek(&pid), Some(entry) if entry.dirty_by.is_some());
        if !is_dirty {
            return Ok(());
        }
        let page = self.cache.peek(&pid).unwrap().page.clone();
        self.heap_file_mut(TableId(pid.table_id))?.write_page(&page)?;
        if let Some(entry) = self.cache.peek_mut(&pid) {
            entry.dirty_by = None;
        }
        Ok(())
    }
}

/// Bounded, LRU-ordered cache of pages fronting one or more registered
/// heap files. All mutating operations serialize on an internal mutex;
/// lock acquisition (with its own timeout-based back-off) happens before
/// that mutex is taken, so contention on one page never blocks unrelated
/// cache traffic indefinitely.
pub struct BufferPool {
    inner: Mutex<Inner>,
    locks: LockManager,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            inner: Mutex::new(Inner {
                cache: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
                capacity,
                tables: HashMap::new(),
            }),
            locks: LockManager::new(),
        }
    }

    /// Register a heap file with this pool, returning its table id. The
    /// pool is the only path through which pages of a registered table
    /// should be read or written from then on.
    pub fn register_table(&self, heap_file: HeapFile) -> TableId {
        let table_id = heap_file.table_id();
        let mut inner = self.inner.lock().unwrap();
        inner.tables.insert(table_id, heap_file);
        table_id
    }

    pub fn num_pages(&self, table_id: TableId) -> DbResult<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.heap_file_mut(table_id)?.num_pages()
    }

    /// Acquire `tid`'s lock on `pid` (blocking with back-off, per
    /// [`LockManager::acquire_blocking`]), then return the page, resident
    /// or freshly loaded.
    pub fn get_page(&self, tid: TransactionId, pid: PageId, perm: Permission) -> DbResult<Page> {
        self.locks.acquire_blocking(tid, pid, perm.lock_mode())?;
        let mut inner = self.inner.lock().unwrap();
        inner.get_or_load(pid)
    }

    /// Scan `table_id`'s pages for the first free slot, inserting `tuple`
    /// there; allocate a fresh page if every existing page is full.
    ///
    /// Each candidate page is loaded, mutated, and re-stored under a
    /// single mutex acquisition: splitting those into separate critical
    /// sections would let another transaction's `evict_if_needed` pop
    /// this still-clean entry in between, and the later `store_dirty`
    /// would then raise the cache back to capacity via a raw
    /// `LruCache::put`, whose own internal eviction knows nothing about
    /// `dirty_by` and could silently drop someone else's dirty page.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: TableId, tuple: &Tuple) -> DbResult<RecordId> {
        let num_pages = self.num_pages(table_id)?;
        for page_number in 0..num_pages {
            let pid = PageId::new(table_id.0, page_number);
            self.locks.acquire_blocking(tid, pid, LockMode::Exclusive)?;
            let mut inner = self.inner.lock().unwrap();
            let mut page = inner.get_or_load(pid)?;
            if let Ok(slot) = page.insert_tuple(tuple) {
                inner.store_dirty(tid, pid, page);
                return Ok(RecordId { page_id: pid, slot });
            }
        }

        let pid = {
            let mut inner = self.inner.lock().unwrap();
            inner.heap_file_mut(table_id)?.allocate_empty_page()?.id
        };
        self.locks.acquire_blocking(tid, pid, LockMode::Exclusive)?;
        let mut inner = self.inner.lock().unwrap();
        let mut page = inner.get_or_load(pid)?;
        let slot = page.insert_tuple(tuple)?;
        inner.store_dirty(tid, pid, page);
        Ok(RecordId { page_id: pid, slot })
    }

    /// Clear the slot bit for `rid`'s tuple.
    pub fn delete_tuple(&self, tid: TransactionId, rid: RecordId) -> DbResult<()> {
        self.locks.acquire_blocking(tid, rid.page_id, LockMode::Exclusive)?;
        let mut inner = self.inner.lock().unwrap();
        let mut page = inner.get_or_load(rid.page_id)?;
        page.delete_slot(rid.slot)?;
        inner.store_dirty(tid, rid.page_id, page);
        Ok(())
    }

    /// Commit or abort `tid`. Commit flushes every page it dirtied; abort
    /// re-reads them from disk, discarding the in-memory changes. Either
    /// way releases all of `tid`'s locks. A second call for the same
    /// `tid` is a no-op.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let dirtied: Vec<PageId> = inner
            .cache
            .iter()
            .filter(|(_, entry)| entry.dirty_by == Some(tid))
            .map(|(pid, _)| *pid)
            .collect();

        for pid in dirtied {
            if commit {
                inner.flush_one(pid)?;
            } else {
                let fresh = inner.heap_file_mut(TableId(pid.table_id))?.read_page(pid.page_number)?;
                inner.cache.put(pid, CacheEntry { page: fresh, dirty_by: None });
            }
        }
        drop(inner);
        self.locks.release_all(tid);
        Ok(())
    }

    /// Flush every dirty page, regardless of owner.
    pub fn flush_all(&self) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let dirty: Vec<PageId> = inner
            .cache
            .iter()
            .filter(|(_, entry)| entry.dirty_by.is_some())
            .map(|(pid, _)| *pid)
            .collect();
        for pid in dirty {
            inner.flush_one(pid)?;
        }
        Ok(())
    }

    /// Flush `pid` if dirty; a no-op otherwise.
    pub fn flush(&self, pid: PageId) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.flush_one(pid)
    }

    /// Evict `pid` from the cache unconditionally, without writing it
    /// back even if dirty. Intended for administrative use (tests,
    /// cache-size changes), not the commit/abort path.
    pub fn discard(&self, pid: PageId) {
        let mut inner = self.inner.lock().unwrap();
        inner.cache.pop(&pid);
    }
}

/// Adapts a [`BufferPool`] to [`PageSource`] for a single transaction, so
/// a [`storage::HeapFileIter`] can scan through the transactional cache
/// path instead of bypassing it.
pub struct BufferPoolCursor<'a> {
    pool: &'a BufferPool,
    tid: TransactionId,
}

impl<'a> BufferPoolCursor<'a> {
    pub fn new(pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self { pool, tid }
    }
}

impl<'a> PageSource for BufferPoolCursor<'a> {
    fn read_page(&mut self, pid: PageId) -> DbResult<Page> {
        self.pool.get_page(self.tid, pid, Permission::ReadOnly)
    }

    fn num_pages(&mut self, table_id: TableId) -> DbResult<i64> {
        self.pool.num_pages(table_id)
    }
}
