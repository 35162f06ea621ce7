//! Fixed-size page format, slotted tuple layout, and raw heap-file I/O.
//!
//! A [`HeapFile`] only knows how to read and write whole pages; it has no
//! cache and no locking. Scan/insert/delete orchestration lives one layer
//! up, in the buffer pool, which is the only intended caller of these
//! primitives in a real transaction path. Keeping that logic out of this
//! crate avoids a circular call graph (the buffer pool already needs to
//! call into the heap file for misses).

use common::{DbError, DbResult};
use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use types::{Field, FieldType, PageId, RecordId, TableId, TupleDesc};
use types::Tuple;


/// Derived geometry of a page for a given page size and tuple width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLayout {
    pub page_size: usize,
    pub tuple_size: usize,
    pub header_len: usize,
    pub num_slots: usize,
}

impl PageLayout {
    pub fn new(page_size: usize, tuple_size: usize) -> DbResult<Self> {
        if tuple_size == 0 {
            return Err(DbError::InvalidArgument("tuple size must be positive".into()));
        }
        // slots = floor((page_size * 8) / (tuple_size * 8 + 1)), one bit of
        // header overhead charged per slot.
        let num_slots = (page_size * 8) / (tuple_size * 8 + 1);
        if num_slots == 0 {
            return Err(DbError::InvalidArgument(format!(
                "tuple of size {tuple_size} does not fit in a page of size {page_size}"
            )));
        }
        let header_len = num_slots.div_ceil(8);
        Ok(Self {
            page_size,
            tuple_size,
            header_len,
            num_slots,
        })
    }

    fn slot_offset(&self, slot: usize) -> usize {
        self.header_len + slot * self.tuple_size
    }
}

/// One fixed-size on-disk page: a bitmap header of used-slot bits followed
/// by `num_slots` equally sized tuple payloads.
#[derive(Clone, Debug)]
pub struct Page {
    pub id: PageId,
    desc: TupleDesc,
    layout: PageLayout,
    bytes: Vec<u8>,
}

impl Page {
    /// A freshly allocated, all-empty page of the given id.
    pub fn empty(id: PageId, desc: TupleDesc, page_size: usize) -> DbResult<Self> {
        let layout = PageLayout::new(page_size, desc.tuple_size())?;
        Ok(Self {
            id,
            desc,
            layout,
            bytes: vec![0u8; page_size],
        })
    }

    /// Wrap a raw page-sized buffer read from disk. The buffer's length
    /// must equal `page_size` exactly.
    pub fn from_bytes(id: PageId, desc: TupleDesc, page_size: usize, bytes: Vec<u8>) -> DbResult<Self> {
        if bytes.len() != page_size {
            return Err(DbError::Storage(format!(
                "page buffer has length {}, expected {page_size}",
                bytes.len()
            )));
        }
        let layout = PageLayout::new(page_size, desc.tuple_size())?;
        Ok(Self {
            id,
            desc,
            layout,
            bytes,
        })
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        let byte = self.bytes[slot / 8];
        (byte >> (slot % 8)) & 1 == 1
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        let byte = &mut self.bytes[slot / 8];
        if used {
            *byte |= 1 << (slot % 8);
        } else {
            *byte &= !(1 << (slot % 8));
        }
    }

    /// Number of occupied slots; equals the header's set-bit count.
    pub fn num_live_tuples(&self) -> usize {
        (0..self.layout.num_slots).filter(|&s| self.is_slot_used(s)).count()
    }

    fn first_free_slot(&self) -> Option<usize> {
        (0..self.layout.num_slots).find(|&s| !self.is_slot_used(s))
    }

    /// Insert `tuple` into the first free slot, returning its index.
    /// Fails with `DbError::Storage` if the page has no free slot.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> DbResult<u32> {
        let slot = self
            .first_free_slot()
            .ok_or_else(|| DbError::Storage(format!("page {:?} is full", self.id)))?;
        self.write_slot(slot, tuple)?;
        self.set_slot_used(slot, true);
        Ok(slot as u32)
    }

    fn write_slot(&mut self, slot: usize, tuple: &Tuple) -> DbResult<()> {
        let start = self.layout.slot_offset(slot);
        let mut offset = start;
        for (value, field_desc) in tuple.values().iter().zip(self.desc.fields()) {
            let width = field_desc.field_type.byte_width();
            encode_field(value, field_desc.field_type, &mut self.bytes[offset..offset + width])?;
            offset += width;
        }
        Ok(())
    }

    /// Read the tuple stored in `slot`, stamped with its record-id. Fails
    /// if the slot is out of range or not marked used.
    pub fn read_tuple(&self, slot: u32) -> DbResult<Tuple> {
        let slot_idx = slot as usize;
        if slot_idx >= self.layout.num_slots {
            return Err(DbError::Storage(format!("slot {slot_idx} out of bounds")));
        }
        if !self.is_slot_used(slot_idx) {
            return Err(DbError::Storage(format!("slot {slot_idx} is empty")));
        }
        let start = self.layout.slot_offset(slot_idx);
        let mut offset = start;
        let mut values = Vec::with_capacity(self.desc.len());
        for field_desc in self.desc.fields() {
            let width = field_desc.field_type.byte_width();
            values.push(decode_field(field_desc.field_type, &self.bytes[offset..offset + width])?);
            offset += width;
        }
        let tuple = Tuple::new(&self.desc, values).map_err(|e| DbError::Storage(e.to_string()))?;
        Ok(tuple.with_rid(RecordId { page_id: self.id, slot }))
    }

    /// Clear the used-bit for `slot`. The payload bytes are left in place;
    /// occupancy is governed solely by the header bit.
    pub fn delete_slot(&mut self, slot: u32) -> DbResult<()> {
        let slot = slot as usize;
        if slot >= self.layout.num_slots || !self.is_slot_used(slot) {
            return Err(DbError::Storage(format!("slot {slot} is already empty")));
        }
        self.set_slot_used(slot, false);
        Ok(())
    }
}

fn encode_field(value: &Field, ty: FieldType, out: &mut [u8]) -> DbResult<()> {
    match (value, ty) {
        (Field::Int(v), FieldType::Int32) => {
            out.copy_from_slice(&v.to_be_bytes());
            Ok(())
        }
        (Field::Str(s), FieldType::Str(max_len)) => {
            let bytes = s.as_bytes();
            if bytes.len() > max_len as usize {
                return Err(DbError::Storage(format!(
                    "string value exceeds max length ({} > {max_len})",
                    bytes.len()
                )));
            }
            out[..4].copy_from_slice(&(bytes.len() as u32).to_be_bytes());
            out[4..4 + bytes.len()].copy_from_slice(bytes);
            for b in &mut out[4 + bytes.len()..] {
                *b = 0;
            }
            Ok(())
        }
        _ => Err(DbError::Storage("field value does not match its declared type".into())),
    }
}

fn decode_field(ty: FieldType, buf: &[u8]) -> DbResult<Field> {
    match ty {
        FieldType::Int32 => {
            let arr: [u8; 4] = buf.try_into().map_err(|_| DbError::Storage("truncated int field".into()))?;
            Ok(Field::Int(i32::from_be_bytes(arr)))
        }
        FieldType::Str(_) => {
            let len_bytes: [u8; 4] = buf[..4].try_into().map_err(|_| DbError::Storage("truncated string length".into()))?;
            let len = u32::from_be_bytes(len_bytes) as usize;
            let body = &buf[4..];
            if len > body.len() {
                return Err(DbError::Storage("string length prefix exceeds field width".into()));
            }
            let s = std::str::from_utf8(&body[..len])
                .map_err(|e| DbError::Storage(format!("invalid utf-8 in string field: {e}")))?;
            Ok(Field::Str(s.to_string()))
        }
    }
}

/// A source of pages addressable by [`PageId`], implemented both by
/// [`HeapFile`] directly (cache-bypassing scans) and by the buffer pool
/// (the normal transactional path).
pub trait PageSource {
    fn read_page(&mut self, pid: PageId) -> DbResult<Page>;
    fn num_pages(&mut self, table_id: TableId) -> DbResult<i64>;
}

/// A flat file of fixed-size pages, addressable by page number. Owns no
/// cache and no locking; callers are responsible for both.
#[derive(Debug)]
pub struct HeapFile {
    file: File,
    table_id: TableId,
    desc: TupleDesc,
    page_size: usize,
}

impl HeapFile {
    pub fn open(path: &Path, desc: TupleDesc, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let table_id = stable_table_id(path)?;
        Ok(Self {
            file,
            table_id,
            desc,
            page_size,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn num_pages(&self) -> DbResult<i64> {
        let len = self.file.metadata()?.len();
        Ok((len / self.page_size as u64) as i64)
    }

    /// Read one page. If `page_number` is beyond the current end of file,
    /// a fresh empty page is synthesized rather than treated as an error —
    /// matching the "short read returns a fresh page" behavior of this
    /// codebase's existing page cache.
    pub fn read_page(&mut self, page_number: i64) -> DbResult<Page> {
        let pid = PageId::new(self.table_id.0, page_number);
        if page_number < 0 || page_number >= self.num_pages()? {
            return Page::empty(pid, self.desc.clone(), self.page_size);
        }
        let mut buf = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(page_number as u64 * self.page_size as u64))?;
        self.file.read_exact(&mut buf)?;
        Page::from_bytes(pid, self.desc.clone(), self.page_size, buf)
    }

    pub fn write_page(&mut self, page: &Page) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(page.id.page_number as u64 * self.page_size as u64))?;
        self.file.write_all(page.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Materialize and persist a new zero-filled page at the current end
    /// of the file, extending it by one page.
    pub fn allocate_empty_page(&mut self) -> DbResult<Page> {
        let page_number = self.num_pages()?;
        let page = Page::empty(PageId::new(self.table_id.0, page_number), self.desc.clone(), self.page_size)?;
        self.write_page(&page)?;
        Ok(page)
    }
}

impl PageSource for HeapFile {
    fn read_page(&mut self, pid: PageId) -> DbResult<Page> {
        if pid.table_id != self.table_id.0 {
            return Err(DbError::Storage(format!(
                "page {pid:?} does not belong to table {:?}",
                self.table_id
            )));
        }
        self.read_page(pid.page_number)
    }

    fn num_pages(&mut self, table_id: TableId) -> DbResult<i64> {
        if table_id != self.table_id {
            return Err(DbError::Storage(format!("unknown table {table_id:?}")));
        }
        HeapFile::num_pages(self)
    }
}

fn stable_table_id(path: &Path) -> DbResult<TableId> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut hasher = DefaultHasher::new();
    absolute.hash(&mut hasher);
    // Keep the id in the positive i64 range; only its stability matters.
    Ok(TableId((hasher.finish() >> 1) as i64))
}

/// Thrown by [`HeapFileIter::next`] when called before `open` or after
/// `close`.
pub fn iterator_closed() -> DbError {
    DbError::Storage("iterator is closed: call open() first".into())
}

/// Lazy, single-threaded, restartable iterator over every live tuple in a
/// table, reading pages through a [`PageSource`] (a raw `HeapFile` for
/// cache-bypassing scans, or the buffer pool for the transactional path).
pub struct HeapFileIter<'a, S: PageSource> {
    source: &'a mut S,
    table_id: TableId,
    current_page: i64,
    num_pages: i64,
    pending: std::collections::VecDeque<Tuple>,
    state: IterState,
}

#[derive(PartialEq, Eq)]
enum IterState {
    Unopened,
    Open,
    Closed,
}

impl<'a, S: PageSource> HeapFileIter<'a, S> {
    pub fn new(source: &'a mut S, table_id: TableId) -> Self {
        Self {
            source,
            table_id,
            current_page: 0,
            num_pages: 0,
            pending: std::collections::VecDeque::new(),
            state: IterState::Unopened,
        }
    }

    /// Reset position to the start of the table and (re)fetch the page
    /// count. Valid whether or not the iterator was previously opened.
    pub fn open(&mut self) -> DbResult<()> {
        self.num_pages = self.source.num_pages(self.table_id)?;
        self.current_page = 0;
        self.pending.clear();
        self.state = IterState::Open;
        Ok(())
    }

    /// Equivalent to closing and reopening at page 0.
    pub fn rewind(&mut self) -> DbResult<()> {
        self.open()
    }

    pub fn close(&mut self) {
        self.pending.clear();
        self.state = IterState::Closed;
    }

    fn load_next_page(&mut self) -> DbResult<bool> {
        while self.current_page < self.num_pages {
            let pid = PageId::new(self.table_id.0, self.current_page);
            let page = self.source.read_page(pid)?;
            self.current_page += 1;
            let layout = page.layout();
            let tuples: std::collections::VecDeque<Tuple> = (0..layout.num_slots as u32)
                .filter(|&s| page.is_slot_used(s as usize))
                .map(|s| page.read_tuple(s))
                .collect::<DbResult<_>>()?;
            if !tuples.is_empty() {
                self.pending = tuples;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Advance to and return the next tuple, or `None` once exhausted.
    pub fn next(&mut self) -> DbResult<Option<Tuple>> {
        if self.state != IterState::Open {
            return Err(iterator_closed());
        }
        loop {
            if let Some(tuple) = self.pending.pop_front() {
                return Ok(Some(tuple));
            }
            if !self.load_next_page()? {
                return Ok(None);
            }
        }
    }
}
