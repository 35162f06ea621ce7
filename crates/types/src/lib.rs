//! Shared identifiers and the tuple data model used by every layer of the
//! storage engine: field types, tuple descriptors, tuples, and the handful
//! of small identifier types (`PageId`, `TableId`, `RecordId`,
//! `TransactionId`) that would otherwise create a dependency cycle between
//! `common` and `storage`.

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors raised while constructing the type-level data model itself
/// (tuple descriptors, fixed-width strings). Kept separate from the
/// workspace-wide `DbError` in `common` so this crate has no dependency
/// on it; callers that need a `DbError` map these with `From`.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TypeError {
    #[error("duplicate field name '{0}' in tuple descriptor")]
    DuplicateField(String),
    #[error("tuple descriptor must have at least one field")]
    EmptyDescriptor,
    #[error("string field '{0}' must have a positive max length")]
    InvalidMaxLen(String),
    #[error("field {0} expected {1:?}, found a value of a different type")]
    FieldTypeMismatch(usize, FieldType),
    #[error("tuple has {0} fields, descriptor expects {1}")]
    ArityMismatch(usize, usize),
    #[error("string value exceeds max length ({0} > {1})")]
    StringTooLong(usize, usize),
}

pub type TypeResult<T> = Result<T, TypeError>;

/// Logical identifier for a page in the storage layer: (table-id, page-number).
/// Equality and hashing are structural, matching the spec's data model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PageId {
    pub table_id: i64,
    pub page_number: i64,
}

impl PageId {
    pub fn new(table_id: i64, page_number: i64) -> Self {
        Self {
            table_id,
            page_number,
        }
    }
}

/// Logical identifier for a table, a stable hash of its absolute file path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TableId(pub i64);

/// Fully-qualified address of a tuple: the page it lives on plus its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u32,
}

/// Identifies a transaction across the lock manager and buffer pool.
/// Allocated from a process-wide counter; see `TransactionId::new`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TransactionId(u64);

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

impl TransactionId {
    /// Allocate a fresh, process-unique transaction id.
    pub fn new() -> Self {
        Self(NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// The access mode a transaction requests on a page; maps 1:1 onto the
/// lock manager's shared/exclusive modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn lock_mode(self) -> LockMode {
        match self {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// The mode a lock record is held in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A field's declared type within a tuple descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FieldType {
    Int32,
    /// Fixed maximum byte length; shorter strings are zero-padded on disk.
    Str(u16),
}

impl FieldType {
    /// On-disk width in bytes of a field of this type, including length
    /// prefixes for strings.
    pub fn byte_width(self) -> usize {
        match self {
            FieldType::Int32 => 4,
            FieldType::Str(max_len) => 4 + max_len as usize,
        }
    }
}

/// A single field value conforming to a `FieldType`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(v) => Some(v.as_str()),
            Field::Int(_) => None,
        }
    }
}

/// One (name, type) column in a tuple descriptor.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldDesc {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDesc {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Immutable schema for a tuple: an ordered sequence of (name, type) fields.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TupleDesc {
    fields: Vec<FieldDesc>,
}

impl TupleDesc {
    pub fn try_new(fields: Vec<FieldDesc>) -> TypeResult<Self> {
        if fields.is_empty() {
            return Err(TypeError::EmptyDescriptor);
        }
        let mut seen = std::collections::HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.clone()) {
                return Err(TypeError::DuplicateField(field.name.clone()));
            }
            if let FieldType::Str(max_len) = field.field_type
                && max_len == 0
            {
                return Err(TypeError::InvalidMaxLen(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_type(&self, index: usize) -> Option<FieldType> {
        self.fields.get(index).map(|f| f.field_type)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Total on-disk width of one tuple under this descriptor.
    pub fn tuple_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.byte_width()).sum()
    }

    /// Validate a candidate set of field values against this descriptor.
    pub fn validate(&self, values: &[Field]) -> TypeResult<()> {
        if values.len() != self.fields.len() {
            return Err(TypeError::ArityMismatch(values.len(), self.fields.len()));
        }
        for (idx, (value, desc)) in values.iter().zip(self.fields.iter()).enumerate() {
            match (value, desc.field_type) {
                (Field::Int(_), FieldType::Int32) => {}
                (Field::Str(s), FieldType::Str(max_len)) => {
                    if s.len() > max_len as usize {
                        return Err(TypeError::StringTooLong(s.len(), max_len as usize));
                    }
                }
                _ => return Err(TypeError::FieldTypeMismatch(idx, desc.field_type)),
            }
        }
        Ok(())
    }
}

/// An ordered sequence of field values conforming to a `TupleDesc`, plus an
/// optional record-id assigned once the tuple has been inserted.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Tuple {
    values: Vec<Field>,
    rid: Option<RecordId>,
}

impl Tuple {
    pub fn new(desc: &TupleDesc, values: Vec<Field>) -> TypeResult<Self> {
        desc.validate(&values)?;
        Ok(Self { values, rid: None })
    }

    pub fn values(&self) -> &[Field] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Field> {
        self.values
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.values.get(index)
    }
}
