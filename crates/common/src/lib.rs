
use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Canonical error type shared across the storage engine.
///
/// One variant per subsystem, matching this codebase's existing
/// `DbError` shape, extended with the kinds the storage/locking/recovery
/// core needs: a blocked transaction that timed out acquiring a lock, and
/// a malformed-argument class for aggregator/tuple-descriptor misuse.
#[derive(Error, Debug)]
pub enum DbError {
    /// Lock-acquisition timeout, or an explicit caller-requested abort.
    /// The caller must route this into `transaction_complete(tid, abort=true)`.
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage engine's process-wide knobs.
///
/// # Example
/// ```
/// use common::Config;
///
/// let config = Config::builder()
///     .page_size(8192)
///     .buffer_pool_capacity(128)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table heap files live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes. Process-wide, mutable only for
    /// test fixtures; a buffer pool must not be shared across two configs
    /// with different page sizes.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Number of pages the buffer pool keeps resident at once.
    #[builder(default = 50)]
    pub buffer_pool_capacity: usize,
    /// Planner cost unit charged per page read by a full scan.
    #[builder(default = 1000)]
    pub io_cost_per_page: i64,
    /// Bucket count used when building a fresh histogram.
    #[builder(default = 100)]
    pub histogram_buckets: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            buffer_pool_capacity: 50,
            io_cost_per_page: 1000,
            histogram_buckets: 100,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult};
    pub use types::{Field, FieldDesc, FieldType, PageId, Permission, RecordId, TableId, TransactionId, Tuple, TupleDesc};
}
