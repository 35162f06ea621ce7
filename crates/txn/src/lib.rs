//! Per-page lock manager with shared/exclusive modes, upgrade-in-place,
//! and a timeout-based blocking helper used by the buffer pool to avoid
//! deadlocking forever on a contended page.
//!
//! The manager itself never blocks: `acquire` always returns immediately.
//! Blocking with a randomized timeout is layered on top in
//! `acquire_blocking`, which is what callers outside this crate should use.

use common::{DbError, DbResult};
use hashbrown::HashMap;
use rand::Rng;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use types::{LockMode, PageId, TransactionId};


/// One (transaction, mode) lock record held on a page.
#[derive(Clone, Copy, Debug)]
struct LockRecord {
    tid: TransactionId,
    mode: LockMode,
}

/// Upper bound on how long `acquire_blocking` will spin before giving up.
/// Each call picks a fresh random budget in `[0, LOCK_TIMEOUT_CAP)` so that
/// competing transactions don't all retry in lockstep.
const LOCK_TIMEOUT_CAP: Duration = Duration::from_millis(200);

/// Tracks, per page, the ordered list of lock holders.
///
/// All public operations serialize on a single internal mutex; the manager
/// does not implement any wait queue of its own; see `acquire_blocking` for
/// the caller-side retry loop.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<PageId, Vec<LockRecord>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to grant `tid` a lock of `mode` on `pid` without blocking.
    ///
    /// Returns `true` if the lock is now held (whether freshly granted,
    /// idempotently re-granted, or upgraded in place); `false` if it
    /// conflicts with an existing holder and the caller should retry.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let mut locks = self.locks.lock().unwrap();
        let holders = locks.entry(pid).or_default();

        match holders.as_mut_slice() {
            [] => {
                holders.push(LockRecord { tid, mode });
                true
            }
            [only] if only.tid == tid => {
                if only.mode == LockMode::Shared && mode == LockMode::Exclusive {
                    only.mode = LockMode::Exclusive;
                }
                true
            }
            [only] => {
                let granted = only.mode == LockMode::Shared && mode == LockMode::Shared;
                if granted {
                    holders.push(LockRecord { tid, mode });
                }
                granted
            }
            many => {
                if mode != LockMode::Shared {
                    return false;
                }
                if many.iter().any(|l| l.tid == tid) {
                    return true;
                }
                holders.push(LockRecord { tid, mode });
                true
            }
        }
    }

    /// Block (with back-off) until `tid` holds `mode` on `pid`, or fail
    /// with `DbError::TransactionAborted` once a randomized timeout in
    /// `[0, 200ms)` has elapsed.
    pub fn acquire_blocking(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> DbResult<()> {
        let budget = Duration::from_millis(rand::thread_rng().gen_range(0..LOCK_TIMEOUT_CAP.as_millis() as u64));
        let start = Instant::now();
        let mut backoff = Duration::from_micros(50);

        loop {
            if self.acquire(tid, pid, mode) {
                return Ok(());
            }
            if start.elapsed() >= budget {
                return Err(DbError::TransactionAborted(format!(
                    "timed out acquiring {mode:?} lock on {pid:?}"
                )));
            }
            std::thread::sleep(backoff.min(budget.saturating_sub(start.elapsed())));
            backoff = (backoff * 2).min(Duration::from_millis(10));
        }
    }

    /// Release `tid`'s lock on `pid`, if any. A no-op if `tid` does not
    /// hold a lock there.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut locks = self.locks.lock().unwrap();
        if let Some(holders) = locks.get_mut(&pid) {
            holders.retain(|l| l.tid != tid);
            if holders.is_empty() {
                locks.remove(&pid);
            }
        }
    }

    /// Release every lock `tid` holds, across all pages. Idempotent.
    pub fn release_all(&self, tid: TransactionId) {
        let mut locks = self.locks.lock().unwrap();
        locks.retain(|_, holders| {
            holders.retain(|l| l.tid != tid);
            !holders.is_empty()
        });
    }

    /// Does `tid` currently hold any lock on `pid`?
    pub fn holds(&self, tid: TransactionId, pid: PageId) -> bool {
        let locks = self.locks.lock().unwrap();
        locks
            .get(&pid)
            .is_some_and(|holders| holders.iter().any(|l| l.tid == tid))
    }

    /// Does `tid` hold any lock at all, on any page?
    pub fn holds_any(&self, tid: TransactionId) -> bool {
        let locks = self.locks.lock().unwrap();
        locks.values().any(|holders| holders.iter().any(|l| l.tid == tid))
    }
}
