//! The in-memory lock table.
//!
//! One [`LockRecord`] per outstanding or pending lock, at most one record per
//! path in any snapshot. The table is owned by the engine's home thread and
//! mutated only there; readers get cloned snapshots. There is no incremental
//! diffing: every successful listing refresh replaces the whole table, since
//! the remote listing is the single source of truth.

use crate::ordering::{PathOrderingPolicy, SortSpec, compare_records};

/// One outstanding or pending lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Repository-relative asset path.
    pub path: String,

    /// Stable identifier for the underlying asset, independent of its path.
    /// Filled in from the host's asset index; may be empty before resolution.
    pub asset_id: String,

    /// Bare handle of the lock owner.
    pub holder: String,

    /// Remote lock identifier. Empty for a record not yet confirmed by the
    /// server; authoritative only while `is_pending` is false.
    pub lock_id: String,

    /// True while a mutating operation on this record has been issued but not
    /// yet confirmed by a subsequent listing refresh.
    pub is_pending: bool,
}

impl LockRecord {
    /// Build the optimistic placeholder inserted when a local lock action is
    /// issued, before the server has confirmed anything.
    pub fn pending(path: impl Into<String>, asset_id: impl Into<String>, holder: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            asset_id: asset_id.into(),
            holder: holder.into(),
            lock_id: String::new(),
            is_pending: true,
        }
    }
}

/// Ordered collection of lock records.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    records: Vec<LockRecord>,
}

impl LockTable {
    /// Discard all prior contents and adopt `records` wholesale.
    ///
    /// The only mutation invoked after a successful listing refresh.
    pub fn replace_all(&mut self, records: Vec<LockRecord>) {
        self.records = records;
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Insert a pending placeholder, or overwrite the record already holding
    /// the same path. Returns true when a new record was inserted.
    pub fn upsert_pending(&mut self, record: LockRecord) -> bool {
        debug_assert!(record.is_pending);
        if let Some(existing) = self.records.iter_mut().find(|r| r.path == record.path) {
            *existing = record;
            false
        } else {
            self.records.push(record);
            true
        }
    }

    /// Resolve the pending record at `path` with its server-confirmed id.
    /// Returns the resolved record, or None if no record holds that path.
    ///
    /// The engine confirms pendings through a wholesale [`Self::replace_all`]
    /// refresh; this is for hosts that resolve individual records in place
    /// from a mutating command's own output instead of re-listing.
    pub fn resolve_pending(&mut self, path: &str, lock_id: &str) -> Option<LockRecord> {
        let record = self.records.iter_mut().find(|r| r.path == path)?;
        record.lock_id = lock_id.to_string();
        record.is_pending = false;
        Some(record.clone())
    }

    /// Mark the record with `lock_id` pending. Returns the updated record, or
    /// None if no record carries that id.
    pub fn set_pending_by_id(&mut self, lock_id: &str) -> Option<LockRecord> {
        let record = self.records.iter_mut().find(|r| r.lock_id == lock_id)?;
        record.is_pending = true;
        Some(record.clone())
    }

    /// Remove and return the record with `lock_id`. Like
    /// [`Self::resolve_pending`], for hosts that apply unlock results in
    /// place rather than waiting for the next listing refresh.
    pub fn remove_by_id(&mut self, lock_id: &str) -> Option<LockRecord> {
        let index = self.records.iter().position(|r| r.lock_id == lock_id)?;
        Some(self.records.remove(index))
    }

    /// True if any record (pending or confirmed) holds `path`.
    pub fn contains_path(&self, path: &str) -> bool {
        self.records.iter().any(|r| r.path == path)
    }

    /// The record with `lock_id`, if any.
    pub fn get_by_id(&self, lock_id: &str) -> Option<&LockRecord> {
        self.records.iter().find(|r| r.lock_id == lock_id)
    }

    /// Read-only view of the records in current order.
    pub fn records(&self) -> &[LockRecord] {
        &self.records
    }

    /// Cloned snapshot for readers outside the home thread.
    pub fn snapshot(&self) -> Vec<LockRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Re-sort the whole table under `spec` and `policy`.
    pub fn sort(&mut self, spec: SortSpec, policy: PathOrderingPolicy) {
        self.records
            .sort_by(|a, b| compare_records(a, b, spec, policy));
    }
}
