//! Incremental Sync Ledger (C3): per `(account, folder)` record of the last
//! successful sync window.
//!
//! Pure data structure with no I/O of its own — the scheduler drives it.
//! The ledger is the only source of truth for "where we left off"; the
//! fetcher must never consult message timestamps to decide the window.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// `full` reads from `default_start` every time; `incremental` resumes from
/// the last recorded `last_sync_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Always start at `default_start`.
    Full,
    /// Resume from the last committed `last_sync_end`, falling back to
    /// `default_start` when no entry exists yet.
    Incremental,
}

/// The `[start, end)` window a fetch should cover next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

/// One `(account, folder)` ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Start of the last window that was actually fetched.
    pub last_sync_start: DateTime<Utc>,
    /// End of the last window that was actually fetched. Monotone
    /// non-decreasing across successful commits.
    pub last_sync_end: DateTime<Utc>,
    /// Cumulative count of messages committed through this ledger row.
    pub emails_processed: u64,
}

/// `dashmap`-backed ledger. Keyed by `(account_id, folder)`; folders are
/// interned as owned strings via a side map since `DashMap` keys need to be
/// hashable and we want arbitrary folder names.
#[derive(Default)]
pub struct SyncLedger {
    entries: DashMap<(u64, String), LedgerEntry>,
}

impl SyncLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the window the next fetch for `(account_id, folder)` should
    /// cover, per `mode`, `default_start`, and `end`.
    #[must_use]
    pub fn next(
        &self,
        account_id: u64,
        folder: &str,
        mode: SyncMode,
        default_start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Window {
        let start = match mode {
            SyncMode::Full => default_start,
            SyncMode::Incremental => self
                .entries
                .get(&(account_id, folder.to_string()))
                .map_or(default_start, |entry| entry.last_sync_end),
        };
        Window { start, end }
    }

    /// Upserts the ledger row after a successful commit. `processed` is the
    /// count of messages newly committed in this cycle, added to the
    /// running total.
    pub fn commit(&self, account_id: u64, folder: &str, window: Window, processed: u64) {
        self.entries
            .entry((account_id, folder.to_string()))
            .and_modify(|entry| {
                entry.last_sync_start = window.start;
                entry.last_sync_end = window.end;
                entry.emails_processed += processed;
            })
            .or_insert(LedgerEntry {
                last_sync_start: window.start,
                last_sync_end: window.end,
                emails_processed: processed,
            });
    }

    /// Reads the current entry for `(account_id, folder)`, if any.
    #[must_use]
    pub fn entry(&self, account_id: u64, folder: &str) -> Option<LedgerEntry> {
        self.entries.get(&(account_id, folder.to_string())).map(|e| *e)
    }

    /// Deletes the ledger row, forcing the next sync to behave as full.
    pub fn forget(&self, account_id: u64, folder: &str) {
        self.entries.remove(&(account_id, folder.to_string()));
    }
}
