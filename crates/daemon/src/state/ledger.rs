// Capped, newest-first record of commits the daemon authored.

use std::path::PathBuf;

use autopilot_common::types::LedgerEntry;
use chrono::{DateTime, Local, Utc};

use super::{load_json_or_default, store_json, StatePaths};
use crate::error::AutopilotError;

pub const LEDGER_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct CommitLedger {
    dir: PathBuf,
    path: PathBuf,
    capacity: usize,
}

impl CommitLedger {
    pub fn new(paths: &StatePaths) -> Self {
        Self { dir: paths.dir.clone(), path: paths.ledger.clone(), capacity: LEDGER_CAPACITY }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// All entries, most recent first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        load_json_or_default(&self.path, "commit ledger")
    }

    pub fn latest(&self) -> Option<LedgerEntry> {
        self.entries().into_iter().next()
    }

    /// Prepend an entry, dropping the oldest beyond capacity.
    pub fn record(&self, entry: LedgerEntry) -> Result<(), AutopilotError> {
        let mut entries = self.entries();
        entries.insert(0, entry);
        entries.truncate(self.capacity);
        store_json(&self.dir, &self.path, &entries)
    }

    /// Remove the most recent entry with `hash`. Returns false if absent.
    pub fn remove(&self, hash: &str) -> Result<bool, AutopilotError> {
        let mut entries = self.entries();
        let Some(index) = entries.iter().position(|entry| entry.hash == hash) else {
            return Ok(false);
        };
        entries.remove(index);
        store_json(&self.dir, &self.path, &entries)?;
        Ok(true)
    }

    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.entries().iter().filter(|entry| entry.timestamp >= since).count()
    }

    /// Entries recorded since local midnight.
    pub fn count_today(&self) -> usize {
        self.count_since(start_of_local_day())
    }
}

fn start_of_local_day() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}
