//! Ledger persistence — the `StateStore` seam plus file and in-memory stores.
//!
//! Last write wins. One process per store; nothing here coordinates between
//! processes sharing a file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use billminder_core::{BillMinderError, DispatchBookkeeping, DispatchLogEntry, LedgerState, Result};

/// Durable home of obligations, the dispatch log, bookkeeping and recipient.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<LedgerState>;

    fn save(&self, state: &LedgerState) -> Result<()>;

    /// Append one log entry.
    fn append_dispatch(&self, entry: &DispatchLogEntry) -> Result<()> {
        let mut state = self.load()?;
        state.dispatch_log.push(entry.clone());
        self.save(&state)
    }

    /// Replace the bookkeeping record.
    fn save_bookkeeping(&self, bookkeeping: &DispatchBookkeeping) -> Result<()> {
        let mut state = self.load()?;
        state.bookkeeping = bookkeeping.clone();
        self.save(&state)
    }
}

/// File-based store — the whole ledger as one pretty-printed JSON document.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<LedgerState> {
        if !self.path.exists() {
            return Ok(LedgerState::default());
        }
        let json = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&json).map_err(|e| {
            BillMinderError::Store(format!("Failed to parse {}: {e}", self.path.display()))
        })
    }

    fn save(&self, state: &LedgerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        // Write-then-rename so a crash never leaves a truncated ledger.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(
            "💾 Saved {} obligations, {} log entries to {}",
            state.obligations.len(),
            state.dispatch_log.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Volatile store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<LedgerState>,
}

impl MemoryStateStore {
    pub fn new(state: LedgerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<LedgerState> {
        let state = self
            .state
            .lock()
            .map_err(|e| BillMinderError::Store(e.to_string()))?;
        Ok(state.clone())
    }

    fn save(&self, state: &LedgerState) -> Result<()> {
        let mut slot = self
            .state
            .lock()
            .map_err(|e| BillMinderError::Store(e.to_string()))?;
        *slot = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billminder_core::{LogStatus, Obligation};
    use chrono::NaiveDate;

    fn sample_state() -> LedgerState {
        let ob = Obligation::new("Netflix", 15.99, 5).unwrap();
        let sent_at = NaiveDate::from_ymd_opt(2026, 3, 5)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        LedgerState {
            dispatch_log: vec![DispatchLogEntry::record(&ob, sent_at, LogStatus::Success)],
            obligations: vec![ob],
            bookkeeping: DispatchBookkeeping {
                last_dispatch_date: Some(sent_at.date()),
                last_dispatch_recipient: Some("me@example.com".into()),
            },
            recipient: Some("me@example.com".into()),
        }
    }

    #[test]
    fn test_json_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(&dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), LedgerState::default());
    }

    #[test]
    fn test_json_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(&dir.path().join("sub").join("state.json"));
        let state = sample_state();
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
        assert!(!dir.path().join("sub").join("state.json.tmp").exists());
    }

    #[test]
    fn test_json_corrupt_file_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonStateStore::new(&path);
        assert!(matches!(store.load(), Err(BillMinderError::Store(_))));
    }

    #[test]
    fn test_default_append_and_bookkeeping() {
        let store = MemoryStateStore::default();
        let state = sample_state();
        store.append_dispatch(&state.dispatch_log[0]).unwrap();
        store.save_bookkeeping(&state.bookkeeping).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.dispatch_log.len(), 1);
        assert_eq!(loaded.bookkeeping, state.bookkeeping);
    }
}
