//! Append-only outcome history backed by a JSON file.

use std::path::{Path, PathBuf};

use gleaner_model::{HistoryEntry, HistoryStatus, RunId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::persist::{self, StoreError};

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    entries: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredLedger {
    Versioned(LedgerFile),
    Legacy(Vec<HistoryEntry>),
}

/// Durable, most-recent-first log of attempt outcomes.
///
/// The backing file is read lazily on first use. A missing or unreadable
/// file starts the ledger empty. Entries are never edited or removed.
#[derive(Debug)]
pub struct HistoryLedger {
    path: PathBuf,
    entries: Mutex<Option<Vec<HistoryEntry>>>,
}

impl HistoryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepends `entry` and persists the ledger.
    ///
    /// Persistence failures are logged; the entry stays in memory.
    pub async fn append(&self, entry: HistoryEntry) {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(load_entries(&self.path).await);
        }
        let entries = guard.get_or_insert_with(Vec::new);

        entries.insert(0, entry);

        if let Err(err) = self.persist(entries).await {
            warn!(error = %err, "failed to persist history ledger");
        }
    }

    /// All entries, most recent first.
    pub async fn list(&self) -> Vec<HistoryEntry> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(load_entries(&self.path).await);
        }
        guard.clone().unwrap_or_default()
    }

    /// Most recent `Done` entry recorded for `run_id`.
    pub async fn latest_done(&self, run_id: &RunId) -> Option<HistoryEntry> {
        self.list().await.into_iter().find(|entry| {
            entry.run_id == *run_id && entry.status() == HistoryStatus::Done
        })
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct LedgerFileRef<'a> {
            version: u32,
            entries: &'a [HistoryEntry],
        }

        persist::write_json_atomic(
            &self.path,
            &LedgerFileRef {
                version: LEDGER_VERSION,
                entries,
            },
        )
        .await
    }
}

async fn load_entries(path: &Path) -> Vec<HistoryEntry> {
    let bytes = match persist::read_optional(path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "history ledger unreadable; starting empty"
            );
            return Vec::new();
        }
    };

    match serde_json::from_slice::<StoredLedger>(&bytes) {
        Ok(StoredLedger::Versioned(file)) => {
            if file.version != LEDGER_VERSION {
                warn!(
                    path = %path.display(),
                    version = file.version,
                    "unexpected history ledger version"
                );
            }
            info!(
                path = %path.display(),
                entries = file.entries.len(),
                "history ledger loaded"
            );
            file.entries
        }
        Ok(StoredLedger::Legacy(entries)) => {
            info!(
                path = %path.display(),
                entries = entries.len(),
                "legacy history ledger loaded"
            );
            entries
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "history ledger corrupt; starting empty"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gleaner_model::HistoryOutcome;
    use tempfile::TempDir;

    use super::*;

    fn entry(run_id: RunId, outcome: HistoryOutcome) -> HistoryEntry {
        HistoryEntry {
            run_id,
            attempt: 1,
            timestamp: Utc::now(),
            items: vec!["A1".into()],
            titles: vec!["A1".into()],
            outcome,
        }
    }

    fn done(name: &str) -> HistoryOutcome {
        HistoryOutcome::Done {
            filename: format!("{name}.csv"),
            archive_name: format!("{name}.tar.zst"),
        }
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = HistoryLedger::new(dir.path().join("history.json"));
        assert!(ledger.list().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty_and_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let ledger = HistoryLedger::new(&path);
        assert!(ledger.list().await.is_empty());

        ledger.append(entry(RunId::new(), done("fresh"))).await;
        let reloaded = HistoryLedger::new(&path);
        assert_eq!(reloaded.list().await.len(), 1);
    }

    #[tokio::test]
    async fn entries_are_most_recent_first_and_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let ledger = HistoryLedger::new(&path);

        let first = RunId::new();
        let second = RunId::new();
        ledger.append(entry(first, done("first"))).await;
        ledger
            .append(entry(
                second,
                HistoryOutcome::Cancelled {
                    message: "cancelled by user".into(),
                },
            ))
            .await;

        let reloaded = HistoryLedger::new(&path).list().await;
        let ids: Vec<_> = reloaded.iter().map(|entry| entry.run_id).collect();
        assert_eq!(ids, [second, first]);
    }

    #[tokio::test]
    async fn legacy_array_files_are_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let legacy = vec![entry(RunId::new(), done("old"))];
        std::fs::write(&path, serde_json::to_vec(&legacy).unwrap()).unwrap();

        let ledger = HistoryLedger::new(&path);
        assert_eq!(ledger.list().await, legacy);
    }

    #[tokio::test]
    async fn latest_done_skips_other_statuses() {
        let dir = TempDir::new().unwrap();
        let ledger = HistoryLedger::new(dir.path().join("history.json"));
        let run_id = RunId::new();

        ledger.append(entry(run_id, done("attempt-one"))).await;
        ledger
            .append(entry(
                run_id,
                HistoryOutcome::Error {
                    message: "boom".into(),
                },
            ))
            .await;

        let latest = ledger.latest_done(&run_id).await.unwrap();
        assert_eq!(latest.archive_name(), Some("attempt-one.tar.zst"));
        assert!(ledger.latest_done(&RunId::new()).await.is_none());
    }

    #[tokio::test]
    async fn unwritable_path_keeps_entries_in_memory() {
        let dir = TempDir::new().unwrap();
        // A directory in place of the file makes the rename fail.
        let path = dir.path().join("history.json");
        std::fs::create_dir_all(&path).unwrap();

        let ledger = HistoryLedger::new(&path);
        ledger.append(entry(RunId::new(), done("kept"))).await;
        assert_eq!(ledger.list().await.len(), 1);
    }
}
