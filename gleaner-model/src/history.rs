//! Durable outcome records, one per finished attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{events::RunEvent, ids::RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    NeedsResolution,
    Done,
    Cancelled,
    Error,
}

impl HistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryStatus::NeedsResolution => "needs_resolution",
            HistoryStatus::Done => "done",
            HistoryStatus::Cancelled => "cancelled",
            HistoryStatus::Error => "error",
        }
    }
}

/// Status-specific payload of a [`HistoryEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoryOutcome {
    NeedsResolution {
        long_labels: Vec<String>,
    },
    Done {
        filename: String,
        archive_name: String,
    },
    Cancelled {
        message: String,
    },
    Error {
        message: String,
    },
}

impl HistoryOutcome {
    pub fn status(&self) -> HistoryStatus {
        match self {
            HistoryOutcome::NeedsResolution { .. } => {
                HistoryStatus::NeedsResolution
            }
            HistoryOutcome::Done { .. } => HistoryStatus::Done,
            HistoryOutcome::Cancelled { .. } => HistoryStatus::Cancelled,
            HistoryOutcome::Error { .. } => HistoryStatus::Error,
        }
    }

    /// The event observers receive for this outcome.
    pub fn to_event(&self) -> RunEvent {
        match self.clone() {
            HistoryOutcome::NeedsResolution { long_labels } => {
                RunEvent::NeedsResolution { long_labels }
            }
            HistoryOutcome::Done {
                filename,
                archive_name,
            } => RunEvent::Done {
                filename,
                archive_name,
            },
            HistoryOutcome::Cancelled { message } => {
                RunEvent::Cancelled { message }
            }
            HistoryOutcome::Error { message } => RunEvent::Error { message },
        }
    }
}

/// Immutable ledger record. A run owns one entry per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub run_id: RunId,
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(flatten)]
    pub outcome: HistoryOutcome,
}

fn first_attempt() -> u32 {
    1
}

impl HistoryEntry {
    pub fn status(&self) -> HistoryStatus {
        self.outcome.status()
    }

    /// Archive file name when this entry records a successful attempt.
    pub fn archive_name(&self) -> Option<&str> {
        match &self.outcome {
            HistoryOutcome::Done { archive_name, .. } => Some(archive_name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_flattens_into_status_field() {
        let entry = HistoryEntry {
            run_id: RunId::new(),
            attempt: 2,
            timestamp: Utc::now(),
            items: vec!["A1".into()],
            titles: vec!["Widget".into()],
            outcome: HistoryOutcome::Done {
                filename: "catalog.csv".into(),
                archive_name: "catalog.tar.zst".into(),
            },
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["status"], "done");
        assert_eq!(value["archive_name"], "catalog.tar.zst");

        let back: HistoryEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back.status(), HistoryStatus::Done);
        assert_eq!(back.archive_name(), Some("catalog.tar.zst"));
    }
}
