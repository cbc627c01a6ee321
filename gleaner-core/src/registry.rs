//! In-memory run table and state machine.

use std::{collections::HashMap, fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use gleaner_model::{HistoryOutcome, RunId, RunStatus, RunView};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, RunError};

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    NeedsResolution {
        long_labels: Vec<String>,
    },
    Done {
        titles: Vec<String>,
        filename: String,
        archive_name: String,
        archive_path: PathBuf,
    },
    Cancelled {
        message: String,
    },
    Error {
        message: String,
    },
}

impl AttemptOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            AttemptOutcome::NeedsResolution { .. } => {
                RunStatus::AwaitingResolution
            }
            AttemptOutcome::Done { .. } => RunStatus::Done,
            AttemptOutcome::Cancelled { .. } => RunStatus::Cancelled,
            AttemptOutcome::Error { .. } => RunStatus::Error,
        }
    }

    pub fn to_history(&self) -> HistoryOutcome {
        match self {
            AttemptOutcome::NeedsResolution { long_labels } => {
                HistoryOutcome::NeedsResolution {
                    long_labels: long_labels.clone(),
                }
            }
            AttemptOutcome::Done {
                filename,
                archive_name,
                ..
            } => HistoryOutcome::Done {
                filename: filename.clone(),
                archive_name: archive_name.clone(),
            },
            AttemptOutcome::Cancelled { message } => {
                HistoryOutcome::Cancelled {
                    message: message.clone(),
                }
            }
            AttemptOutcome::Error { message } => HistoryOutcome::Error {
                message: message.clone(),
            },
        }
    }
}

/// Handed out when an attempt starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTicket {
    pub attempt: u32,
    pub items: Vec<String>,
}

/// Run details captured when a finishing transition is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReceipt {
    pub items: Vec<String>,
    pub titles: Vec<String>,
}

#[derive(Debug, Clone)]
struct RunState {
    items: Vec<String>,
    status: RunStatus,
    attempt: u32,
    attempt_finished: bool,
    titles: Vec<String>,
    long_labels: Vec<String>,
    filename: Option<String>,
    archive_name: Option<String>,
    archive_path: Option<PathBuf>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RunState {
    fn view(&self, run_id: RunId) -> RunView {
        RunView {
            run_id,
            status: self.status,
            attempt: self.attempt,
            items: self.items.clone(),
            titles: self.titles.clone(),
            long_labels: self.long_labels.clone(),
            filename: self.filename.clone(),
            archive_name: self.archive_name.clone(),
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn can_begin_attempt(&self) -> bool {
        match self.status {
            RunStatus::Pending => self.attempt == 0,
            RunStatus::AwaitingResolution => true,
            _ => false,
        }
    }

    fn apply(&mut self, outcome: &AttemptOutcome, now: DateTime<Utc>) {
        self.status = outcome.status();
        self.attempt_finished = true;
        self.updated_at = now;
        self.long_labels.clear();

        match outcome {
            AttemptOutcome::NeedsResolution { long_labels } => {
                self.long_labels = long_labels.clone();
            }
            AttemptOutcome::Done {
                titles,
                filename,
                archive_name,
                archive_path,
            } => {
                self.titles = titles.clone();
                self.filename = Some(filename.clone());
                self.archive_name = Some(archive_name.clone());
                self.archive_path = Some(archive_path.clone());
                self.last_error = None;
            }
            AttemptOutcome::Cancelled { .. } => {}
            AttemptOutcome::Error { message } => {
                self.last_error = Some(message.clone());
            }
        }
    }
}

/// Owns every run snapshot for the lifetime of the process.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<RunId, RunState>>,
}

impl fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runs = self.runs.try_lock().map(|guard| guard.len());
        f.debug_struct("RunRegistry").field("runs", &runs).finish()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new `Pending` run. Blank items are discarded; a batch
    /// with nothing left is rejected.
    pub fn create(&self, items: Vec<String>) -> Result<RunId> {
        let items: Vec<String> = items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(RunError::EmptyItems);
        }

        let run_id = RunId::new();
        let now = Utc::now();
        self.runs.lock().insert(
            run_id,
            RunState {
                items,
                status: RunStatus::Pending,
                attempt: 0,
                attempt_finished: false,
                titles: Vec::new(),
                long_labels: Vec::new(),
                filename: None,
                archive_name: None,
                archive_path: None,
                last_error: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(run_id)
    }

    pub fn snapshot(&self, run_id: &RunId) -> Result<RunView> {
        self.runs
            .lock()
            .get(run_id)
            .map(|state| state.view(*run_id))
            .ok_or(RunError::NotFound(*run_id))
    }

    pub fn contains(&self, run_id: &RunId) -> bool {
        self.runs.lock().contains_key(run_id)
    }

    pub fn status(&self, run_id: &RunId) -> Result<RunStatus> {
        self.runs
            .lock()
            .get(run_id)
            .map(|state| state.status)
            .ok_or(RunError::NotFound(*run_id))
    }

    /// Moves a `Pending` or `AwaitingResolution` run to `Running` under a
    /// new attempt number.
    pub fn begin_attempt(&self, run_id: &RunId) -> Result<AttemptTicket> {
        let mut runs = self.runs.lock();
        let state = runs.get_mut(run_id).ok_or(RunError::NotFound(*run_id))?;
        if !state.can_begin_attempt() {
            return Err(RunError::NotAwaitingResolution(*run_id));
        }

        state.attempt += 1;
        state.attempt_finished = false;
        state.status = RunStatus::Running;
        state.long_labels.clear();
        state.updated_at = Utc::now();

        Ok(AttemptTicket {
            attempt: state.attempt,
            items: state.items.clone(),
        })
    }

    /// Applies the finishing transition of `attempt`.
    ///
    /// Only the first finishing transition of the run's current attempt is
    /// applied; later or stale ones return `Ok(None)`.
    pub fn transition(
        &self,
        run_id: &RunId,
        attempt: u32,
        outcome: &AttemptOutcome,
    ) -> Result<Option<TransitionReceipt>> {
        let mut runs = self.runs.lock();
        let state = runs.get_mut(run_id).ok_or(RunError::NotFound(*run_id))?;

        if state.attempt != attempt
            || state.attempt_finished
            || state.status != RunStatus::Running
        {
            debug!(
                run = %run_id,
                attempt,
                current_attempt = state.attempt,
                status = state.status.as_str(),
                next = outcome.status().as_str(),
                "ignoring stale transition"
            );
            return Ok(None);
        }

        state.apply(outcome, Utc::now());
        Ok(Some(TransitionReceipt {
            items: state.items.clone(),
            titles: match outcome {
                AttemptOutcome::Done { titles, .. } => titles.clone(),
                _ => state.items.clone(),
            },
        }))
    }

    /// Archive location of a run that reached `Done`.
    pub fn archive_path(&self, run_id: &RunId) -> Result<Option<PathBuf>> {
        let runs = self.runs.lock();
        let state = runs.get(run_id).ok_or(RunError::NotFound(*run_id))?;
        if state.status != RunStatus::Done {
            return Ok(None);
        }
        Ok(state.archive_path.clone())
    }

    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(name: &str) -> AttemptOutcome {
        AttemptOutcome::Done {
            titles: vec!["Widget".into()],
            filename: format!("{name}.csv"),
            archive_name: format!("{name}.tar.zst"),
            archive_path: PathBuf::from(format!("/tmp/{name}.tar.zst")),
        }
    }

    #[test]
    fn create_rejects_empty_and_blank_batches() {
        let registry = RunRegistry::new();
        assert!(matches!(registry.create(vec![]), Err(RunError::EmptyItems)));
        assert!(matches!(
            registry.create(vec!["  ".into(), String::new()]),
            Err(RunError::EmptyItems)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn create_trims_items_and_starts_pending() {
        let registry = RunRegistry::new();
        let run_id = registry
            .create(vec![" A1 ".into(), "".into(), "A2".into()])
            .unwrap();
        let view = registry.snapshot(&run_id).unwrap();
        assert_eq!(view.items, ["A1", "A2"]);
        assert_eq!(view.status, RunStatus::Pending);
        assert_eq!(view.attempt, 0);
    }

    #[test]
    fn snapshot_of_unknown_run_is_not_found() {
        let registry = RunRegistry::new();
        let missing = RunId::new();
        assert!(matches!(
            registry.snapshot(&missing),
            Err(RunError::NotFound(id)) if id == missing
        ));
    }

    #[test]
    fn first_finishing_transition_wins() {
        let registry = RunRegistry::new();
        let run_id = registry.create(vec!["A1".into()]).unwrap();
        let ticket = registry.begin_attempt(&run_id).unwrap();

        let first = registry
            .transition(&run_id, ticket.attempt, &done("first"))
            .unwrap();
        assert!(first.is_some());

        let cancelled = AttemptOutcome::Cancelled {
            message: "late".into(),
        };
        let second = registry
            .transition(&run_id, ticket.attempt, &cancelled)
            .unwrap();
        assert!(second.is_none());

        let view = registry.snapshot(&run_id).unwrap();
        assert_eq!(view.status, RunStatus::Done);
        assert_eq!(view.archive_name.as_deref(), Some("first.tar.zst"));
    }

    #[test]
    fn resolution_starts_a_new_attempt_and_ignores_stale_ones() {
        let registry = RunRegistry::new();
        let run_id = registry.create(vec!["A1".into()]).unwrap();
        let first = registry.begin_attempt(&run_id).unwrap();
        assert_eq!(first.attempt, 1);

        // A second begin while running is refused.
        assert!(matches!(
            registry.begin_attempt(&run_id),
            Err(RunError::NotAwaitingResolution(_))
        ));

        let checkpoint = AttemptOutcome::NeedsResolution {
            long_labels: vec!["Very Long Attribute Label Example".into()],
        };
        registry
            .transition(&run_id, first.attempt, &checkpoint)
            .unwrap()
            .unwrap();
        let view = registry.snapshot(&run_id).unwrap();
        assert_eq!(view.status, RunStatus::AwaitingResolution);
        assert_eq!(view.long_labels.len(), 1);

        let second = registry.begin_attempt(&run_id).unwrap();
        assert_eq!(second.attempt, 2);

        let stale = registry
            .transition(&run_id, first.attempt, &done("stale"))
            .unwrap();
        assert!(stale.is_none(), "attempt 1 no longer owns the run");

        registry
            .transition(&run_id, second.attempt, &done("fresh"))
            .unwrap()
            .unwrap();
        assert_eq!(
            registry.archive_path(&run_id).unwrap(),
            Some(PathBuf::from("/tmp/fresh.tar.zst"))
        );
    }

    #[test]
    fn archive_path_requires_done() {
        let registry = RunRegistry::new();
        let run_id = registry.create(vec!["A1".into()]).unwrap();
        let ticket = registry.begin_attempt(&run_id).unwrap();
        registry
            .transition(
                &run_id,
                ticket.attempt,
                &AttemptOutcome::Error {
                    message: "boom".into(),
                },
            )
            .unwrap();

        assert_eq!(registry.archive_path(&run_id).unwrap(), None);
        let view = registry.snapshot(&run_id).unwrap();
        assert_eq!(view.last_error.as_deref(), Some("boom"));
        assert!(view.status.is_terminal());
    }
}
