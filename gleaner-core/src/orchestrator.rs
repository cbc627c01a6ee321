//! Drives runs from creation to their terminal outcome.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use gleaner_model::{
    HistoryEntry, ReplacementMap, RunId, RunStatus, RunView, truncate_chars,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    cancel::CancellationController,
    channel::{EventChannel, EventSubscription, LogSink},
    collaborators::{
        ExtractError, Extraction, Extractor, Packager, default_export_filename,
    },
    error::{Result, RunError},
    ledger::HistoryLedger,
    registry::{AttemptOutcome, AttemptTicket, RunRegistry},
    replacements::ReplacementStore,
};

/// Longest message stored for a failed attempt.
pub const ERROR_MESSAGE_LIMIT: usize = 500;

const CANCELLED_BY_USER: &str = "cancelled by user";
const CANCELLED_BY_SIGNAL: &str = "run cancelled before completion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The active attempt was finished as cancelled.
    Cancelled { attempt: u32 },
    /// Nothing was running for the run; no event or history entry.
    NoActiveAttempt,
}

/// A downloadable archive that exists on disk and is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    pub path: PathBuf,
    pub file_name: String,
    pub len: u64,
}

#[derive(Debug)]
struct ActiveAttempt {
    attempt: u32,
    controller: CancellationController,
}

/// Entry point for creating, observing, resolving and cancelling runs.
///
/// Cheap to clone; clones share the same registry, ledger and attempt
/// table.
#[derive(Clone)]
pub struct RunOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    registry: RunRegistry,
    events: EventChannel,
    ledger: HistoryLedger,
    replacements: ReplacementStore,
    extractor: Arc<dyn Extractor>,
    packager: Arc<dyn Packager>,
    output_dir: PathBuf,
    // Guards attempt start, finish and cancel so that each attempt's
    // transition, ledger entry and finishing event happen as one step.
    active: Mutex<HashMap<RunId, ActiveAttempt>>,
}

impl fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.inner.active.try_lock().ok().map(|guard| guard.len());
        f.debug_struct("RunOrchestrator")
            .field("registry", &self.inner.registry)
            .field("active_attempts", &active)
            .field("ledger", &self.inner.ledger.path())
            .field("output_dir", &self.inner.output_dir)
            .finish()
    }
}

impl RunOrchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        packager: Arc<dyn Packager>,
        ledger: HistoryLedger,
        replacements: ReplacementStore,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                registry: RunRegistry::new(),
                events: EventChannel::new(),
                ledger,
                replacements,
                extractor,
                packager,
                output_dir: output_dir.into(),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.inner.output_dir
    }

    /// Registers a run and launches its first attempt in the background.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn create_run(&self, items: Vec<String>) -> Result<RunId> {
        let run_id = self.inner.registry.create(items)?;
        let mut active = self.inner.active.lock().await;
        self.launch_locked(&mut active, run_id)?;
        Ok(run_id)
    }

    /// Live events for `run_id` from now on. The subscription of a run
    /// that has already finished ends without events.
    pub fn subscribe(&self, run_id: &RunId) -> Result<EventSubscription> {
        if !self.inner.registry.contains(run_id) {
            return Err(RunError::NotFound(*run_id));
        }
        let subscription = self.inner.events.subscribe(*run_id);
        if self
            .inner
            .registry
            .status(run_id)
            .is_ok_and(RunStatus::is_terminal)
        {
            self.inner.events.close(run_id);
        }
        Ok(subscription)
    }

    pub fn snapshot(&self, run_id: &RunId) -> Result<RunView> {
        self.inner.registry.snapshot(run_id)
    }

    /// Merges `replacements` into the stored map and restarts the run under
    /// the same id. Returns the new attempt number.
    ///
    /// Nothing is stored unless every entry is valid.
    #[instrument(skip(self, replacements), fields(entries = replacements.len()))]
    pub async fn resolve(
        &self,
        run_id: &RunId,
        replacements: BTreeMap<String, String>,
    ) -> Result<u32> {
        let mut active = self.inner.active.lock().await;
        if self.inner.registry.status(run_id)?
            != RunStatus::AwaitingResolution
        {
            return Err(RunError::NotAwaitingResolution(*run_id));
        }
        let replacements = ReplacementMap::try_from(replacements)?;

        let merged = self.inner.replacements.merge(&replacements).await;
        info!(
            run = %run_id,
            submitted = replacements.len(),
            stored = merged.len(),
            "replacements merged"
        );

        self.launch_locked(&mut active, *run_id)
    }

    /// Finishes the run's active attempt as cancelled and signals it to stop.
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: &RunId) -> CancelOutcome {
        let mut active = self.inner.active.lock().await;
        let Some(entry) = active.remove(run_id) else {
            debug!(run = %run_id, "cancel ignored; no active attempt");
            return CancelOutcome::NoActiveAttempt;
        };

        entry.controller.cancel();
        let outcome = AttemptOutcome::Cancelled {
            message: CANCELLED_BY_USER.to_string(),
        };
        if self.finish_locked(*run_id, entry.attempt, outcome).await {
            CancelOutcome::Cancelled {
                attempt: entry.attempt,
            }
        } else {
            CancelOutcome::NoActiveAttempt
        }
    }

    /// Every recorded attempt outcome, most recent first.
    pub async fn list_history(&self) -> Vec<HistoryEntry> {
        self.inner.ledger.list().await
    }

    /// Locates the archive of a run that finished successfully.
    ///
    /// Runs unknown to this process are looked up through the ledger.
    pub async fn download(&self, run_id: &RunId) -> Result<ArchiveHandle> {
        let path = match self.inner.registry.archive_path(run_id) {
            Ok(Some(path)) => path,
            Ok(None) => return Err(RunError::ArchiveUnavailable(*run_id)),
            Err(RunError::NotFound(_)) => {
                let entry = self
                    .inner
                    .ledger
                    .latest_done(run_id)
                    .await
                    .ok_or(RunError::NotFound(*run_id))?;
                entry
                    .archive_name()
                    .and_then(|name| self.archive_in_output_dir(name))
                    .ok_or(RunError::ArchiveUnavailable(*run_id))?
            }
            Err(err) => return Err(err),
        };

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(
                    run = %run_id,
                    path = %path.display(),
                    error = %err,
                    "archive missing on disk"
                );
                return Err(RunError::ArchiveUnavailable(*run_id));
            }
        };
        if !metadata.is_file() || metadata.len() == 0 {
            warn!(run = %run_id, path = %path.display(), "archive is empty");
            return Err(RunError::ArchiveUnavailable(*run_id));
        }

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{run_id}.tar.zst"));

        Ok(ArchiveHandle {
            path,
            file_name,
            len: metadata.len(),
        })
    }

    pub async fn replacements(&self) -> ReplacementMap {
        self.inner.replacements.load().await
    }

    /// Replaces the stored replacement map. An invalid entry leaves the
    /// stored map untouched.
    pub async fn save_replacements(
        &self,
        replacements: BTreeMap<String, String>,
    ) -> Result<ReplacementMap> {
        let replacements = ReplacementMap::try_from(replacements)?;
        Ok(self.inner.replacements.replace(replacements).await)
    }

    pub async fn active_attempts(&self) -> usize {
        self.inner.active.lock().await.len()
    }

    /// Signals every active attempt to stop. Attempts report their own
    /// cancellation once they observe it.
    pub async fn shutdown(&self) {
        let active = self.inner.active.lock().await;
        for (run_id, entry) in active.iter() {
            debug!(run = %run_id, attempt = entry.attempt, "signalling attempt");
            entry.controller.cancel();
        }
        info!(count = active.len(), "signalled active attempts");
    }

    fn archive_in_output_dir(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        // Only bare file names resolve against the output directory.
        if candidate.file_name()? != candidate.as_os_str() {
            return None;
        }
        Some(self.inner.output_dir.join(candidate))
    }

    fn launch_locked(
        &self,
        active: &mut HashMap<RunId, ActiveAttempt>,
        run_id: RunId,
    ) -> Result<u32> {
        let ticket = self.inner.registry.begin_attempt(&run_id)?;
        let attempt = ticket.attempt;
        let controller = CancellationController::new();

        // `begin_attempt` refuses running runs, and every attempt leaves
        // this table under the same lock before its run stops running.
        let previous = active.insert(
            run_id,
            ActiveAttempt {
                attempt,
                controller: controller.clone(),
            },
        );
        debug_assert!(
            previous.is_none(),
            "run {run_id} already had an active attempt"
        );

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.drive_attempt(run_id, ticket, controller).await;
        });

        info!(run = %run_id, attempt, "attempt started");
        Ok(attempt)
    }

    async fn drive_attempt(
        self,
        run_id: RunId,
        ticket: AttemptTicket,
        controller: CancellationController,
    ) {
        let attempt = ticket.attempt;
        let worker = {
            let orchestrator = self.clone();
            let controller = controller.clone();
            tokio::spawn(async move {
                orchestrator.execute_attempt(run_id, ticket, controller).await
            })
        };

        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(run = %run_id, attempt, error = %err, "attempt task failed");
                AttemptOutcome::Error {
                    message: bounded(format!("attempt aborted: {err}")),
                }
            }
        };

        self.complete(run_id, attempt, outcome).await;
    }

    async fn execute_attempt(
        &self,
        run_id: RunId,
        ticket: AttemptTicket,
        controller: CancellationController,
    ) -> AttemptOutcome {
        let log = LogSink::new(
            self.inner.events.clone(),
            run_id,
            controller.clone(),
        );
        let replacements = self.inner.replacements.load().await;
        log.log(format!(
            "attempt {} started with {} items",
            ticket.attempt,
            ticket.items.len()
        ));

        let extraction = self
            .inner
            .extractor
            .extract(&ticket.items, &replacements, &log, controller.clone())
            .await;

        match extraction {
            Ok(Extraction::NeedsResolution { long_labels }) => {
                log.log(format!(
                    "{} labels need a shorter replacement",
                    long_labels.len()
                ));
                AttemptOutcome::NeedsResolution {
                    long_labels: long_labels.into_iter().collect(),
                }
            }
            Ok(Extraction::Success {
                records,
                suggested_filename,
            }) => {
                if controller.is_cancelled() {
                    return cancelled_by_signal();
                }
                let filename = if suggested_filename.trim().is_empty() {
                    default_export_filename(Utc::now())
                } else {
                    suggested_filename
                };

                log.log(format!("packaging {} records", records.len()));
                match self.inner.packager.package(&filename, &records).await {
                    Ok(archive) => AttemptOutcome::Done {
                        titles: records
                            .iter()
                            .map(|record| record.title().to_string())
                            .collect(),
                        filename,
                        archive_name: archive.archive_name,
                        archive_path: archive.archive_path,
                    },
                    Err(err) => {
                        warn!(run = %run_id, error = %err, "packaging failed");
                        AttemptOutcome::Error {
                            message: bounded(format!(
                                "failed to package artifacts: {err}"
                            )),
                        }
                    }
                }
            }
            Err(ExtractError::Cancelled) => cancelled_by_signal(),
            Err(_) if controller.is_cancelled() => cancelled_by_signal(),
            Err(err) => {
                warn!(run = %run_id, error = %err, "extraction failed");
                AttemptOutcome::Error {
                    message: bounded(err.to_string()),
                }
            }
        }
    }

    async fn complete(
        &self,
        run_id: RunId,
        attempt: u32,
        outcome: AttemptOutcome,
    ) {
        let mut active = self.inner.active.lock().await;
        if active
            .get(&run_id)
            .is_some_and(|entry| entry.attempt == attempt)
        {
            active.remove(&run_id);
        }
        self.finish_locked(run_id, attempt, outcome).await;
    }

    /// Applies a finishing transition, records it and notifies observers.
    /// Callers hold the attempt table lock.
    async fn finish_locked(
        &self,
        run_id: RunId,
        attempt: u32,
        outcome: AttemptOutcome,
    ) -> bool {
        let receipt =
            match self.inner.registry.transition(&run_id, attempt, &outcome) {
                Ok(Some(receipt)) => receipt,
                Ok(None) => return false,
                Err(err) => {
                    warn!(run = %run_id, error = %err, "cannot finish attempt");
                    return false;
                }
            };

        let history = outcome.to_history();
        let event = history.to_event();
        self.inner
            .ledger
            .append(HistoryEntry {
                run_id,
                attempt,
                timestamp: Utc::now(),
                items: receipt.items,
                titles: receipt.titles,
                outcome: history,
            })
            .await;
        self.inner.events.publish(run_id, event);

        info!(
            run = %run_id,
            attempt,
            status = outcome.status().as_str(),
            "attempt finished"
        );
        true
    }
}

fn cancelled_by_signal() -> AttemptOutcome {
    AttemptOutcome::Cancelled {
        message: CANCELLED_BY_SIGNAL.to_string(),
    }
}

fn bounded(message: String) -> String {
    truncate_chars(&message, ERROR_MESSAGE_LIMIT)
}
