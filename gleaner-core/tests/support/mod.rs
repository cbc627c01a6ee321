#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use gleaner_core::{
    CancellationController, EventSubscription, ExtractError, Extraction,
    Extractor, HistoryLedger, LogSink, PackageError, PackagedArchive,
    Packager, ReplacementStore, RunOrchestrator,
};
use gleaner_model::{
    ItemRecord, Record, ReplacementMap, RunEvent, RunEventFrame,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const WAIT: Duration = Duration::from_secs(5);

/// What the next `extract` call does once it is released.
#[derive(Debug, Clone)]
pub enum Step {
    Resolve(Vec<String>),
    Succeed(Vec<Record>),
    Fail(String),
    /// Waits for cancellation and reports it.
    Block,
    /// Waits for a release while ignoring cancellation, then succeeds.
    Stubborn(Vec<Record>),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub items: Vec<String>,
    pub replacements: ReplacementMap,
}

/// Extractor that replays scripted steps, one per call.
///
/// Every call waits for a permit from [`ScriptedExtractor::release`]
/// before acting, so tests can subscribe before anything is published.
#[derive(Debug)]
pub struct ScriptedExtractor {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    permits: Semaphore,
}

impl ScriptedExtractor {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            permits: Semaphore::new(0),
        })
    }

    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    async fn wait_for_release(
        &self,
        cancel: &CancellationController,
    ) -> Result<(), ExtractError> {
        tokio::select! {
            permit = self.permits.acquire() => {
                if let Ok(permit) = permit {
                    permit.forget();
                }
                Ok(())
            }
            _ = cancel.cancelled() => Err(ExtractError::Cancelled),
        }
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(
        &self,
        items: &[String],
        replacements: &ReplacementMap,
        log: &LogSink,
        cancel: CancellationController,
    ) -> Result<Extraction, ExtractError> {
        self.calls.lock().push(Call {
            items: items.to_vec(),
            replacements: replacements.clone(),
        });
        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or(Step::Fail("no scripted step left".into()));

        if let Step::Stubborn(records) = step {
            if let Ok(permit) = self.permits.acquire().await {
                permit.forget();
            }
            log.log("stubborn extractor finished");
            return Ok(success(records));
        }

        self.wait_for_release(&cancel).await?;
        log.log(format!("extracting {} items", items.len()));

        match step {
            Step::Resolve(labels) => Ok(Extraction::NeedsResolution {
                long_labels: labels.into_iter().collect(),
            }),
            Step::Succeed(records) => Ok(success(records)),
            Step::Fail(message) => Err(ExtractError::Transport(message)),
            Step::Block => {
                cancel.cancelled().await;
                Err(ExtractError::Cancelled)
            }
            Step::Stubborn(_) => unreachable!("handled above"),
        }
    }
}

fn success(records: Vec<Record>) -> Extraction {
    Extraction::Success {
        records,
        suggested_filename: "export.csv".into(),
    }
}

/// Writes a small placeholder archive instead of a real bundle.
#[derive(Debug)]
pub struct FilePackager {
    dir: PathBuf,
}

impl FilePackager {
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
        })
    }
}

#[async_trait]
impl Packager for FilePackager {
    async fn package(
        &self,
        suggested_filename: &str,
        records: &[Record],
    ) -> Result<PackagedArchive, PackageError> {
        let stem = suggested_filename.trim_end_matches(".csv");
        let archive_name = format!("{stem}.tar.zst");
        let archive_path = self.dir.join(&archive_name);
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&archive_path, format!("{} records", records.len()))
            .await?;
        Ok(PackagedArchive {
            archive_path,
            archive_name,
        })
    }
}

#[derive(Debug)]
pub struct FailingPackager;

#[async_trait]
impl Packager for FailingPackager {
    async fn package(
        &self,
        _suggested_filename: &str,
        _records: &[Record],
    ) -> Result<PackagedArchive, PackageError> {
        Err(PackageError::Io(std::io::Error::other("disk full")))
    }
}

pub struct Harness {
    pub orchestrator: RunOrchestrator,
    pub extractor: Arc<ScriptedExtractor>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let extractor = ScriptedExtractor::new(steps);
        let packager = FilePackager::new(&dir.path().join("out"));
        let orchestrator =
            orchestrator_in(dir.path(), extractor.clone(), packager);
        Self {
            orchestrator,
            extractor,
            dir,
        }
    }

    pub fn with_packager(
        steps: impl IntoIterator<Item = Step>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let extractor = ScriptedExtractor::new(steps);
        let orchestrator =
            orchestrator_in(dir.path(), extractor.clone(), packager);
        Self {
            orchestrator,
            extractor,
            dir,
        }
    }

    /// A fresh orchestrator over the same files, as after a restart.
    pub fn restarted(&self) -> RunOrchestrator {
        let extractor = ScriptedExtractor::new(Vec::new());
        let packager = FilePackager::new(&self.dir.path().join("out"));
        orchestrator_in(self.dir.path(), extractor, packager)
    }
}

pub fn orchestrator_in(
    root: &Path,
    extractor: Arc<dyn Extractor>,
    packager: Arc<dyn Packager>,
) -> RunOrchestrator {
    RunOrchestrator::new(
        extractor,
        packager,
        HistoryLedger::new(root.join("history.json")),
        ReplacementStore::new(root.join("replacements.json")),
        root.join("out"),
    )
}

pub fn record(item: &str, title: &str) -> Record {
    Record::Extracted(ItemRecord {
        item: item.into(),
        title: Some(title.into()),
        ..Default::default()
    })
}

pub fn items(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Next frame, failing the test if none arrives in time.
pub async fn next_frame(
    subscription: &mut EventSubscription,
) -> RunEventFrame {
    tokio::time::timeout(WAIT, subscription.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skips log frames and returns the next finishing one.
pub async fn next_finishing(
    subscription: &mut EventSubscription,
) -> RunEventFrame {
    loop {
        let frame = next_frame(subscription).await;
        if frame.event.is_finishing() {
            return frame;
        }
    }
}

/// Asserts that nothing else is published for a short while.
pub async fn assert_quiet(subscription: &mut EventSubscription) {
    let outcome =
        tokio::time::timeout(Duration::from_millis(200), subscription.recv())
            .await;
    if let Ok(Some(frame)) = outcome {
        panic!("unexpected event after finish: {:?}", frame.event);
    }
}

pub async fn wait_until_idle(orchestrator: &RunOrchestrator) {
    tokio::time::timeout(WAIT, async {
        while orchestrator.active_attempts().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("attempts did not settle");
    // Let the attempt task finish its stale commit, if any.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn is_log(event: &RunEvent) -> bool {
    matches!(event, RunEvent::Log { .. })
}
