use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum_test::TestServer;
use gleaner_core::{
    CancellationController, ExtractError, Extraction, Extractor,
    HistoryLedger, LogSink, PackageError, PackagedArchive, Packager,
    ReplacementStore, RunOrchestrator,
};
use gleaner_model::{ItemRecord, Record, ReplacementMap};
use gleaner_server::{
    AppState, create_app,
    infra::config::{ConfigLoader, EnvConfig},
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// What the next extraction does once released.
#[allow(unused)]
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(Vec<&'static str>),
    Resolve(Vec<&'static str>),
    Block,
}

/// Extractor driven by a script, one step per call. Each call waits for
/// [`GatedExtractor::release`] so tests can attach observers first.
#[derive(Debug)]
pub struct GatedExtractor {
    steps: Mutex<VecDeque<Step>>,
    permits: Semaphore,
}

#[allow(unused)]
impl GatedExtractor {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            permits: Semaphore::new(0),
        })
    }

    pub fn release(&self) {
        self.permits.add_permits(1);
    }
}

#[async_trait]
impl Extractor for GatedExtractor {
    async fn extract(
        &self,
        items: &[String],
        _replacements: &ReplacementMap,
        log: &LogSink,
        cancel: CancellationController,
    ) -> Result<Extraction, ExtractError> {
        let step = self.steps.lock().pop_front().unwrap_or(Step::Block);
        tokio::select! {
            permit = self.permits.acquire() => {
                if let Ok(permit) = permit {
                    permit.forget();
                }
            }
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
        }
        log.log(format!("[1/{}] fetching {}", items.len(), items[0]));

        match step {
            Step::Succeed(titles) => Ok(Extraction::Success {
                records: titles
                    .into_iter()
                    .zip(items)
                    .map(|(title, item)| {
                        Record::Extracted(ItemRecord {
                            item: item.clone(),
                            title: Some(title.to_string()),
                            ..Default::default()
                        })
                    })
                    .collect(),
                suggested_filename: "products.csv".into(),
            }),
            Step::Resolve(labels) => Ok(Extraction::NeedsResolution {
                long_labels: labels
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            }),
            Step::Block => {
                cancel.cancelled().await;
                Err(ExtractError::Cancelled)
            }
        }
    }
}

/// Writes a fixed payload where a real bundle would go.
#[derive(Debug)]
pub struct StubPackager {
    dir: PathBuf,
}

#[async_trait]
impl Packager for StubPackager {
    async fn package(
        &self,
        suggested_filename: &str,
        records: &[Record],
    ) -> Result<PackagedArchive, PackageError> {
        let archive_name = format!(
            "{}.tar.zst",
            suggested_filename.trim_end_matches(".csv")
        );
        let archive_path = self.dir.join(&archive_name);
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&archive_path, archive_bytes(records.len())).await?;
        Ok(PackagedArchive {
            archive_path,
            archive_name,
        })
    }
}

pub fn archive_bytes(records: usize) -> Vec<u8> {
    format!("archive with {records} records").into_bytes()
}

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub extractor: Arc<GatedExtractor>,
    _tempdir: TempDir,
}

#[allow(unused)]
pub fn build_test_app(steps: Vec<Step>) -> Result<TestApp> {
    let tempdir = TempDir::new()?;
    let env = EnvConfig {
        data_dir: Some(tempdir.path().join("data")),
        dev_mode: Some(true),
        ..Default::default()
    };
    let config = Arc::new(ConfigLoader::new().load_with_env(env, false)?.config);

    let extractor = GatedExtractor::new(steps);
    let packager = Arc::new(StubPackager {
        dir: config.storage.output_dir.clone(),
    });
    let orchestrator = RunOrchestrator::new(
        extractor.clone(),
        packager,
        HistoryLedger::new(&config.storage.history_path),
        ReplacementStore::new(&config.storage.replacements_path),
        &config.storage.output_dir,
    );
    let state = AppState::new(orchestrator, config);

    let server = TestServer::new(create_app(state.clone()))
        .map_err(|err| anyhow!(err.to_string()))?;

    Ok(TestApp {
        server,
        state,
        extractor,
        _tempdir: tempdir,
    })
}
