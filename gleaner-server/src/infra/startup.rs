use std::sync::Arc;

use anyhow::Context;
use gleaner_core::{
    BundlePackager, CatalogExtractor, CatalogExtractorConfig, HistoryLedger,
    ReplacementStore, RunOrchestrator,
};
use tracing::info;

use crate::infra::{app_state::AppState, config::Config};

/// Builds the production orchestrator and the shared application state.
pub fn wire_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let catalog = &config.catalog;
    let extractor = CatalogExtractor::new(CatalogExtractorConfig {
        base_url: catalog.base_url.clone(),
        item_delay: catalog.item_delay,
        request_timeout: catalog.request_timeout,
        user_agent: catalog.user_agent.clone(),
    })
    .context("failed to build catalog extractor")?;

    let mut packager = BundlePackager::new(&config.storage.output_dir);
    if catalog.download_attachments {
        let http = reqwest::Client::builder()
            .timeout(catalog.request_timeout)
            .user_agent(catalog.user_agent.clone())
            .build()
            .context("failed to build attachment client")?;
        packager = packager.with_attachment_client(http);
    }

    let orchestrator = RunOrchestrator::new(
        Arc::new(extractor),
        Arc::new(packager),
        HistoryLedger::new(&config.storage.history_path),
        ReplacementStore::new(&config.storage.replacements_path),
        &config.storage.output_dir,
    );

    info!(
        catalog = %catalog.base_url,
        history = %config.storage.history_path.display(),
        output = %config.storage.output_dir.display(),
        attachments = catalog.download_attachments,
        "run orchestrator ready"
    );

    Ok(AppState::new(orchestrator, config))
}
