use std::{fmt, sync::Arc};

use gleaner_core::RunOrchestrator;

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: RunOrchestrator,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(orchestrator: RunOrchestrator, config: Arc<Config>) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn orchestrator(&self) -> &RunOrchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
