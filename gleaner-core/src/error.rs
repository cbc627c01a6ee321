use gleaner_model::{ModelError, RunId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("a run needs at least one item")]
    EmptyItems,

    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("run {0} is not awaiting resolution")]
    NotAwaitingResolution(RunId),

    #[error("no archive available for run {0}")]
    ArchiveUnavailable(RunId),

    #[error("invalid replacement: {0}")]
    InvalidReplacement(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, RunError>;
