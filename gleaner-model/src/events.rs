use serde::{Deserialize, Serialize};

use crate::ids::RunId;

/// Progress event broadcast to a run's observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    Log {
        message: String,
    },
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

impl RunEvent {
    pub fn log(message: impl Into<String>) -> Self {
        RunEvent::Log {
            message: message.into(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            RunEvent::Log { .. } => "log",
            RunEvent::NeedsResolution { .. } => "needs_resolution",
            RunEvent::Done { .. } => "done",
            RunEvent::Cancelled { .. } => "cancelled",
            RunEvent::Error { .. } => "error",
        }
    }

    /// One of these closes every attempt.
    pub fn is_finishing(&self) -> bool {
        !matches!(self, RunEvent::Log { .. })
    }

    /// Ends the run's current attempt for good; observers can disconnect.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::Done { .. }
                | RunEvent::Cancelled { .. }
                | RunEvent::Error { .. }
        )
    }
}

/// A [`RunEvent`] stamped with the run's sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEventFrame {
    pub run_id: RunId,
    pub sequence: u64,
    pub event: RunEvent,
}
