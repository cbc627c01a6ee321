//! Wire types for the HTTP boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    history::HistoryEntry, ids::RunId, replacements::ReplacementMap,
};

/// Route constants for the HTTP surface.
pub mod routes {
    pub mod v1 {
        pub const RUNS: &str = "/runs";
        pub const RUN: &str = "/runs/{run_id}";
        pub const RUN_EVENTS: &str = "/runs/{run_id}/events";
        pub const RUN_RESOLVE: &str = "/runs/{run_id}/resolve";
        pub const RUN_CANCEL: &str = "/runs/{run_id}/cancel";
        pub const RUN_ARCHIVE: &str = "/runs/{run_id}/archive";
        pub const HISTORY: &str = "/history";
        pub const REPLACEMENTS: &str = "/replacements";
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(error),
            message: None,
        }
    }

    pub fn with_message(mut self, message: String) -> Self {
        self.message = Some(message);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAcceptedResponse {
    pub run_id: RunId,
}

/// Raw label replacements as submitted; validated into a
/// [`ReplacementMap`] by the receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveRunRequest {
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResolvedResponse {
    pub run_id: RunId,
    pub attempt: u32,
}

/// `cancelled` is false when the run had no active attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCancelResponse {
    pub run_id: RunId,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveReplacementsRequest {
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplacementsResponse {
    pub replacements: ReplacementMap,
    pub count: usize,
}
