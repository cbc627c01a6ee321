//! Core data model definitions shared across Gleaner crates.
#![allow(missing_docs)]

pub mod api;
pub mod error;
pub mod events;
pub mod history;
pub mod ids;
pub mod records;
pub mod replacements;
pub mod run;

// Intentionally curated re-exports for downstream consumers.
pub use api::ApiResponse;
pub use error::{ModelError, Result as ModelResult};
pub use events::{RunEvent, RunEventFrame};
pub use history::{HistoryEntry, HistoryOutcome, HistoryStatus};
pub use ids::RunId;
pub use records::{
    Attribute, DegradedRecord, ItemRecord, Record, truncate_chars,
};
pub use replacements::{LABEL_LENGTH_LIMIT, ReplacementMap, label_len};
pub use run::{RunStatus, RunView};
