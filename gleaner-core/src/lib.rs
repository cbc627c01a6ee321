//! Run lifecycle orchestration.
//!
//! A run is created from a batch of items and executed by one background
//! attempt at a time. Each attempt drives an [`Extractor`], may pause for
//! human resolution of over-length labels, hands successful output to a
//! [`Packager`], and finishes with exactly one outcome that is broadcast to
//! observers and appended to the [`HistoryLedger`].

pub mod cancel;
pub mod catalog;
pub mod channel;
pub mod collaborators;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod packager;
mod persist;
pub mod registry;
pub mod replacements;

pub use cancel::CancellationController;
pub use catalog::{CatalogExtractor, CatalogExtractorConfig};
pub use channel::{EventChannel, EventSubscription, LogSink};
pub use collaborators::{
    ExtractError, Extraction, Extractor, PackageError, PackagedArchive,
    Packager,
};
pub use error::{Result, RunError};
pub use ledger::HistoryLedger;
pub use orchestrator::{
    ArchiveHandle, CancelOutcome, ERROR_MESSAGE_LIMIT, RunOrchestrator,
};
pub use packager::BundlePackager;
pub use persist::StoreError;
pub use registry::{AttemptOutcome, RunRegistry};
pub use replacements::ReplacementStore;
