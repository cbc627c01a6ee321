//! Contracts for the pluggable halves of an attempt.

use std::{collections::BTreeSet, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gleaner_model::{Record, ReplacementMap};
use thiserror::Error;

use crate::{cancel::CancellationController, channel::LogSink};

/// Result of one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Labels at or over the length limit were produced; the run must wait
    /// for replacements.
    NeedsResolution { long_labels: BTreeSet<String> },
    Success {
        records: Vec<Record>,
        suggested_filename: String,
    },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extraction cancelled")]
    Cancelled,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid source configuration: {0}")]
    InvalidSource(String),
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        ExtractError::Transport(err.to_string())
    }
}

/// Fetches and converts a batch of items.
///
/// Implementations check `cancel` between items and return
/// [`ExtractError::Cancelled`] once they stop because of it. Per-item
/// failures belong in degraded records, not in the error channel.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        items: &[String],
        replacements: &ReplacementMap,
        log: &LogSink,
        cancel: CancellationController,
    ) -> Result<Extraction, ExtractError>;
}

/// A finished archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub archive_path: PathBuf,
    pub archive_name: String,
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive {0} is empty")]
    EmptyArchive(PathBuf),

    #[error("archive task failed: {0}")]
    Task(String),
}

/// Bundles extracted records into a downloadable archive.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(
        &self,
        suggested_filename: &str,
        records: &[Record],
    ) -> Result<PackagedArchive, PackageError>;
}

/// Export name used when an extractor does not suggest one.
pub fn default_export_filename(now: DateTime<Utc>) -> String {
    format!("catalog_products_{}.csv", now.format("%Y%m%dT%H%M%SZ"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn default_filename_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            default_export_filename(now),
            "catalog_products_20260301T123005Z.csv"
        );
    }
}
