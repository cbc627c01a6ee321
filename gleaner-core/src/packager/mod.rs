//! Archive packager.
//!
//! Stages a CSV export plus per-record attachment folders in a private
//! directory under the output directory, then compresses it into
//! `<base>.tar.zst`, or `<base> (n).tar.zst` when that name is taken.

mod attachments;
mod csv;

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use gleaner_model::Record;
use tracing::{info, warn};

use crate::collaborators::{PackageError, PackagedArchive, Packager};

pub use attachments::sanitize_name;

const ZSTD_LEVEL: i32 = 3;
const FALLBACK_BASE: &str = "catalog_products";
const ARCHIVE_EXTENSION: &str = "tar.zst";

#[derive(Debug, Clone)]
pub struct BundlePackager {
    output_dir: PathBuf,
    http: Option<reqwest::Client>,
}

impl BundlePackager {
    /// A packager that writes only the CSV export.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            http: None,
        }
    }

    /// Enables attachment downloads through `http`.
    pub fn with_attachment_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn stage_attachments(
        &self,
        http: &reqwest::Client,
        staging: &Path,
        records: &[Record],
    ) {
        let mut saved = 0;
        for record in records {
            let Record::Extracted(item) = record else {
                continue;
            };
            if item.documents.is_empty() && item.certificates.is_empty() {
                continue;
            }

            let folder = staging.join(sanitize_name(record.title()));
            saved += attachments::download_all(
                http,
                &folder.join("documents"),
                &item.documents,
            )
            .await;
            saved += attachments::download_all(
                http,
                &folder.join("certificates"),
                &item.certificates,
            )
            .await;
        }
        if saved > 0 {
            info!(saved, "attachments staged");
        }
    }
}

fn archive_base(suggested_filename: &str) -> String {
    let stem = Path::new(suggested_filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    if stem.trim().is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        sanitize_name(stem)
    }
}

/// Writes `staging` into a zstd-compressed tarball at `archive` under the
/// top-level directory `base`. The file only appears once complete.
fn write_archive(
    staging: &Path,
    base: &str,
    archive: &Path,
) -> std::io::Result<()> {
    let mut partial = archive.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let file = File::create(&partial)?;
    let encoder = zstd::Encoder::new(file, ZSTD_LEVEL)?;
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(base, staging)?;
    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    file.sync_all()?;

    std::fs::rename(&partial, archive)
}

/// Claims the first free `<base>.tar.zst` or `<base> (n).tar.zst` in `dir`
/// by creating an empty placeholder, so concurrent calls never share one.
async fn reserve_archive(
    dir: &Path,
    base: &str,
) -> std::io::Result<(PathBuf, String)> {
    for n in 0u32.. {
        let name = match n {
            0 => format!("{base}.{ARCHIVE_EXTENSION}"),
            n => format!("{base} ({n}).{ARCHIVE_EXTENSION}"),
        };
        let path = dir.join(&name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => return Ok((path, name)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                continue;
            }
            Err(err) => return Err(err),
        }
    }
    Err(std::io::Error::other("no free archive name"))
}

#[async_trait]
impl Packager for BundlePackager {
    async fn package(
        &self,
        suggested_filename: &str,
        records: &[Record],
    ) -> Result<PackagedArchive, PackageError> {
        let base = archive_base(suggested_filename);
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.output_dir)?;

        let csv_path = staging.path().join(format!("{base}.csv"));
        tokio::fs::write(&csv_path, csv::render(records)).await?;

        if let Some(http) = &self.http {
            self.stage_attachments(http, staging.path(), records).await;
        }

        let (archive_path, archive_name) =
            reserve_archive(&self.output_dir, &base).await?;

        let task_staging = staging.path().to_path_buf();
        let task_base = base.clone();
        let task_archive = archive_path.clone();
        let written = tokio::task::spawn_blocking(move || {
            write_archive(&task_staging, &task_base, &task_archive)
        })
        .await
        .map_err(|err| PackageError::Task(err.to_string()))
        .and_then(|result| result.map_err(PackageError::from));

        let len = match written {
            Ok(()) => tokio::fs::metadata(&archive_path).await?.len(),
            Err(err) => {
                let _ = tokio::fs::remove_file(&archive_path).await;
                return Err(err);
            }
        };
        if len == 0 {
            let _ = tokio::fs::remove_file(&archive_path).await;
            return Err(PackageError::EmptyArchive(archive_path));
        }

        let staging_dir = staging.path().to_path_buf();
        if let Err(err) = staging.close() {
            warn!(
                dir = %staging_dir.display(),
                error = %err,
                "failed to remove staging directory"
            );
        }

        info!(
            archive = %archive_path.display(),
            bytes = len,
            records = records.len(),
            "archive written"
        );
        Ok(PackagedArchive {
            archive_path,
            archive_name,
        })
    }
}
