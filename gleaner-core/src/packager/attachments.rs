//! Best-effort attachment downloads.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use tracing::{debug, warn};
use url::Url;

const MAX_NAME_CHARS: usize = 120;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[<>:"/\\|?*\x00-\x1f]+"#).expect("valid regex")
});

static DISPOSITION_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'')?"?([^";]+)"?"#)
        .expect("valid regex")
});

/// Makes `raw` safe as a single path component.
pub fn sanitize_name(raw: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(raw, "_");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let limited: String = trimmed.chars().take(MAX_NAME_CHARS).collect();
    if limited.is_empty() {
        "file".to_string()
    } else {
        limited
    }
}

fn filename_from_disposition(header: &str) -> Option<String> {
    let captured = DISPOSITION_FILENAME.captures(header)?.get(1)?.as_str();
    let decoded = urlencoding::decode(captured.trim())
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| captured.trim().to_string());
    Some(decoded).filter(|name| !name.is_empty())
}

fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    urlencoding::decode(segment)
        .map(|cow| cow.into_owned())
        .ok()
        .filter(|name| !name.is_empty())
}

/// `dir/name`, or `dir/name (n).ext` when taken.
async fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string();
    let extension = path.extension().and_then(|s| s.to_str());

    for n in 1.. {
        let next = match extension {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(next);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
    }
    unreachable!("unbounded range always yields a free name")
}

/// Downloads every URL in `urls` into `dir`. Failures are logged and
/// skipped. Returns the number of files written.
pub(crate) async fn download_all(
    http: &reqwest::Client,
    dir: &Path,
    urls: &[String],
) -> usize {
    if urls.is_empty() {
        return 0;
    }
    if let Err(err) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %err, "cannot create attachment dir");
        return 0;
    }

    let mut written = 0;
    for raw in urls {
        match download_one(http, dir, raw).await {
            Ok(path) => {
                debug!(url = %raw, path = %path.display(), "attachment saved");
                written += 1;
            }
            Err(err) => {
                warn!(url = %raw, error = %err, "attachment download failed");
            }
        }
    }
    written
}

async fn download_one(
    http: &reqwest::Client,
    dir: &Path,
    raw: &str,
) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
    let url = Url::parse(raw)?;
    let response = http.get(url.clone()).send().await?.error_for_status()?;

    let name = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_disposition)
        .or_else(|| filename_from_url(&url))
        .unwrap_or_else(|| "attachment".to_string());

    let bytes = response.bytes().await?;
    let path = unique_path(dir, &sanitize_name(&name)).await;
    tokio::fs::write(&path, &bytes).await?;
    Ok(path)
}
