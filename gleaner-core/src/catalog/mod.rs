//! HTTP catalog extractor.
//!
//! Fetches one JSON product document per item from
//! `{base_url}/{item}`, strictly one item at a time with a cancellable
//! pause in between.

mod document;

use std::{collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use gleaner_model::{DegradedRecord, Record, ReplacementMap};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
    cancel::CancellationController,
    channel::LogSink,
    collaborators::{
        ExtractError, Extraction, Extractor, default_export_filename,
    },
};

use self::document::ProductDocument;

#[derive(Debug, Clone)]
pub struct CatalogExtractorConfig {
    pub base_url: Url,
    pub item_delay: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl CatalogExtractorConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            item_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("gleaner/", env!("CARGO_PKG_VERSION"))
                .to_string(),
        }
    }
}

#[derive(Debug, Error)]
enum ItemFetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("catalog responded with status {0}")]
    Status(u16),

    #[error("unreadable product document: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct CatalogExtractor {
    http: reqwest::Client,
    base_url: Url,
    item_delay: Duration,
}

impl CatalogExtractor {
    pub fn new(config: CatalogExtractorConfig) -> Result<Self, ExtractError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ExtractError::InvalidSource(format!(
                "{} cannot be used as a base URL",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self {
            http,
            base_url: with_trailing_slash(config.base_url),
            item_delay: config.item_delay,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn item_url(&self, item: &str) -> Result<Url, ExtractError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ExtractError::InvalidSource(format!(
                    "{} cannot be used as a base URL",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(item);
        Ok(url)
    }

    async fn fetch_item(
        &self,
        url: &Url,
    ) -> Result<ProductDocument, ItemFetchError> {
        let response = self.http.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ItemFetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<ProductDocument>(&body)
            .map_err(|err| ItemFetchError::Decode(err.to_string()))
    }
}

#[async_trait]
impl Extractor for CatalogExtractor {
    async fn extract(
        &self,
        items: &[String],
        replacements: &ReplacementMap,
        log: &LogSink,
        cancel: CancellationController,
    ) -> Result<Extraction, ExtractError> {
        let total = items.len();
        let mut records = Vec::with_capacity(total);
        let mut long_labels = BTreeSet::new();

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                log.log("cancellation requested; stopping");
                return Err(ExtractError::Cancelled);
            }

            let position = index + 1;
            let url = self.item_url(item)?;
            log.log(format!("[{position}/{total}] fetching {item}"));

            match self.fetch_item(&url).await {
                Ok(document) => {
                    let record = document.into_record(
                        item,
                        &self.base_url,
                        replacements,
                        &mut long_labels,
                    );
                    log.log(format!(
                        "[{position}/{total}] fetched {}",
                        record.title.as_deref().unwrap_or(item)
                    ));
                    records.push(Record::Extracted(record));
                }
                Err(err) => {
                    warn!(item = %item, url = %url, error = %err, "item fetch failed");
                    log.log(format!("[{position}/{total}] failed {item}: {err}"));
                    records.push(Record::Degraded(DegradedRecord::new(
                        item.as_str(),
                        url.as_str(),
                        err.to_string(),
                    )));
                }
            }

            if position < total && !cancel.pause(self.item_delay).await {
                log.log("cancellation requested; stopping");
                return Err(ExtractError::Cancelled);
            }
        }

        if !long_labels.is_empty() {
            debug!(count = long_labels.len(), "long labels found");
            return Ok(Extraction::NeedsResolution { long_labels });
        }

        Ok(Extraction::Success {
            records,
            suggested_filename: default_export_filename(Utc::now()),
        })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(base: &str) -> CatalogExtractor {
        CatalogExtractor::new(CatalogExtractorConfig::new(
            Url::parse(base).unwrap(),
        ))
        .unwrap()
    }

    #[test]
    fn item_urls_are_encoded_path_segments() {
        let extractor = extractor("https://catalog.example/products");
        assert_eq!(
            extractor.item_url("A1").unwrap().as_str(),
            "https://catalog.example/products/A1"
        );
        assert_eq!(
            extractor.item_url("a b/c").unwrap().as_str(),
            "https://catalog.example/products/a%20b%2Fc"
        );
    }

    #[test]
    fn opaque_urls_are_rejected() {
        let config = CatalogExtractorConfig::new(
            Url::parse("mailto:catalog@example.com").unwrap(),
        );
        assert!(matches!(
            CatalogExtractor::new(config),
            Err(ExtractError::InvalidSource(_))
        ));
    }
}
