//! Per-item output produced by an extractor.

use serde::{Deserialize, Serialize};

/// Longest error message carried by a degraded record.
pub const DEGRADED_ERROR_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A successfully extracted item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item: String,
    pub title: Option<String>,
    pub manufacturer: Option<String>,
    pub price: Option<u64>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub certificates: Vec<String>,
}

/// Placeholder for an item whose fetch or parse failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedRecord {
    pub item: String,
    pub url: String,
    pub error: String,
}

impl DegradedRecord {
    /// Builds a degraded record, truncating `error` to
    /// [`DEGRADED_ERROR_LIMIT`] characters.
    pub fn new(
        item: impl Into<String>,
        url: impl Into<String>,
        error: impl AsRef<str>,
    ) -> Self {
        Self {
            item: item.into(),
            url: url.into(),
            error: truncate_chars(error.as_ref(), DEGRADED_ERROR_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Extracted(ItemRecord),
    Degraded(DegradedRecord),
}

impl Record {
    pub fn item(&self) -> &str {
        match self {
            Record::Extracted(record) => &record.item,
            Record::Degraded(record) => &record.item,
        }
    }

    /// Display title, falling back to the item id.
    pub fn title(&self) -> &str {
        match self {
            Record::Extracted(record) => record
                .title
                .as_deref()
                .filter(|title| !title.trim().is_empty())
                .unwrap_or(&record.item),
            Record::Degraded(record) => &record.item,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Record::Degraded(_))
    }
}

/// Cuts `value` to at most `limit` characters on a char boundary.
pub fn truncate_chars(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
