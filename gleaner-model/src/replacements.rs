//! Canonical short names for over-length attribute labels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Labels whose length reaches this many characters need a replacement
/// before a run can finish.
pub const LABEL_LENGTH_LIMIT: usize = 28;

/// Label length in Unicode scalar values.
pub fn label_len(label: &str) -> usize {
    label.chars().count()
}

/// Validated mapping from an original label to its short replacement.
///
/// Every stored replacement is non-empty and strictly shorter than
/// [`LABEL_LENGTH_LIMIT`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct ReplacementMap {
    entries: BTreeMap<String, String>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map keeping only valid entries, returning the rejected ones
    /// alongside it.
    pub fn from_lenient<I, K, V>(entries: I) -> (Self, Vec<ModelError>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::new();
        let mut rejected = Vec::new();
        for (label, replacement) in entries {
            if let Err(err) = map.insert(label, replacement) {
                rejected.push(err);
            }
        }
        (map, rejected)
    }

    pub fn insert(
        &mut self,
        label: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Result<Option<String>> {
        let label = label.into().trim().to_string();
        let replacement = replacement.into().trim().to_string();

        if label.is_empty() {
            return Err(ModelError::EmptyLabel);
        }
        if replacement.is_empty() {
            return Err(ModelError::EmptyReplacement { label });
        }
        let length = label_len(&replacement);
        if length >= LABEL_LENGTH_LIMIT {
            return Err(ModelError::ReplacementTooLong { label, length });
        }

        Ok(self.entries.insert(label, replacement))
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(String::as_str)
    }

    /// Returns the replacement for `label`, or `label` itself.
    pub fn apply<'a>(&'a self, label: &'a str) -> &'a str {
        self.get(label).unwrap_or(label)
    }

    /// Overlays `other` on top of `self`; entries in `other` win.
    pub fn merge(&mut self, other: &ReplacementMap) {
        for (label, replacement) in &other.entries {
            self.entries.insert(label.clone(), replacement.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(label, replacement)| (label.as_str(), replacement.as_str()))
    }
}

impl TryFrom<BTreeMap<String, String>> for ReplacementMap {
    type Error = ModelError;

    fn try_from(value: BTreeMap<String, String>) -> Result<Self> {
        let mut map = Self::new();
        for (label, replacement) in value {
            map.insert(label, replacement)?;
        }
        Ok(map)
    }
}

impl From<ReplacementMap> for BTreeMap<String, String> {
    fn from(value: ReplacementMap) -> Self {
        value.entries
    }
}
