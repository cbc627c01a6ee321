use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use gleaner_model::ReplacementMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::persist::{self, StoreError};

const REPLACEMENTS_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredReplacements {
    Versioned {
        replacements: BTreeMap<String, String>,
    },
    Legacy(BTreeMap<String, String>),
}

#[derive(Debug, Serialize)]
struct ReplacementFile<'a> {
    version: u32,
    replacements: &'a ReplacementMap,
}

/// Persisted [`ReplacementMap`] shared by every run.
///
/// Loads lazily and tolerates a missing or corrupt file. Invalid stored
/// entries are dropped with a warning. Writes are best-effort.
#[derive(Debug)]
pub struct ReplacementStore {
    path: PathBuf,
    cache: Mutex<Option<ReplacementMap>>,
}

impl ReplacementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> ReplacementMap {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(load_map(&self.path).await);
        }
        cache.clone().unwrap_or_default()
    }

    /// Overlays `incoming` on the stored map and persists the result.
    pub async fn merge(&self, incoming: &ReplacementMap) -> ReplacementMap {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(load_map(&self.path).await);
        }
        let map = cache.get_or_insert_with(ReplacementMap::new);
        map.merge(incoming);

        if let Err(err) = self.persist(map).await {
            warn!(error = %err, "failed to persist replacement map");
        }
        map.clone()
    }

    /// Replaces the stored map wholesale.
    pub async fn replace(&self, map: ReplacementMap) -> ReplacementMap {
        let mut cache = self.cache.lock().await;
        if let Err(err) = self.persist(&map).await {
            warn!(error = %err, "failed to persist replacement map");
        }
        *cache = Some(map.clone());
        map
    }

    async fn persist(&self, map: &ReplacementMap) -> Result<(), StoreError> {
        persist::write_json_atomic(
            &self.path,
            &ReplacementFile {
                version: REPLACEMENTS_VERSION,
                replacements: map,
            },
        )
        .await
    }
}

async fn load_map(path: &Path) -> ReplacementMap {
    let bytes = match persist::read_optional(path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return ReplacementMap::new(),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "replacement map unreadable; starting empty"
            );
            return ReplacementMap::new();
        }
    };

    let raw = match serde_json::from_slice::<StoredReplacements>(&bytes) {
        Ok(StoredReplacements::Versioned { replacements }) => replacements,
        Ok(StoredReplacements::Legacy(replacements)) => replacements,
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "replacement map corrupt; starting empty"
            );
            return ReplacementMap::new();
        }
    };

    let (map, rejected) = ReplacementMap::from_lenient(raw);
    for err in &rejected {
        warn!(path = %path.display(), error = %err, "dropping stored replacement");
    }
    info!(path = %path.display(), entries = map.len(), "replacement map loaded");
    map
}
