use std::time::Duration;

use thiserror::Error;

use crate::models::{CatalogConfig, Config, CorsConfig};

/// Longest pause accepted between catalog items before a warning is raised.
const SLOW_ITEM_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("catalog base URL {url} must use http or https")]
    UnsupportedCatalogScheme { url: String },
    #[error("catalog base URL {url} cannot carry item paths")]
    OpaqueCatalogUrl { url: String },
    #[error("catalog request timeout must be greater than zero")]
    ZeroRequestTimeout,
    #[error("CORS wildcard origins are not allowed when DEV_MODE is false")]
    DangerousCorsWildcard,
    #[error("invalid CORS origin '{origin}'")]
    InvalidCorsOrigin { origin: String },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    validate_catalog(&config.catalog, &mut warnings)?;

    if !config.dev_mode && config.cors.is_wildcard_included() {
        return Err(ConfigGuardRailError::DangerousCorsWildcard);
    }
    validate_cors(&config.cors)?;

    if !config.dev_mode && config.catalog.is_default_base_url() {
        warnings.push_with_hint(
            "CATALOG_BASE_URL not configured; runs will query the local placeholder catalog",
            "Set CATALOG_BASE_URL or catalog.base_url in gleaner.toml",
        );
    }

    if config.storage.output_dir == config.storage.data_dir {
        warnings.push_with_hint(
            "OUTPUT_DIR equals DATA_DIR; archives share a directory with the history ledger",
            "Point OUTPUT_DIR at a dedicated directory such as <DATA_DIR>/output",
        );
    }

    Ok(warnings)
}

fn validate_catalog(
    catalog: &CatalogConfig,
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    if !matches!(catalog.base_url.scheme(), "http" | "https") {
        return Err(ConfigGuardRailError::UnsupportedCatalogScheme {
            url: catalog.base_url.to_string(),
        });
    }
    if catalog.base_url.cannot_be_a_base() {
        return Err(ConfigGuardRailError::OpaqueCatalogUrl {
            url: catalog.base_url.to_string(),
        });
    }
    if catalog.request_timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroRequestTimeout);
    }

    if catalog.item_delay > SLOW_ITEM_DELAY {
        warnings.push(format!(
            "CATALOG_ITEM_DELAY of {} makes every item wait more than a minute",
            humantime::format_duration(catalog.item_delay)
        ));
    }
    Ok(())
}

fn validate_cors(cors: &CorsConfig) -> Result<(), ConfigGuardRailError> {
    for origin in &cors.allowed_origins {
        let trimmed = origin.trim();
        if trimmed == "*" {
            continue;
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        {
            return Err(ConfigGuardRailError::InvalidCorsOrigin {
                origin: origin.clone(),
            });
        }
    }
    Ok(())
}
