//! Configuration loading for Gleaner.
//!
//! Values are resolved from, in order of precedence, environment variables
//! (optionally seeded from a `.env` file), a TOML file and built-in
//! defaults. The resolved [`Config`] passes through guard rails that reject
//! unusable settings and collect non-fatal [`ConfigWarnings`].

#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions,
};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    CatalogConfig, Config, ConfigMetadata, CorsConfig,
    DEFAULT_CATALOG_BASE_URL, ServerConfig, StorageConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
