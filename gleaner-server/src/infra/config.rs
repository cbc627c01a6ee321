//! Server configuration, resolved by `gleaner-config`.
pub use gleaner_config::{
    CatalogConfig, Config, ConfigLoad, ConfigLoadError, ConfigLoader,
    ConfigMetadata, ConfigWarnings, CorsConfig, EnvConfig, ServerConfig,
    StorageConfig, loader, models, validation,
};
