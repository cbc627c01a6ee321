pub mod sources;

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use url::Url;

/// Placeholder catalog location used when none is configured.
pub const DEFAULT_CATALOG_BASE_URL: &str = "http://127.0.0.1:8081/products/";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub cors: CorsConfig,
    pub dev_mode: bool,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        self.storage.ensure_directories()
    }

    pub fn output_dir(&self) -> &Path {
        &self.storage.output_dir
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `host:port`, or `None` when the host is not an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().ok()
    }
}

/// On-disk locations. Both JSON files live under `data_dir` unless set
/// explicitly.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub history_path: PathBuf,
    pub replacements_path: PathBuf,
    pub output_dir: PathBuf,
}

impl StorageConfig {
    fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        for file in [&self.history_path, &self.replacements_path] {
            if let Some(parent) = file.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: Url,
    pub item_delay: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub download_attachments: bool,
}

impl CatalogConfig {
    pub fn is_default_base_url(&self) -> bool {
        self.base_url.as_str() == DEFAULT_CATALOG_BASE_URL
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
