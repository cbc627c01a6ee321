use std::{fs, time::Duration};

use gleaner_config::{
    ConfigGuardRailError, ConfigLoadError, ConfigLoader, EnvConfig,
};
use tempfile::TempDir;

fn env_in(dir: &TempDir) -> EnvConfig {
    EnvConfig {
        data_dir: Some(dir.path().join("data")),
        ..Default::default()
    }
}

#[test]
fn defaults_apply_without_a_config_file() {
    let dir = TempDir::new().unwrap();
    let load = ConfigLoader::new()
        .load_with_env(env_in(&dir), false)
        .unwrap();
    let config = load.config;

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 3000);
    assert_eq!(
        config.storage.history_path,
        dir.path().join("data/history.json")
    );
    assert_eq!(config.storage.output_dir, dir.path().join("data/output"));
    assert!(config.storage.output_dir.is_dir());
    assert_eq!(config.catalog.item_delay, Duration::from_secs(2));
    assert_eq!(config.catalog.request_timeout, Duration::from_secs(30));
    assert!(config.catalog.is_default_base_url());
    assert!(!config.dev_mode);

    let messages: Vec<_> = load
        .warnings
        .items
        .iter()
        .map(|warning| warning.message.as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("No gleaner.toml")));
    assert!(messages.iter().any(|m| m.contains("CATALOG_BASE_URL")));
}

#[test]
fn environment_overrides_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gleaner.toml");
    fs::write(
        &path,
        r#"
dev_mode = true

[server]
host = "127.0.0.1"
port = 8080

[catalog]
base_url = "https://catalog.example/api/products"
item_delay = "500ms"
request_timeout = "10s"
"#,
    )
    .unwrap();

    let env = EnvConfig {
        server_port: Some(9000),
        catalog_item_delay: Some("1s".into()),
        ..env_in(&dir)
    };
    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env, true)
        .unwrap();
    let config = &load.config;

    assert_eq!(load.config_path(), Some(path.as_path()));
    assert!(config.metadata.env_file_loaded);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9000);
    assert_eq!(
        config.catalog.base_url.as_str(),
        "https://catalog.example/api/products"
    );
    assert_eq!(config.catalog.item_delay, Duration::from_secs(1));
    assert_eq!(config.catalog.request_timeout, Duration::from_secs(10));
    assert!(config.dev_mode);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("absent.toml"))
        .load_with_env(env_in(&dir), false)
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_toml_is_reported_with_its_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gleaner.toml");
    fs::write(&path, "[server\nport = 1").unwrap();

    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env_in(&dir), false)
        .unwrap_err();
    match err {
        ConfigLoadError::Parse { path: reported, .. } => {
            assert_eq!(reported, path)
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unusable_catalog_settings_are_rejected() {
    let dir = TempDir::new().unwrap();

    let err = ConfigLoader::new()
        .load_with_env(
            EnvConfig {
                catalog_base_url: Some("ftp://catalog.example/".into()),
                ..env_in(&dir)
            },
            false,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(
            ConfigGuardRailError::UnsupportedCatalogScheme { .. }
        )
    ));

    let err = ConfigLoader::new()
        .load_with_env(
            EnvConfig {
                catalog_request_timeout: Some("0s".into()),
                ..env_in(&dir)
            },
            false,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroRequestTimeout)
    ));

    let err = ConfigLoader::new()
        .load_with_env(
            EnvConfig {
                catalog_item_delay: Some("soon".into()),
                ..env_in(&dir)
            },
            false,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::InvalidDuration {
            field: "CATALOG_ITEM_DELAY",
            ..
        }
    ));
}

#[test]
fn wildcard_cors_requires_dev_mode() {
    let dir = TempDir::new().unwrap();
    let wildcard = Some(vec!["*".to_string()]);

    let err = ConfigLoader::new()
        .load_with_env(
            EnvConfig {
                cors_allowed_origins: wildcard.clone(),
                ..env_in(&dir)
            },
            false,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::DangerousCorsWildcard)
    ));

    let load = ConfigLoader::new()
        .load_with_env(
            EnvConfig {
                cors_allowed_origins: wildcard,
                dev_mode: Some(true),
                ..env_in(&dir)
            },
            false,
        )
        .unwrap();
    assert!(load.config.cors.is_wildcard_included());
}
