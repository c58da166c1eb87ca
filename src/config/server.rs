use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_maintenance_hour() -> u32 {
    3
}

fn default_maintenance_window_minutes() -> u32 {
    10
}

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Local {
        path: PathBuf,
    },
    S3 {
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        #[serde(default)]
        base_prefix: Option<String>,
        #[serde(default)]
        use_tls: bool,
    },
}

/// Configuration for the server, loadable from TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Expose unauthenticated read-only project/app/version listings.
    #[serde(default)]
    pub public_listing: bool,
    /// Enforce token scope and permission classes on every operation.
    /// Off by default: scope fields are annotations only.
    #[serde(default)]
    pub strict_token_scope: bool,
    /// Local hour during which maintenance tasks may run.
    #[serde(default = "default_maintenance_hour")]
    pub maintenance_hour: u32,
    /// Width of the maintenance window in minutes.
    #[serde(default = "default_maintenance_window_minutes")]
    pub maintenance_window_minutes: u32,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

/// CLI overrides that can be applied on top of a config file.
#[derive(Debug, Default)]
pub struct ServerConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Default config file search paths.
    const SEARCH_PATHS: &'static [&'static str] =
        &["./stevedore.toml", "/etc/stevedore/server.toml"];

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("stevedore.db")
    }

    /// The effective storage backend; defaults to a local store under the
    /// data directory.
    #[must_use]
    pub fn storage_config(&self) -> StorageConfig {
        self.storage.clone().unwrap_or(StorageConfig::Local {
            path: self.data_dir.join("artifacts"),
        })
    }

    /// Load config from a specific file path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search for config file in default locations and load if found.
    pub fn load_from_search_paths() -> Option<Self> {
        for path_str in Self::SEARCH_PATHS {
            let path = Path::new(path_str);
            if path.exists() {
                if let Ok(config) = Self::load(path) {
                    return Some(config);
                }
            }
        }
        None
    }

    /// Load config with CLI overrides.
    ///
    /// Priority: CLI args > config file > defaults
    pub fn load_with_overrides(
        config_path: Option<&Path>,
        overrides: ServerConfigOverrides,
    ) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::load(path)?
        } else {
            Self::load_from_search_paths().unwrap_or_default()
        };

        if let Some(host) = overrides.host {
            config.host = host;
        }
        if let Some(port) = overrides.port {
            config.port = port;
        }
        if let Some(data_dir) = overrides.data_dir {
            config.data_dir = data_dir;
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            public_listing: false,
            strict_token_scope: false,
            maintenance_hour: default_maintenance_hour(),
            maintenance_window_minutes: default_maintenance_window_minutes(),
            storage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert!(!config.public_listing);
        assert!(matches!(
            config.storage_config(),
            StorageConfig::Local { .. }
        ));
    }

    #[test]
    fn test_parse_s3_storage() {
        let toml = r#"
            host = "0.0.0.0"
            port = 9000

            [storage]
            type = "s3"
            endpoint = "minio.local:9000"
            access_key = "key"
            secret_key = "secret"
            bucket = "artifacts"
            base_prefix = "stevedore"
            use_tls = true
        "#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        match config.storage_config() {
            StorageConfig::S3 {
                endpoint,
                bucket,
                base_prefix,
                use_tls,
                ..
            } => {
                assert_eq!(endpoint, "minio.local:9000");
                assert_eq!(bucket, "artifacts");
                assert_eq!(base_prefix.as_deref(), Some("stevedore"));
                assert!(use_tls);
            }
            StorageConfig::Local { .. } => panic!("expected s3 config"),
        }
    }
}
