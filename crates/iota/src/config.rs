use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RootError, RootResult};

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body, in bytes. Firmware uploads are the
    /// only requests that come close.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Argon2id cost parameters for token hashes.
///
/// Stored hashes carry their own parameters, so changing these only
/// affects tokens issued or rotated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashingConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    #[serde(default = "default_iterations")]
    pub iterations: u32,

    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    argon2::Params::DEFAULT_M_COST
}

fn default_iterations() -> u32 {
    argon2::Params::DEFAULT_T_COST
}

fn default_parallelism() -> u32 {
    argon2::Params::DEFAULT_P_COST
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

/// Top-level configuration for the iota server.
///
/// Loaded from a TOML file (by default `<instance>/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootConfig {
    /// Instance directory holding the token database and all artifacts.
    #[serde(default = "default_instance_path")]
    pub instance_path: PathBuf,

    /// Token database. Defaults to `<instance_path>/iota.sqlite`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hashing: HashingConfig,
}

/// `$IOTA_INSTANCE_PATH` if set, otherwise `./instance`.
pub fn default_instance_path() -> PathBuf {
    match std::env::var_os("IOTA_INSTANCE_PATH") {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => std::env::current_dir()
            .map(|d| d.join("instance"))
            .unwrap_or_else(|_| PathBuf::from("instance")),
    }
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            instance_path: default_instance_path(),
            database: None,
            server: ServerConfig::default(),
            hashing: HashingConfig::default(),
        }
    }
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> RootResult<()> {
        if self.instance_path.as_os_str().is_empty() {
            return Err(RootError::Config("instance_path must not be empty".into()));
        }
        if self.server.bind.trim().is_empty() {
            return Err(RootError::Config("server.bind must not be empty".into()));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(RootError::Config(
                "server.max_upload_bytes must be > 0".into(),
            ));
        }
        iota_auth::TokenHasher::with_params(
            self.hashing.memory_kib,
            self.hashing.iterations,
            self.hashing.parallelism,
        )
        .map_err(|e| RootError::Config(format!("invalid [hashing] parameters: {}", e)))?;
        Ok(())
    }

    /// Token database location.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.instance_path.join("iota.sqlite"))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        default_instance_path().join("config.toml")
    }
}
