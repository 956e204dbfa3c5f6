use thiserror::Error;

/// Error type for the iota binary, aggregating errors from every crate.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("core error: {0}")]
    Core(#[from] iota_core::IotaError),

    #[error("auth error: {0}")]
    Auth(#[from] iota_auth::AuthError),

    #[error("deploy error: {0}")]
    Deploy(#[from] iota_deploy::DeployError),

    #[error("vault error: {0}")]
    Vault(#[from] iota_vault::VaultError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;
