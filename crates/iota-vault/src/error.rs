use thiserror::Error;

/// Vault and storage errors.
///
/// Crypto failures carry no detail: a wrong key, a flipped bit and a
/// truncated blob all read as the same `Decryption` error.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("no global config stored")]
    Unavailable,

    #[error("decryption failed")]
    Decryption,

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("stored document is malformed")]
    MalformedDocument,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<iota_core::IotaError> for VaultError {
    fn from(e: iota_core::IotaError) -> Self {
        VaultError::Storage(e.to_string())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
