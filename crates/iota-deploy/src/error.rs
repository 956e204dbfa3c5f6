use thiserror::Error;

/// Errors from firmware and local config distribution.
///
/// A stale version is not an error: it comes back as an outcome variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<iota_core::IotaError> for DeployError {
    fn from(e: iota_core::IotaError) -> Self {
        match e {
            iota_core::IotaError::InvalidKey(msg) => DeployError::MalformedInput(msg),
            other => DeployError::Storage(other.to_string()),
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
