use thiserror::Error;

#[derive(Debug, Error)]
pub enum IotaError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for IotaError {
    fn from(e: serde_json::Error) -> Self {
        IotaError::Serialization(e.to_string())
    }
}

pub type IotaResult<T> = Result<T, IotaError>;
