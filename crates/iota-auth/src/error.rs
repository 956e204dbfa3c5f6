use thiserror::Error;

/// Errors from token lifecycle operations.
///
/// Display strings never include a token secret or its hash.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token already exists: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no matching token")]
    NotFound,

    #[error("token store failure: {0}")]
    Storage(String),

    #[error("hashing failure: {0}")]
    Hashing(String),

    #[error("invalid hashing parameters: {0}")]
    Config(String),
}

impl From<iota_core::IotaError> for AuthError {
    fn from(e: iota_core::IotaError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
