use crate::error::IotaResult;
use crate::types::{ArtifactKey, Capability, TokenRecord, TokenUpdate};

// ---------------------------------------------------------------------------
// TokenStore: the token table
//
// One row per token name. Rows carry only the secret's hash, never the
// secret itself.
// ---------------------------------------------------------------------------

pub trait TokenStore: Send + Sync {
    /// Insert a new record. Returns false if the name is already taken.
    fn insert(&self, record: &TokenRecord) -> IotaResult<bool>;
    fn get(&self, name: &str) -> IotaResult<Option<TokenRecord>>;
    fn list(&self) -> IotaResult<Vec<TokenRecord>>;
    /// Apply a partial update. Returns false if no record has that name.
    fn update(&self, name: &str, update: &TokenUpdate) -> IotaResult<bool>;
    fn delete(&self, name: &str) -> IotaResult<bool>;

    /// Records holding `capability` literally or holding admin.
    fn granting(&self, capability: Capability) -> IotaResult<Vec<TokenRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.capabilities.grants(capability))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore: opaque blobs addressed by ArtifactKey
//
// `put` replaces the whole value atomically: a reader sees either the old
// bytes or the new bytes, never a mix. There is no locking across calls.
// ---------------------------------------------------------------------------

pub trait ArtifactStore: Send + Sync {
    fn get(&self, key: &ArtifactKey) -> IotaResult<Option<Vec<u8>>>;
    fn put(&self, key: &ArtifactKey, data: &[u8]) -> IotaResult<()>;
    fn delete(&self, key: &ArtifactKey) -> IotaResult<bool>;
    fn exists(&self, key: &ArtifactKey) -> IotaResult<bool>;
}
