use iota_core::{
    ArtifactKey, ArtifactStore, IotaError, IotaResult, TokenRecord, TokenStore, TokenUpdate,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

// In-memory stores for tests and for embedding without persistence.

fn lock<T>(mutex: &Mutex<T>) -> IotaResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| IotaError::Storage(format!("lock poisoned: {}", e)))
}

/// Token table held in a `BTreeMap` so listing is ordered by name.
pub struct InMemoryTokenStore {
    records: Mutex<BTreeMap<String, TokenRecord>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn count(&self) -> usize {
        lock(&self.records).map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn insert(&self, record: &TokenRecord) -> IotaResult<bool> {
        let mut records = lock(&self.records)?;
        if records.contains_key(&record.name) {
            return Ok(false);
        }
        records.insert(record.name.clone(), record.clone());
        Ok(true)
    }

    fn get(&self, name: &str) -> IotaResult<Option<TokenRecord>> {
        Ok(lock(&self.records)?.get(name).cloned())
    }

    fn list(&self) -> IotaResult<Vec<TokenRecord>> {
        Ok(lock(&self.records)?.values().cloned().collect())
    }

    fn update(&self, name: &str, update: &TokenUpdate) -> IotaResult<bool> {
        let mut records = lock(&self.records)?;
        let Some(record) = records.get_mut(name) else {
            return Ok(false);
        };
        if let Some(hash) = &update.secret_hash {
            record.secret_hash = hash.clone();
        }
        if let Some(caps) = update.capabilities {
            record.capabilities = caps;
        }
        Ok(true)
    }

    fn delete(&self, name: &str) -> IotaResult<bool> {
        Ok(lock(&self.records)?.remove(name).is_some())
    }
}

/// Artifact blobs keyed by their `ArtifactKey` string.
pub struct InMemoryArtifactStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// All stored keys (for testing/inspection).
    pub fn keys(&self) -> Vec<String> {
        lock(&self.data)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// All stored entries as (key, bytes) pairs (for testing/inspection).
    pub fn entries(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.data)
            .map(|d| d.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn get(&self, key: &ArtifactKey) -> IotaResult<Option<Vec<u8>>> {
        Ok(lock(&self.data)?.get(key.as_str()).cloned())
    }

    fn put(&self, key: &ArtifactKey, data: &[u8]) -> IotaResult<()> {
        lock(&self.data)?.insert(key.as_str().to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &ArtifactKey) -> IotaResult<bool> {
        Ok(lock(&self.data)?.remove(key.as_str()).is_some())
    }

    fn exists(&self, key: &ArtifactKey) -> IotaResult<bool> {
        Ok(lock(&self.data)?.contains_key(key.as_str()))
    }
}
