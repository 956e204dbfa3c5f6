//! Per-device configuration, one JSON document per chip id.

use iota_core::version::compare;
use iota_core::{embedded_version, parse_document, stored_version, ArtifactKey, ArtifactStore};
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::{DeployError, DeployResult};
use crate::types::{LocalConfigRead, LocalConfigWrite, LOCAL_VERSION_FIELD, UNKNOWN_DEVICE_VERSION};

fn chip_key(chip_id: Option<&str>) -> DeployResult<(String, ArtifactKey)> {
    let chip_id = chip_id
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DeployError::NotFound("no chip id given".into()))?;
    let key = ArtifactKey::local_config(chip_id)?;
    Ok((chip_id.to_string(), key))
}

fn version_of(bytes: &[u8]) -> u64 {
    parse_document(bytes)
        .map(|doc| stored_version(&doc, LOCAL_VERSION_FIELD))
        .unwrap_or(0)
}

/// Serve the stored config for `chip_id` if it is newer than the device's.
pub fn fetch_local_config(
    store: &dyn ArtifactStore,
    chip_id: Option<&str>,
    caller_version: Option<&str>,
) -> DeployResult<LocalConfigRead> {
    let (chip_id, key) = chip_key(chip_id)?;
    let document = store
        .get(&key)?
        .ok_or_else(|| DeployError::NotFound(format!("no config for chip {}", chip_id)))?;

    let version = version_of(&document);
    let caller = caller_version.unwrap_or(UNKNOWN_DEVICE_VERSION);

    if compare(caller, &version.to_string()) != Ordering::Less {
        tracing::debug!(chip_id = %chip_id, caller, version, "no new local config");
        return Ok(LocalConfigRead::Stale { version });
    }

    Ok(LocalConfigRead::Current { version, document })
}

/// Store `payload` as the config for `chip_id` under the next version.
///
/// A payload that declares `config_version` at or below the stored version
/// is stale; a higher one is stored as is. Without a declared version the
/// server assigns `current + 1`.
pub fn deploy_local_config(
    store: &dyn ArtifactStore,
    chip_id: Option<&str>,
    payload: Value,
) -> DeployResult<LocalConfigWrite> {
    let (chip_id, key) = chip_key(chip_id)?;
    let mut doc = match payload {
        Value::Object(map) => map,
        _ => {
            return Err(DeployError::MalformedInput(
                "local config must be a JSON object".into(),
            ))
        }
    };
    let declared = embedded_version(&doc, LOCAL_VERSION_FIELD)
        .map_err(|e| DeployError::MalformedInput(e.to_string()))?;

    let current = store.get(&key)?.map(|b| version_of(&b)).unwrap_or(0);

    if let Some(declared) = declared {
        if declared <= current {
            tracing::warn!(chip_id = %chip_id, declared, current, "stale local config rejected");
            return Ok(LocalConfigWrite::Stale { current });
        }
    }

    let version = declared.unwrap_or(current + 1);
    doc.insert(LOCAL_VERSION_FIELD.to_string(), Value::from(version));
    let bytes = serde_json::to_vec_pretty(&doc)
        .map_err(|e| DeployError::Storage(format!("serialization failed: {}", e)))?;
    store.put(&key, &bytes)?;

    tracing::info!(chip_id = %chip_id, version, "local config deployed");
    Ok(LocalConfigWrite::Accepted {
        version,
        document: doc,
    })
}
