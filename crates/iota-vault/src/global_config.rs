//! The encrypted global config shared by every device.
//!
//! One JSON object, stored as `global_config.enc` under the envelope layout.
//! The server never holds the key: it arrives with each request, is used to
//! open or seal the blob, and is dropped (zeroized) with the request.

use iota_core::version::compare;
use iota_core::{parse_document, stored_version, ArtifactKey, ArtifactStore, Document};
use serde_json::Value;
use std::cmp::Ordering;
use zeroize::Zeroizing;

use crate::envelope::{self, ConfigKey};
use crate::error::{VaultError, VaultResult};

/// Name of the integer version field embedded in the document.
pub const VERSION_FIELD: &str = "global_config_version";

#[derive(Debug)]
pub enum GlobalConfigRead {
    /// The stored document is newer than the caller's; plaintext verbatim.
    Current {
        version: u64,
        plaintext: Zeroizing<Vec<u8>>,
    },
    /// The caller already has this version or a later one.
    Stale { version: u64 },
}

#[derive(Debug)]
pub enum GlobalConfigWrite {
    Accepted { version: u64, document: Document },
    /// Declared version was not above the stored one; nothing written.
    Stale { current: u64 },
}

/// Decrypt the stored global config for a device at `caller_version`.
pub fn read_global_config(
    store: &dyn ArtifactStore,
    caller_version: &str,
    key: &ConfigKey,
) -> VaultResult<GlobalConfigRead> {
    let blob = store
        .get(&ArtifactKey::global_config())?
        .ok_or(VaultError::Unavailable)?;

    let plaintext = envelope::open(key, &blob)?;
    let doc = parse_document(&plaintext).map_err(|_| VaultError::MalformedDocument)?;
    let version = stored_version(&doc, VERSION_FIELD);

    if compare(caller_version, &version.to_string()) != Ordering::Less {
        tracing::debug!(caller_version, version, "global config not newer than caller");
        return Ok(GlobalConfigRead::Stale { version });
    }

    Ok(GlobalConfigRead::Current { version, plaintext })
}

/// Replace the global config with `new_document`, encrypted under `key`.
///
/// A caller-declared `global_config_version` at or below the stored one is
/// stale; a higher one is stored as is. Without a declared version the
/// server assigns the next one.
pub fn write_global_config(
    store: &dyn ArtifactStore,
    key: &ConfigKey,
    new_document: Value,
) -> VaultResult<GlobalConfigWrite> {
    let mut doc = match new_document {
        Value::Object(map) => map,
        _ => {
            return Err(VaultError::MalformedInput(
                "global config must be a JSON object".into(),
            ))
        }
    };
    let declared = iota_core::embedded_version(&doc, VERSION_FIELD)
        .map_err(|e| VaultError::MalformedInput(e.to_string()))?;

    let current = current_version(store, key)?;

    if let Some(declared) = declared {
        if declared <= current {
            tracing::warn!(declared, current, "stale global config write rejected");
            return Ok(GlobalConfigWrite::Stale { current });
        }
    }

    let version = declared.unwrap_or(current + 1);
    doc.insert(VERSION_FIELD.to_string(), Value::from(version));

    let plaintext = Zeroizing::new(
        serde_json::to_vec_pretty(&doc).map_err(|e| VaultError::Serialization(e.to_string()))?,
    );
    let blob = envelope::seal(key, &plaintext)?;
    store.put(&ArtifactKey::global_config(), &blob)?;

    tracing::info!(version, "global config deployed");
    Ok(GlobalConfigWrite::Accepted {
        version,
        document: doc,
    })
}

/// Version of the stored document. Absent blob or a document that decrypts
/// but does not parse both count as 0; a blob the key cannot open is an
/// error so a wrong key never overwrites the real config.
fn current_version(store: &dyn ArtifactStore, key: &ConfigKey) -> VaultResult<u64> {
    let Some(blob) = store.get(&ArtifactKey::global_config())? else {
        return Ok(0);
    };
    let plaintext = envelope::open(key, &blob)?;
    Ok(parse_document(&plaintext)
        .map(|doc| stored_version(&doc, VERSION_FIELD))
        .unwrap_or(0))
}
