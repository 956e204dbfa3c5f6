//! Firmware distribution.
//!
//! Images are stored content-addressed under `firmware/<sha256>.bin` and the
//! live version is whatever `firmware.json` points at. A deploy writes the
//! image first and the manifest second, so an interrupted deploy leaves at
//! most an unreferenced image behind.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use iota_core::version::compare;
use iota_core::{ArtifactKey, ArtifactStore};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

use crate::error::{DeployError, DeployResult};
use crate::types::{
    FirmwareRead, FirmwareRecord, FirmwareWrite, INITIAL_FIRMWARE_VERSION, UNKNOWN_DEVICE_VERSION,
};

/// Load the live firmware manifest. Missing and unreadable manifests both
/// come back as `None`.
pub fn current_firmware(store: &dyn ArtifactStore) -> DeployResult<Option<FirmwareRecord>> {
    let Some(bytes) = store.get(&ArtifactKey::firmware_manifest())? else {
        return Ok(None);
    };
    match serde_json::from_slice::<FirmwareRecord>(&bytes) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            tracing::warn!(error = %e, "firmware manifest is corrupt, ignoring it");
            Ok(None)
        }
    }
}

/// Serve the firmware image to a device running `caller_version`.
pub fn fetch_firmware(
    store: &dyn ArtifactStore,
    caller_version: Option<&str>,
) -> DeployResult<FirmwareRead> {
    let caller = caller_version.unwrap_or(UNKNOWN_DEVICE_VERSION);
    let record = current_firmware(store)?
        .ok_or_else(|| DeployError::NotFound("no firmware deployed".into()))?;

    if compare(&record.version, caller) != Ordering::Greater {
        tracing::debug!(caller, current = %record.version, "firmware not modified");
        return Ok(FirmwareRead::NotModified {
            current: record.version,
        });
    }

    let image = store.get(&record.blob_ref)?.ok_or_else(|| {
        tracing::error!(blob = %record.blob_ref, "firmware manifest points at a missing image");
        DeployError::NotFound("firmware image missing".into())
    })?;

    Ok(FirmwareRead::Current { record, image })
}

/// Accept a base64-encoded firmware image as `version`.
pub fn deploy_firmware(
    store: &dyn ArtifactStore,
    version: Option<&str>,
    base64_body: &[u8],
) -> DeployResult<FirmwareWrite> {
    let version = version
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DeployError::MalformedInput("firmware version header missing".into()))?;

    let image = decode_body(base64_body)?;

    let previous = current_firmware(store)?;
    let current_version = previous
        .as_ref()
        .map(|r| r.version.as_str())
        .unwrap_or(INITIAL_FIRMWARE_VERSION);

    if compare(current_version, version) != Ordering::Less {
        tracing::warn!(offered = version, current = current_version, "stale firmware rejected");
        return Ok(FirmwareWrite::Stale {
            current: current_version.to_string(),
        });
    }

    let sha256 = hex::encode(Sha256::digest(&image));
    let blob_ref = ArtifactKey::firmware_blob(&sha256)?;
    store.put(&blob_ref, &image)?;

    let record = FirmwareRecord {
        version: version.to_string(),
        blob_ref,
        sha256,
        size: image.len() as u64,
        deployed_at: Utc::now(),
    };
    let manifest = serde_json::to_vec_pretty(&record)
        .map_err(|e| DeployError::Storage(format!("manifest serialization failed: {}", e)))?;
    store.put(&ArtifactKey::firmware_manifest(), &manifest)?;

    if let Some(prev) = previous {
        if prev.blob_ref != record.blob_ref {
            retire_image(store, &prev.blob_ref);
        }
    }

    tracing::info!(version = %record.version, size = record.size, sha256 = %record.sha256, "firmware deployed");
    Ok(FirmwareWrite::Accepted(record))
}

/// Best-effort removal of a superseded image. Skipped when the live manifest
/// points at it again, which happens when a concurrent deploy of the same
/// bytes lands after ours.
fn retire_image(store: &dyn ArtifactStore, blob: &ArtifactKey) {
    match current_firmware(store) {
        Ok(Some(live)) if live.blob_ref == *blob => {
            tracing::debug!(blob = %blob, "old firmware image is live again, keeping it");
            return;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(blob = %blob, error = %e, "could not re-read firmware manifest, keeping old image");
            return;
        }
    }
    if let Err(e) = store.delete(blob) {
        tracing::warn!(blob = %blob, error = %e, "could not remove old firmware image");
    }
}

/// Decode a base64 upload, ignoring ASCII whitespace (line-wrapped encoders).
fn decode_body(body: &[u8]) -> DeployResult<Vec<u8>> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(DeployError::MalformedInput("empty firmware body".into()));
    }
    BASE64
        .decode(&compact)
        .map_err(|e| DeployError::MalformedInput(format!("firmware body is not base64: {}", e)))
}
