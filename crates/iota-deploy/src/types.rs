use chrono::{DateTime, Utc};
use iota_core::{ArtifactKey, Document};
use serde::{Deserialize, Serialize};

/// Version gate the stored firmware starts from when nothing is deployed.
pub const INITIAL_FIRMWARE_VERSION: &str = "0.0";

/// Version assumed for a device that sends no version header.
pub const UNKNOWN_DEVICE_VERSION: &str = "0";

/// Name of the integer version field embedded in local config documents.
pub const LOCAL_VERSION_FIELD: &str = "config_version";

// ---------------------------------------------------------------------------
// Firmware
// ---------------------------------------------------------------------------

/// Metadata of the live firmware image, stored as `firmware.json`.
///
/// The image itself lives at `blob_ref`, which is derived from `sha256`, so
/// the record can only ever point at the bytes it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareRecord {
    pub version: String,
    pub blob_ref: ArtifactKey,
    pub sha256: String,
    pub size: u64,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareRead {
    /// Stored firmware is newer than the device's.
    Current { record: FirmwareRecord, image: Vec<u8> },
    /// Device already runs this version or a later one.
    NotModified { current: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareWrite {
    Accepted(FirmwareRecord),
    /// Offered version does not compare above the stored one; nothing written.
    Stale { current: String },
}

// ---------------------------------------------------------------------------
// Local config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalConfigRead {
    /// Stored document, byte for byte as persisted.
    Current { version: u64, document: Vec<u8> },
    /// Device already has this version or a later one.
    Stale { version: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalConfigWrite {
    Accepted { version: u64, document: Document },
    /// Declared `config_version` was not above the stored one.
    Stale { current: u64 },
}
