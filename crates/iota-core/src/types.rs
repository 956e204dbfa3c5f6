use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IotaError, IotaResult};

// ---------------------------------------------------------------------------
// Capability: what a bearer token may do
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Token management reads.
    Read,
    /// Artifact deployment (firmware, local config, global config).
    Write,
    /// Token management; satisfies every other capability.
    Admin,
}

impl Capability {
    pub fn letter(self) -> char {
        match self {
            Capability::Read => 'r',
            Capability::Write => 'w',
            Capability::Admin => 'a',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'r' => Some(Capability::Read),
            'w' => Some(Capability::Write),
            'a' => Some(Capability::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Read => write!(f, "read"),
            Capability::Write => write!(f, "write"),
            Capability::Admin => write!(f, "admin"),
        }
    }
}

// ---------------------------------------------------------------------------
// CapabilitySet: sanitized subset of {a, r, w}
// ---------------------------------------------------------------------------

/// Set of capabilities held by a token.
///
/// Persisted and transmitted as a permission string over the alphabet
/// `{a, r, w}`. Parsing never fails: characters outside the alphabet are
/// dropped, so `"rwx"` becomes `"rw"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CapabilitySet {
    admin: bool,
    read: bool,
    write: bool,
}

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self {
            admin: false,
            read: false,
            write: false,
        }
    }

    pub const fn all() -> Self {
        Self {
            admin: true,
            read: true,
            write: true,
        }
    }

    /// Strip everything outside `{a, r, w}` and collect the rest.
    pub fn sanitize(raw: &str) -> Self {
        raw.chars()
            .filter_map(Capability::from_letter)
            .fold(Self::empty(), |set, cap| set.with(cap))
    }

    pub fn with(mut self, cap: Capability) -> Self {
        match cap {
            Capability::Admin => self.admin = true,
            Capability::Read => self.read = true,
            Capability::Write => self.write = true,
        }
        self
    }

    /// Literal membership, without admin subsumption.
    pub fn contains(&self, cap: Capability) -> bool {
        match cap {
            Capability::Admin => self.admin,
            Capability::Read => self.read,
            Capability::Write => self.write,
        }
    }

    /// Whether a holder of this set satisfies `required`.
    pub fn grants(&self, required: Capability) -> bool {
        self.admin || self.contains(required)
    }

    pub fn is_empty(&self) -> bool {
        !(self.admin || self.read || self.write)
    }

    /// Canonical permission string, letters in `a`, `r`, `w` order.
    pub fn as_permission_string(&self) -> String {
        [Capability::Admin, Capability::Read, Capability::Write]
            .into_iter()
            .filter(|c| self.contains(*c))
            .map(Capability::letter)
            .collect()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_permission_string())
    }
}

impl From<String> for CapabilitySet {
    fn from(raw: String) -> Self {
        Self::sanitize(&raw)
    }
}

impl From<CapabilitySet> for String {
    fn from(set: CapabilitySet) -> Self {
        set.as_permission_string()
    }
}

// ---------------------------------------------------------------------------
// Token records
// ---------------------------------------------------------------------------

/// A persisted token. The plaintext secret is never part of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub name: String,
    /// Argon2 PHC string.
    pub secret_hash: String,
    pub capabilities: CapabilitySet,
}

/// Partial update applied to an existing token record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub secret_hash: Option<String>,
    pub capabilities: Option<CapabilitySet>,
}

impl TokenUpdate {
    pub fn is_empty(&self) -> bool {
        self.secret_hash.is_none() && self.capabilities.is_none()
    }
}

/// Public view of a token: name and permissions only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub name: String,
    pub permissions: String,
}

impl From<&TokenRecord> for TokenSummary {
    fn from(record: &TokenRecord) -> Self {
        Self {
            name: record.name.clone(),
            permissions: record.capabilities.as_permission_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactKey: relative, validated storage key for an artifact
// ---------------------------------------------------------------------------

const MAX_SEGMENT_LEN: usize = 128;
const MAX_CHIP_ID_LEN: usize = 64;

/// Storage key of a persisted artifact.
///
/// Keys are `/`-separated relative paths whose segments use only
/// `[A-Za-z0-9_.:-]` and are never `.` or `..`, so a key can be joined onto
/// an instance directory without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub const FIRMWARE_MANIFEST: &'static str = "firmware.json";
    pub const GLOBAL_CONFIG: &'static str = "global_config.enc";

    pub fn parse(raw: &str) -> IotaResult<Self> {
        if raw.is_empty() {
            return Err(IotaError::InvalidKey("empty key".into()));
        }
        for segment in raw.split('/') {
            validate_segment(segment, MAX_SEGMENT_LEN)?;
        }
        Ok(Self(raw.to_string()))
    }

    pub fn firmware_manifest() -> Self {
        Self(Self::FIRMWARE_MANIFEST.to_string())
    }

    /// Content-addressed firmware image key.
    pub fn firmware_blob(sha256_hex: &str) -> IotaResult<Self> {
        if sha256_hex.len() != 64 || !sha256_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IotaError::InvalidKey(format!(
                "not a sha256 digest: {}",
                sha256_hex
            )));
        }
        Ok(Self(format!("firmware/{}.bin", sha256_hex)))
    }

    pub fn local_config(chip_id: &str) -> IotaResult<Self> {
        validate_segment(chip_id, MAX_CHIP_ID_LEN)?;
        Ok(Self(format!("local_config/{}.json", chip_id)))
    }

    pub fn global_config() -> Self {
        Self(Self::GLOBAL_CONFIG.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

fn validate_segment(segment: &str, max_len: usize) -> IotaResult<()> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(IotaError::InvalidKey(format!("bad segment: {:?}", segment)));
    }
    if segment.len() > max_len {
        return Err(IotaError::InvalidKey(format!(
            "segment longer than {} bytes",
            max_len
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-');
    if !segment.chars().all(allowed) {
        return Err(IotaError::InvalidKey(format!(
            "illegal character in {:?}",
            segment
        )));
    }
    Ok(())
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ArtifactKey {
    type Error = IotaError;

    fn try_from(raw: String) -> IotaResult<Self> {
        Self::parse(&raw)
    }
}

impl From<ArtifactKey> for String {
    fn from(key: ArtifactKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_foreign_letters() {
        let set = CapabilitySet::sanitize("rwx; DROP TABLE");
        assert_eq!(set.as_permission_string(), "rw");
        assert!(!set.contains(Capability::Admin));
    }

    #[test]
    fn test_sanitize_canonical_order() {
        assert_eq!(CapabilitySet::sanitize("wra").to_string(), "arw");
        assert_eq!(CapabilitySet::sanitize("wwrr").to_string(), "rw");
        assert!(CapabilitySet::sanitize("xyz").is_empty());
    }

    #[test]
    fn test_admin_grants_everything() {
        let admin = CapabilitySet::sanitize("a");
        assert!(admin.grants(Capability::Read));
        assert!(admin.grants(Capability::Write));
        assert!(admin.grants(Capability::Admin));
        assert!(!admin.contains(Capability::Write));
    }

    #[test]
    fn test_read_only_grants_read() {
        let reader = CapabilitySet::sanitize("r");
        assert!(reader.grants(Capability::Read));
        assert!(!reader.grants(Capability::Write));
        assert!(!reader.grants(Capability::Admin));
    }

    #[test]
    fn test_capability_set_serde_as_string() {
        let set = CapabilitySet::all();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "\"arw\"");
        let back: CapabilitySet = serde_json::from_str("\"r?w\"").unwrap();
        assert_eq!(back.to_string(), "rw");
    }

    #[test]
    fn test_token_summary_hides_hash() {
        let record = TokenRecord {
            name: "writer".into(),
            secret_hash: "$argon2id$v=19$...".into(),
            capabilities: CapabilitySet::sanitize("w"),
        };
        let summary = TokenSummary::from(&record);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("argon2"));
        assert_eq!(summary.permissions, "w");
    }

    #[test]
    fn test_local_config_key() {
        let key = ArtifactKey::local_config("0x00000001").unwrap();
        assert_eq!(key.as_str(), "local_config/0x00000001.json");
    }

    #[test]
    fn test_local_config_key_rejects_traversal() {
        assert!(ArtifactKey::local_config("..").is_err());
        assert!(ArtifactKey::local_config("../etc").is_err());
        assert!(ArtifactKey::local_config("a/b").is_err());
        assert!(ArtifactKey::local_config("").is_err());
        assert!(ArtifactKey::local_config(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_firmware_blob_key_requires_digest() {
        assert!(ArtifactKey::firmware_blob("abc").is_err());
        let digest = "a".repeat(64);
        let key = ArtifactKey::firmware_blob(&digest).unwrap();
        assert_eq!(key.segments().count(), 2);
    }

    #[test]
    fn test_parse_rejects_absolute_and_dot_segments() {
        assert!(ArtifactKey::parse("/etc/passwd").is_err());
        assert!(ArtifactKey::parse("firmware/../x").is_err());
        assert!(ArtifactKey::parse("firmware//x").is_err());
        assert!(ArtifactKey::parse("firmware.json").is_ok());
    }

    #[test]
    fn test_artifact_key_serde_validates() {
        let ok: ArtifactKey = serde_json::from_str("\"firmware.json\"").unwrap();
        assert_eq!(ok, ArtifactKey::firmware_manifest());
        assert!(serde_json::from_str::<ArtifactKey>("\"../secret\"").is_err());
    }
}
