//! # iota-vault
//!
//! The encrypted global config and the storage backends behind the
//! `TokenStore` and `ArtifactStore` traits.
//!
//! - [`envelope`]: AES-256-GCM with a caller-held key, stored as
//!   `nonce || ciphertext || tag`.
//! - [`global_config`]: version-gated read and write of the shared config.
//! - [`storage::SqliteTokenStore`], [`file_backend::FileArtifactStore`]:
//!   what `iota serve` runs on.
//! - [`in_memory_backend`]: the same traits over in-process maps.

pub mod envelope;
pub mod error;
pub mod file_backend;
pub mod global_config;
pub mod in_memory_backend;

#[cfg(feature = "sqlite")]
pub mod storage;

pub use envelope::ConfigKey;
pub use error::*;
pub use global_config::{
    read_global_config, write_global_config, GlobalConfigRead, GlobalConfigWrite, VERSION_FIELD,
};
