//! iota-deploy
//!
//! Versioned distribution of firmware images and per-device local config.
//!
//! Every read is gated on the device's current version and every write on
//! the stored one. Stale requests are not errors: they come back as the
//! `NotModified` / `Stale` outcome variants and leave storage untouched.
//! Authorization happens before these functions are called.

pub mod error;
pub mod firmware;
pub mod local_config;
pub mod types;

pub use error::{DeployError, DeployResult};
pub use firmware::{current_firmware, deploy_firmware, fetch_firmware};
pub use local_config::{deploy_local_config, fetch_local_config};
pub use types::*;
