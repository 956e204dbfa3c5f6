//! iota root library
//!
//! Wires the workspace crates into a running server: configuration,
//! storage backends, the HTTP router, and instance bootstrap.
//!
//! # Architecture
//!
//! The binary is a thin orchestrator. [`initialize_root`] opens the token
//! database and the artifact directory named by [`RootConfig`] and wraps
//! them in an [`http::AppState`]; [`serve`] hands that state to the axum
//! router. Everything below the router is synchronous and storage-agnostic:
//! handlers pass `&dyn TokenStore` / `&dyn ArtifactStore` into the
//! `iota-auth`, `iota-deploy` and `iota-vault` operations.

pub mod config;
pub mod error;
pub mod http;

pub use config::{HashingConfig, RootConfig, ServerConfig};
pub use error::{RootError, RootResult};

use iota_auth::{IssuedToken, TokenHasher};
use iota_core::{CapabilitySet, TokenStore};
use iota_vault::file_backend::FileArtifactStore;
use iota_vault::storage::SqliteTokenStore;
use std::sync::Arc;
use tracing::info;

/// Name of the token `iota init` creates when the table is empty.
pub const BOOTSTRAP_ADMIN: &str = "admin";

/// Initialized server: its configuration and the shared handler state.
pub struct RootState {
    pub config: RootConfig,
    pub app: Arc<http::AppState>,
}

impl RootState {
    pub fn authorizer(&self) -> iota_auth::Authorizer<'_> {
        self.app.authorizer()
    }

    pub fn router(&self) -> axum::Router {
        http::build_router(self.app.clone())
    }
}

/// Build a hasher from the `[hashing]` section.
pub fn token_hasher(config: &HashingConfig) -> RootResult<TokenHasher> {
    Ok(TokenHasher::with_params(
        config.memory_kib,
        config.iterations,
        config.parallelism,
    )?)
}

/// Open the instance directory and token database named by `config`.
///
/// Creates the directory and the token table if they do not exist yet.
pub fn initialize_root(config: RootConfig) -> RootResult<RootState> {
    config.validate()?;

    let db_path = config.database_path();
    info!(
        instance = %config.instance_path.display(),
        database = %db_path.display(),
        "initializing iota"
    );

    let artifacts = FileArtifactStore::new(&config.instance_path)?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            RootError::Internal(format!(
                "failed to create database directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    let tokens = SqliteTokenStore::open(&db_path)?;

    let app = Arc::new(http::AppState {
        tokens: Arc::new(tokens),
        artifacts: Arc::new(artifacts),
        hasher: token_hasher(&config.hashing)?,
        max_upload_bytes: config.server.max_upload_bytes,
    });

    Ok(RootState { config, app })
}

/// Create the bootstrap admin token if the token table is empty.
///
/// Returns the issued token (with its one-time secret) when one was
/// created, `None` when tokens already exist.
pub fn bootstrap_admin(state: &RootState) -> RootResult<Option<IssuedToken>> {
    if !state.app.tokens.list()?.is_empty() {
        return Ok(None);
    }
    let issued = state
        .authorizer()
        .create(BOOTSTRAP_ADMIN, &CapabilitySet::all().as_permission_string())?;
    info!(name = %issued.name, "bootstrap admin token created");
    Ok(Some(issued))
}

/// Serve the HTTP API until the process is stopped.
pub async fn serve(state: RootState) -> RootResult<()> {
    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    info!(addr = %addr, "iota listening");
    axum::serve(listener, state.router()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iota_core::Capability;

    fn test_config(dir: &std::path::Path) -> RootConfig {
        RootConfig {
            instance_path: dir.join("instance"),
            hashing: HashingConfig {
                memory_kib: 256,
                iterations: 1,
                parallelism: 1,
            },
            ..RootConfig::default()
        }
    }

    #[test]
    fn test_initialize_creates_instance() {
        let dir = tempfile::tempdir().unwrap();
        let state = initialize_root(test_config(dir.path())).unwrap();
        assert!(state.config.instance_path.is_dir());
        assert!(state.config.database_path().is_file());
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.server.max_upload_bytes = 0;
        assert!(initialize_root(config).is_err());
    }

    #[test]
    fn test_bootstrap_admin_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = initialize_root(test_config(dir.path())).unwrap();

        let issued = bootstrap_admin(&state).unwrap().unwrap();
        assert_eq!(issued.name, BOOTSTRAP_ADMIN);
        assert_eq!(issued.permissions, "arw");
        assert!(state
            .authorizer()
            .verify(Some(&issued.token), Capability::Admin));

        assert!(bootstrap_admin(&state).unwrap().is_none());
    }

    #[test]
    fn test_tokens_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let issued = {
            let state = initialize_root(test_config(dir.path())).unwrap();
            bootstrap_admin(&state).unwrap().unwrap()
        };
        let state = initialize_root(test_config(dir.path())).unwrap();
        assert!(state
            .authorizer()
            .verify(Some(&issued.token), Capability::Write));
    }
}
