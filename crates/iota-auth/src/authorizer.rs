//! Token verification and lifecycle.
//!
//! An `Authorizer` borrows the token store and hasher for the duration of a
//! single request. It holds no state of its own.

use iota_core::{Capability, CapabilitySet, TokenRecord, TokenStore, TokenSummary, TokenUpdate};
use serde::Serialize;
use std::fmt;

use crate::error::{AuthError, AuthResult};
use crate::secret::{generate_secret, TokenHasher, MIN_TOKEN_LEN};

/// Stand-in for a secret or permission string that was not changed.
pub const PLACEHOLDER: &str = "***";

/// Result of issuing or modifying a token.
///
/// `token` holds the plaintext secret exactly once, right after it was
/// generated; otherwise it is [`PLACEHOLDER`].
#[derive(Clone, Serialize)]
pub struct IssuedToken {
    pub name: String,
    pub token: String,
    pub permissions: String,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .field("permissions", &self.permissions)
            .finish()
    }
}

pub struct Authorizer<'a> {
    store: &'a dyn TokenStore,
    hasher: &'a TokenHasher,
}

impl<'a> Authorizer<'a> {
    pub fn new(store: &'a dyn TokenStore, hasher: &'a TokenHasher) -> Self {
        Self { store, hasher }
    }

    /// Does `token` belong to any record that grants `required`?
    ///
    /// Every record holding `required` or admin is tried; the first one
    /// whose hash verifies wins. Never errors: store failures deny.
    pub fn verify(&self, token: Option<&str>, required: Capability) -> bool {
        let token = match token {
            Some(t) if t.len() >= MIN_TOKEN_LEN => t,
            Some(_) => {
                tracing::debug!(required = %required, "token rejected: too short");
                return false;
            }
            None => {
                tracing::debug!(required = %required, "token rejected: absent");
                return false;
            }
        };

        let candidates = match self.store.granting(required) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "token lookup failed");
                return false;
            }
        };

        let matched = candidates
            .iter()
            .find(|record| self.hasher.verify(token, &record.secret_hash));

        match matched {
            Some(record) => {
                tracing::debug!(name = %record.name, required = %required, "token verified");
                true
            }
            None => {
                tracing::warn!(
                    required = %required,
                    candidates = candidates.len(),
                    "token rejected: no granting record verifies"
                );
                false
            }
        }
    }

    /// Does `token` verify against the record called `name`, whatever its
    /// capabilities?
    pub fn verify_named(&self, name: &str, token: &str) -> bool {
        if name.is_empty() || token.len() < MIN_TOKEN_LEN {
            return false;
        }
        match self.store.get(name) {
            Ok(Some(record)) => self.hasher.verify(token, &record.secret_hash),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, "token lookup failed");
                false
            }
        }
    }

    /// Create a token. The returned secret is not retrievable again.
    pub fn create(&self, name: &str, permissions: &str) -> AuthResult<IssuedToken> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::BadRequest("token name is empty".into()));
        }

        let capabilities = CapabilitySet::sanitize(permissions);
        let secret = generate_secret();
        let record = TokenRecord {
            name: name.to_string(),
            secret_hash: self.hasher.hash(&secret)?,
            capabilities,
        };

        if !self.store.insert(&record)? {
            tracing::warn!(name = %name, "token create rejected: name exists");
            return Err(AuthError::Conflict(name.to_string()));
        }

        tracing::info!(name = %name, permissions = %capabilities, "token created");
        Ok(IssuedToken {
            name: record.name,
            token: secret.to_string(),
            permissions: capabilities.as_permission_string(),
        })
    }

    /// Regenerate the secret, replace the capabilities, or both.
    ///
    /// A permission string that sanitizes to nothing counts as not given.
    pub fn rotate_or_update(
        &self,
        name: &str,
        permissions: Option<&str>,
        regenerate: bool,
    ) -> AuthResult<IssuedToken> {
        let capabilities = permissions
            .map(CapabilitySet::sanitize)
            .filter(|c| !c.is_empty());

        if capabilities.is_none() && !regenerate {
            return Err(AuthError::BadRequest(
                "neither permissions nor secret regeneration requested".into(),
            ));
        }

        let secret = regenerate.then(generate_secret);
        let update = TokenUpdate {
            secret_hash: secret.as_ref().map(|s| self.hasher.hash(s)).transpose()?,
            capabilities,
        };

        match self.store.update(name, &update) {
            Ok(true) => {}
            Ok(false) => {
                return Err(AuthError::BadRequest(format!("unknown token: {}", name)));
            }
            Err(e) => {
                tracing::error!(name = %name, error = %e, "token update failed");
                return Err(AuthError::BadRequest("token update failed".into()));
            }
        }

        tracing::info!(
            name = %name,
            regenerated = regenerate,
            permissions_updated = capabilities.is_some(),
            "token updated"
        );

        Ok(IssuedToken {
            name: name.to_string(),
            token: secret
                .map(|s| s.to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            permissions: capabilities
                .map(|c| c.as_permission_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        })
    }

    pub fn delete(&self, name: &str) -> AuthResult<()> {
        match self.store.delete(name) {
            Ok(true) => {
                tracing::info!(name = %name, "token deleted");
                Ok(())
            }
            Ok(false) => Err(AuthError::BadRequest(format!("unknown token: {}", name))),
            Err(e) => {
                tracing::error!(name = %name, error = %e, "token delete failed");
                Err(AuthError::BadRequest("token delete failed".into()))
            }
        }
    }

    /// Name and permissions of one token, or of all tokens.
    pub fn list(&self, name: Option<&str>) -> AuthResult<Vec<TokenSummary>> {
        let summaries: Vec<TokenSummary> = match name {
            Some(name) => self
                .store
                .get(name)?
                .iter()
                .map(TokenSummary::from)
                .collect(),
            None => self.store.list()?.iter().map(TokenSummary::from).collect(),
        };

        if summaries.is_empty() {
            return Err(AuthError::NotFound);
        }
        Ok(summaries)
    }
}
