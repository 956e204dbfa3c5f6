//! # iota-auth
//!
//! Bearer-token authorization for the iota OTA server.
//!
//! Tokens are named records holding a capability set over `{a, r, w}` and
//! the Argon2id hash of a random secret. The secret itself is returned once
//! at creation or rotation and never stored.
//!
//! - [`Authorizer::verify`]: does a presented token grant a capability?
//! - [`Authorizer::create`] / [`Authorizer::rotate_or_update`] /
//!   [`Authorizer::delete`] / [`Authorizer::list`]: token lifecycle.
//!
//! # Example
//!
//! ```rust
//! use iota_auth::{Authorizer, TokenHasher};
//! use iota_core::Capability;
//! use iota_vault::in_memory_backend::InMemoryTokenStore;
//!
//! let store = InMemoryTokenStore::new();
//! let hasher = TokenHasher::with_params(256, 1, 1).unwrap();
//! let auth = Authorizer::new(&store, &hasher);
//!
//! let issued = auth.create("deployer", "w").unwrap();
//! assert!(auth.verify(Some(&issued.token), Capability::Write));
//! assert!(!auth.verify(Some(&issued.token), Capability::Admin));
//! ```

pub mod authorizer;
pub mod error;
pub mod secret;

pub use authorizer::{Authorizer, IssuedToken, PLACEHOLDER};
pub use error::{AuthError, AuthResult};
pub use secret::{generate_secret, TokenHasher, MIN_TOKEN_LEN, SECRET_BYTES};
