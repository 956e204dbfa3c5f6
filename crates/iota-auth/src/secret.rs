//! Token secret generation and hashing.
//!
//! Secrets are 64 bytes from the OS RNG, base64 encoded (88 characters).
//! Only an Argon2id PHC string of the encoded secret is ever persisted.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{AuthError, AuthResult};

/// Random bytes behind every issued secret.
pub const SECRET_BYTES: usize = 64;

/// Presented tokens shorter than this are rejected before any hashing.
pub const MIN_TOKEN_LEN: usize = 32;

const SALT_BYTES: usize = 16;

/// Generate a fresh bearer secret.
pub fn generate_secret() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; SECRET_BYTES]);
    rand::rngs::OsRng.fill_bytes(&mut *bytes);
    Zeroizing::new(BASE64.encode(&*bytes))
}

/// Argon2id hasher with configurable cost.
#[derive(Clone)]
pub struct TokenHasher {
    argon2: Argon2<'static>,
}

impl TokenHasher {
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> AuthResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AuthError::Config(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a secret into a self-describing PHC string with a random salt.
    pub fn hash(&self, secret: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;

        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Check a presented secret against a stored PHC string.
    ///
    /// A malformed stored hash verifies nothing.
    pub fn verify(&self, secret: &str, phc: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => self
                .argon2
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored token hash is not a PHC string");
                false
            }
        }
    }
}

impl Default for TokenHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> TokenHasher {
        TokenHasher::with_params(256, 1, 1).unwrap()
    }

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 88);
        assert!(secret.len() >= MIN_TOKEN_LEN);
        let decoded = BASE64.decode(secret.as_bytes()).unwrap();
        assert_eq!(decoded.len(), SECRET_BYTES);
    }

    #[test]
    fn test_secrets_are_unique() {
        assert_ne!(*generate_secret(), *generate_secret());
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = cheap_hasher();
        let secret = generate_secret();
        let phc = hasher.hash(&secret).unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(!phc.contains(secret.as_str()));
        assert!(hasher.verify(&secret, &phc));
        assert!(!hasher.verify("some other secret that is long enough", &phc));
    }

    #[test]
    fn test_same_secret_different_salts() {
        let hasher = cheap_hasher();
        let a = hasher.hash("identical-secret-identical-secret").unwrap();
        let b = hasher.hash("identical-secret-identical-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_with_other_cost_params() {
        // PHC strings carry their own params, so a hasher configured
        // differently still verifies them.
        let phc = cheap_hasher().hash("a-secret-that-is-long-enough-123").unwrap();
        let other = TokenHasher::with_params(512, 2, 1).unwrap();
        assert!(other.verify("a-secret-that-is-long-enough-123", &phc));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!cheap_hasher().verify("anything-anything-anything-anything", "not-a-hash"));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(matches!(
            TokenHasher::with_params(1, 1, 1),
            Err(AuthError::Config(_))
        ));
    }
}
