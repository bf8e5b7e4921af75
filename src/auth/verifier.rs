/// Refresh Token Verification Hashing
///
/// The server never stores a refresh token. It stores a bcrypt hash of the
/// SHA-512 digest of the token's canonical text (`"{id}|{origin}"`). The
/// digest keeps the input under bcrypt's 72-byte limit while still binding
/// both the identifier and the origin.

use bcrypt::{hash, verify};
use sha2::{Digest, Sha512};

use crate::auth::refresh_token::RefreshToken;
use crate::error::AppError;

/// SHA-512 digest fed to bcrypt
pub fn verification_input(token: &RefreshToken) -> Vec<u8> {
    Sha512::digest(token.canonical_text().as_bytes()).to_vec()
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshTokenHasher {
    cost: u32,
}

impl RefreshTokenHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a refresh token with a fresh salt
    ///
    /// # Errors
    /// Returns error if the cost is out of range or bcrypt fails
    pub fn hash(&self, token: &RefreshToken) -> Result<String, AppError> {
        hash(verification_input(token), self.cost)
            .map_err(|e| AppError::Internal(format!("Refresh token hashing failed: {}", e)))
    }

    /// Check a refresh token against a stored hash
    ///
    /// A malformed stored hash counts as a mismatch.
    pub fn verify(&self, token: &RefreshToken, stored_hash: &str) -> bool {
        match verify(verification_input(token), stored_hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(refresh_id = %token.id(), "Stored refresh hash unreadable: {}", e);
                false
            }
        }
    }

    /// [`Self::hash`] on the blocking pool
    pub async fn hash_blocking(&self, token: &RefreshToken) -> Result<String, AppError> {
        let hasher = *self;
        let token = token.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&token))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
    }

    /// [`Self::verify`] on the blocking pool
    pub async fn verify_blocking(
        &self,
        token: &RefreshToken,
        stored_hash: &str,
    ) -> Result<bool, AppError> {
        let hasher = *self;
        let token = token.clone();
        let stored_hash = stored_hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&token, &stored_hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))
    }
}

impl Default for RefreshTokenHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}
