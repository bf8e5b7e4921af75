/// JWT Claims structure
///
/// Payload of an access token: the user it was issued to, the refresh token
/// it is paired with, and the standard RFC 7519 time and issuer claims.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (opaque user identifier)
    pub sub: String,
    /// Identifier of the paired refresh token
    pub refr: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create new claims for a subject and its paired refresh token
    ///
    /// # Arguments
    /// * `subject` - User identifier
    /// * `paired_refresh_id` - Identifier of the refresh token issued alongside
    /// * `expiry_seconds` - Token expiration in seconds from now
    /// * `issuer` - Issuer identifier
    pub fn new(subject: &str, paired_refresh_id: Uuid, expiry_seconds: i64, issuer: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: subject.to_string(),
            refr: paired_refresh_id,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer.to_string(),
        }
    }
}
