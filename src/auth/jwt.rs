/// JWT Token Generation and Validation
///
/// Access tokens are HS512 JWTs signed with one process-wide key. Validation
/// accepts HS512 only, so tokens carrying any other `alg` header are rejected
/// before their claims are looked at.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

const ALGORITHM: Algorithm = Algorithm::HS512;

/// Signs and verifies access tokens. Immutable after construction.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry_seconds: i64,
    issuer: String,
}

impl TokenSigner {
    pub fn new(key: &[u8], expiry_seconds: i64, issuer: &str) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        // The configured expiry is the whole lifetime
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            validation,
            expiry_seconds,
            issuer: issuer.to_string(),
        }
    }

    /// Build a signer from configuration
    ///
    /// # Errors
    /// Returns error if the configured secret is missing or not base64
    pub fn from_settings(config: &JwtSettings) -> Result<Self, AppError> {
        let key = config.signing_key()?;
        Ok(Self::new(&key, config.access_token_expiry, &config.issuer))
    }

    /// Generate an access token for a subject, paired with a refresh token
    ///
    /// # Errors
    /// Returns error if token generation fails
    pub fn sign(&self, subject: &str, paired_refresh_id: Uuid) -> Result<String, AppError> {
        let claims = Claims::new(subject, paired_refresh_id, self.expiry_seconds, &self.issuer);

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Validate and extract claims from an access token
    ///
    /// # Errors
    /// Returns error if token is invalid, expired, or tampered with
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::TokenInvalid,
                }
            })
    }
}
