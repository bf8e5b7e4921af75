/// Token Issuance and Rotation
///
/// Issue hands out an (access, refresh) pair bound together by the refresh
/// token id carried in the access token's `refr` claim. Exchange trades a
/// still-valid pair for a new one:
///
/// 1. verify the access token
/// 2. decode the refresh token and check it is the one paired with the access token
/// 3. look up the subject's account
/// 4. load the refresh record (gone means the token was already used)
/// 5. check the refresh token against the stored hash
/// 6. delete the old record and insert the new one in a single transaction
///
/// Any failure in steps 1-5 is the same rejection to the caller. An exchange
/// from a different origin than the one bound at issue still succeeds, and
/// sends an alert in the background once the rotation has committed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::TokenSigner;
use crate::auth::notifier::AnomalyNotifier;
use crate::auth::refresh_token::RefreshToken;
use crate::auth::verifier::RefreshTokenHasher;
use crate::error::{AppError, StorageError};
use crate::store::{AccountDirectory, RefreshTokenStore, RotationOutcome, VerificationRecord};

/// The pair returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: RefreshToken,
}

/// A pair as submitted for exchange; the refresh token is still encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedPair {
    pub access: String,
    pub refresh: String,
}

impl From<&CredentialPair> for SubmittedPair {
    fn from(pair: &CredentialPair) -> Self {
        Self {
            access: pair.access.clone(),
            refresh: pair.refresh.encode(),
        }
    }
}

#[derive(Clone)]
pub struct TokenRotator {
    signer: Arc<TokenSigner>,
    hasher: RefreshTokenHasher,
    tokens: Arc<dyn RefreshTokenStore>,
    accounts: Arc<dyn AccountDirectory>,
    notifier: AnomalyNotifier,
}

impl TokenRotator {
    pub fn new(
        signer: Arc<TokenSigner>,
        hasher: RefreshTokenHasher,
        tokens: Arc<dyn RefreshTokenStore>,
        accounts: Arc<dyn AccountDirectory>,
        notifier: AnomalyNotifier,
    ) -> Self {
        Self {
            signer,
            hasher,
            tokens,
            accounts,
            notifier,
        }
    }

    /// Issue a new pair for `subject`, bound to `origin`
    ///
    /// The caller must have confirmed that the subject exists.
    ///
    /// # Errors
    /// Returns a storage error if the refresh record cannot be written
    pub async fn issue(&self, subject: &str, origin: &str) -> Result<CredentialPair, AppError> {
        let (pair, record) = self.mint(subject, origin).await?;
        self.tokens.insert(&record).await?;

        tracing::info!(refresh_id = %record.id, "Issued token pair");
        Ok(pair)
    }

    /// Exchange a pair for a new one
    ///
    /// # Errors
    /// `AppError::Auth(TokenInvalid)` for any rejection, whatever the cause;
    /// storage or internal errors when the rotation itself could not complete.
    pub async fn exchange(
        &self,
        submitted: &SubmittedPair,
        origin: &str,
    ) -> Result<CredentialPair, AppError> {
        let claims = self.signer.verify(&submitted.access).map_err(|e| {
            reject(format_args!("access token failed verification: {}", e))
        })?;

        let refresh = RefreshToken::decode(&submitted.refresh)
            .map_err(|e| reject(format_args!("refresh token failed to decode: {}", e)))?;

        if claims.refr != refresh.id() {
            return Err(reject(format_args!(
                "access token paired with {} but refresh token is {}",
                claims.refr,
                refresh.id()
            )));
        }

        let account = self
            .accounts
            .find_by_subject(&claims.sub)
            .await?
            .ok_or_else(|| reject(format_args!("subject has no account")))?;

        let stored_hash = self
            .tokens
            .fetch_hash(refresh.id())
            .await?
            .ok_or_else(|| {
                reject(format_args!("refresh token {} is not live", refresh.id()))
            })?;

        if !self.hasher.verify_blocking(&refresh, &stored_hash).await? {
            return Err(reject(format_args!(
                "refresh token {} does not match its record",
                refresh.id()
            )));
        }

        let (pair, replacement) = self.mint(&claims.sub, origin).await?;
        let new_id = replacement.id;
        let origin_change = (origin != refresh.origin()).then(|| OriginChange {
            username: account.username,
            contact: account.email,
            new_origin: origin.to_string(),
        });

        match self
            .commit_rotation(refresh.id(), replacement, origin_change)
            .await?
        {
            RotationOutcome::Rotated => {}
            RotationOutcome::Missing => {
                return Err(reject(format_args!(
                    "refresh token {} was consumed concurrently",
                    refresh.id()
                )));
            }
        }

        tracing::info!(consumed = %refresh.id(), issued = %new_id, "Rotated token pair");
        Ok(pair)
    }

    /// Sign the access token and hash the new refresh token.
    /// Runs before any transaction is opened.
    async fn mint(
        &self,
        subject: &str,
        origin: &str,
    ) -> Result<(CredentialPair, VerificationRecord), AppError> {
        let refresh = RefreshToken::generate(origin)?;
        let access = self.signer.sign(subject, refresh.id())?;
        let hash = self.hasher.hash_blocking(&refresh).await?;

        let record = VerificationRecord {
            id: refresh.id(),
            hash,
        };
        Ok((CredentialPair { access, refresh }, record))
    }

    /// The rotation runs on its own task so that dropping the request future
    /// cannot interrupt it between delete and commit. The origin change alert
    /// is dispatched from the same task, so a committed rotation always sends it.
    async fn commit_rotation(
        &self,
        consumed: Uuid,
        replacement: VerificationRecord,
        origin_change: Option<OriginChange>,
    ) -> Result<RotationOutcome, AppError> {
        let tokens = Arc::clone(&self.tokens);
        let notifier = self.notifier.clone();

        let outcome = tokio::spawn(async move {
            let outcome = tokens.rotate(consumed, replacement).await?;
            if let (RotationOutcome::Rotated, Some(change)) = (outcome, origin_change) {
                tracing::warn!(refresh_id = %consumed, "Refresh token exchanged from a new origin");
                notifier.dispatch(change.username, change.contact, change.new_origin);
            }
            Ok::<_, StorageError>(outcome)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Rotation task failed: {}", e)))??;

        Ok(outcome)
    }
}

struct OriginChange {
    username: String,
    contact: String,
    new_origin: String,
}

fn reject(reason: std::fmt::Arguments<'_>) -> AppError {
    tracing::warn!(reason = %reason, "Token exchange rejected");
    AppError::rejected()
}
