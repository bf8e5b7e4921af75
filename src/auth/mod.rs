/// Authentication module
///
/// Access token signing, the refresh token codec and its verification hash,
/// the issue/exchange rotation engine and origin-change alerts.

mod claims;
mod jwt;
mod notifier;
mod refresh_token;
mod rotation;
mod verifier;

pub use claims::Claims;
pub use jwt::TokenSigner;
pub use notifier::{AnomalyNotifier, ALERT_SUBJECT};
pub use refresh_token::RefreshToken;
pub use rotation::{CredentialPair, SubmittedPair, TokenRotator};
pub use verifier::{verification_input, RefreshTokenHasher};
