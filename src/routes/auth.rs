//! Token Routes
//!
//! HTTP wrappers around the rotation engine: issuing a pair for a known user
//! and exchanging a pair for a fresh one.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{CredentialPair, SubmittedPair, TokenRotator};
use crate::error::{AppError, ErrorContext, RequestError};
use crate::origin::OriginPolicy;
use crate::store::AccountDirectory;

/// Token issue request
#[derive(Deserialize)]
pub struct TokenRequest {
    pub guid: Uuid,
}

/// POST /auth/token
///
/// Issue an access/refresh pair for an existing user. The refresh token is
/// bound to the caller's origin.
///
/// # Errors
/// - 400: Malformed body
/// - 404: User does not exist
/// - 500/503: Storage or internal failure
pub async fn issue_token(
    req: HttpRequest,
    form: web::Json<TokenRequest>,
    rotator: web::Data<TokenRotator>,
    accounts: web::Data<dyn AccountDirectory>,
    origin_policy: web::Data<OriginPolicy>,
) -> Result<HttpResponse, RequestError> {
    let subject = form.guid.to_string();
    let context = ErrorContext::new("token_issue").with_user_id(subject.clone());
    let origin = origin_policy.origin_of(&req);

    match issue_if_exists(&rotator, accounts.get_ref(), &subject, &origin).await {
        Ok(pair) => {
            tracing::info!(
                request_id = %context.request_id,
                user_id = %subject,
                "Token pair issued"
            );
            Ok(HttpResponse::Ok().json(pair))
        }
        Err(e) => Err(context.fail(e)),
    }
}

async fn issue_if_exists(
    rotator: &TokenRotator,
    accounts: &dyn AccountDirectory,
    subject: &str,
    origin: &str,
) -> Result<CredentialPair, AppError> {
    if !accounts.exists(subject).await? {
        return Err(AppError::UserNotFound);
    }
    rotator.issue(subject, origin).await
}

/// POST /auth/refresh
///
/// Exchange a still-valid pair for a new one. The submitted refresh token is
/// consumed; submitting the same pair again is rejected.
///
/// # Errors
/// - 400: Malformed JSON
/// - 403: Rejected, for any reason (the cause is never returned)
/// - 500/503: Storage or internal failure
pub async fn exchange_token(
    req: HttpRequest,
    form: web::Json<SubmittedPair>,
    rotator: web::Data<TokenRotator>,
    origin_policy: web::Data<OriginPolicy>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("token_exchange");
    let origin = origin_policy.origin_of(&req);

    match rotator.exchange(&form, &origin).await {
        Ok(pair) => {
            tracing::info!(request_id = %context.request_id, "Token pair refreshed");
            Ok(HttpResponse::Ok().json(pair))
        }
        Err(e) => Err(context.fail(e)),
    }
}
