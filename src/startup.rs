use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AnomalyNotifier, RefreshTokenHasher, TokenRotator, TokenSigner};
use crate::configuration::{EmailClientSettings, JwtSettings};
use crate::email_client::Mailer;
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::origin::OriginPolicy;
use crate::routes::{exchange_token, health_check, issue_token};
use crate::store::{AccountDirectory, RefreshTokenStore};

const MAX_BODY_BYTES: usize = 8 * 1024;

/// Assemble the rotation engine from configuration and its stores.
///
/// Without an `email_client` section origin-change alerts are disabled.
pub fn build_rotator(
    jwt_config: &JwtSettings,
    email_config: Option<&EmailClientSettings>,
    tokens: Arc<dyn RefreshTokenStore>,
    accounts: Arc<dyn AccountDirectory>,
) -> Result<TokenRotator, AppError> {
    let signer = TokenSigner::from_settings(jwt_config)?;
    let hash_cost = jwt_config.hash_cost()?;

    let notifier = match email_config {
        Some(settings) => {
            let mailer: Arc<dyn Mailer> = Arc::new(settings.client()?);
            AnomalyNotifier::new(mailer)
        }
        None => {
            tracing::warn!("email_client is not configured, origin change alerts are disabled");
            AnomalyNotifier::disabled()
        }
    };

    Ok(TokenRotator::new(
        Arc::new(signer),
        RefreshTokenHasher::new(hash_cost),
        tokens,
        accounts,
        notifier,
    ))
}

pub fn run(
    listener: TcpListener,
    rotator: TokenRotator,
    accounts: Arc<dyn AccountDirectory>,
    origin_policy: OriginPolicy,
) -> Result<Server, std::io::Error> {
    let rotator = web::Data::new(rotator);
    let accounts: web::Data<dyn AccountDirectory> = web::Data::from(accounts);
    let origin_policy_data = web::Data::new(origin_policy);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware::new(origin_policy))

            // Shared state
            .app_data(web::JsonConfig::default().limit(MAX_BODY_BYTES))
            .app_data(rotator.clone())
            .app_data(accounts.clone())
            .app_data(origin_policy_data.clone())

            .route("/health_check", web::get().to(health_check))
            .route("/auth/token", web::post().to(issue_token))
            .route("/auth/refresh", web::post().to(exchange_token))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
