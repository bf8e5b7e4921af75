use std::net::TcpListener;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use token_rotation::configuration::get_configuration;
use token_rotation::origin::OriginPolicy;
use token_rotation::startup::{build_rotator, run};
use token_rotation::store::{AccountDirectory, PgAccountDirectory, PgRefreshTokenStore};
use token_rotation::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to initialize database: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Database migration error")
        })?;

    tracing::info!("Database ready");

    let accounts: Arc<dyn AccountDirectory> = Arc::new(PgAccountDirectory::new(pool.clone()));
    let rotator = build_rotator(
        &configuration.jwt,
        configuration.email_client.as_ref(),
        Arc::new(PgRefreshTokenStore::new(pool)),
        accounts.clone(),
    )
    .map_err(|e| {
        tracing::error!("Failed to initialize token service: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Token service error")
    })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let origin_policy = OriginPolicy::new(configuration.application.trust_forwarded_for);
    let server = run(listener, rotator, accounts, origin_policy)?;

    server.await
}
