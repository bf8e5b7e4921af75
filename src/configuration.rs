use base64::{engine::general_purpose::STANDARD, Engine as _};
use config::ConfigError;

use crate::email_client::{EmailClient, SenderEmail};

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub email_client: Option<EmailClientSettings>,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Take the request origin from `X-Forwarded-For` when running behind a proxy
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// Access token and refresh hash settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    /// Base64-encoded HS512 signing key
    pub secret: String,
    pub access_token_expiry: i64, // seconds (e.g., 900 for 15 minutes)
    pub issuer: String,
    #[serde(default = "default_refresh_hash_cost")]
    pub refresh_hash_cost: u32,
}

// bcrypt accepts costs 4..=31
const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

fn default_refresh_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl JwtSettings {
    /// Decode the configured signing key
    pub fn signing_key(&self) -> Result<Vec<u8>, crate::error::ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(crate::error::ConfigError::MissingRequired(
                "jwt.secret".to_string(),
            ));
        }
        STANDARD.decode(self.secret.trim()).map_err(|e| {
            crate::error::ConfigError::InvalidValue(format!("jwt.secret is not base64: {}", e))
        })
    }

    /// The refresh hash cost, checked against bcrypt's range
    pub fn hash_cost(&self) -> Result<u32, crate::error::ConfigError> {
        if (MIN_HASH_COST..=MAX_HASH_COST).contains(&self.refresh_hash_cost) {
            Ok(self.refresh_hash_cost)
        } else {
            Err(crate::error::ConfigError::InvalidValue(format!(
                "jwt.refresh_hash_cost must be between {} and {}, got {}",
                MIN_HASH_COST, MAX_HASH_COST, self.refresh_hash_cost
            )))
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_milliseconds: u64,
}

fn default_email_timeout() -> u64 {
    10_000
}

impl EmailClientSettings {
    pub fn client(&self) -> Result<EmailClient, crate::error::ConfigError> {
        let sender = SenderEmail::parse(self.sender_email.clone())
            .map_err(crate::error::ConfigError::InvalidValue)?;
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_milliseconds))
            .build()
            .map_err(|e| crate::error::ConfigError::InvalidValue(e.to_string()))?;

        Ok(EmailClient::new(self.base_url.clone(), sender, http_client))
    }
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP_`-prefixed environment variables, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
