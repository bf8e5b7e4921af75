/// Error Handling Module
///
/// This module provides the error types shared by the token service:
/// 1. Domain-specific errors (codec, storage, mail, configuration, authentication)
/// 2. A unified application error used for control flow
/// 3. HTTP response mapping that never leaks why a credential was rejected
/// 4. Structured error logging with request context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Errors raised while decoding a refresh token from its transport form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Base64,
    NotUtf8,
    SeparatorCount(usize),
    Identifier,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Base64 => write!(f, "refresh token is not valid base64"),
            DecodeError::NotUtf8 => write!(f, "refresh token payload is not valid UTF-8"),
            DecodeError::SeparatorCount(count) => {
                write!(f, "refresh token has {} separators, expected 1", count)
            }
            DecodeError::Identifier => write!(f, "refresh token identifier is not a UUID"),
        }
    }
}

impl StdError for DecodeError {}

/// Backing store errors
#[derive(Debug, Clone)]
pub enum StorageError {
    UniqueConstraintViolation(String),
    Unavailable(String),
    QueryExecution(String),
    TransactionAborted(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::UniqueConstraintViolation(msg) => write!(f, "Duplicate entry: {}", msg),
            StorageError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            StorageError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            StorageError::TransactionAborted(msg) => write!(f, "Transaction aborted: {}", msg),
        }
    }
}

impl StdError for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StorageError::UniqueConstraintViolation(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Unavailable(err.to_string())
            }
            _ => StorageError::QueryExecution(err.to_string()),
        }
    }
}

/// Email service errors
#[derive(Debug, Clone)]
pub enum EmailError {
    SendFailed(String),
    InvalidRecipient(String),
    ServiceUnavailable(String),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::SendFailed(msg) => write!(f, "Failed to send email: {}", msg),
            EmailError::InvalidRecipient(msg) => write!(f, "Invalid recipient: {}", msg),
            EmailError::ServiceUnavailable(msg) => {
                write!(f, "Email service unavailable: {}", msg)
            }
        }
    }
}

impl StdError for EmailError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication errors
///
/// Exchange collapses every failure into `TokenInvalid` before it leaves the
/// rotation engine; `TokenExpired` only exists for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    TokenExpired,
    TokenInvalid,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Auth(AuthError),
    UserNotFound,
    Storage(StorageError),
    Config(ConfigError),
    Internal(String),
}

impl AppError {
    /// The uniform rejection returned for any failed exchange
    pub fn rejected() -> Self {
        AppError::Auth(AuthError::TokenInvalid)
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::FORBIDDEN,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::Storage(StorageError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::UserNotFound => write!(f, "User does not exist"),
            AppError::Storage(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.into())
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking (request ID or trace ID)
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (code, message) = match self {
            // Every rejection looks the same from the outside
            AppError::Auth(_) => ("TOKEN_INVALID", "Invalid token"),
            AppError::UserNotFound => ("USER_NOT_FOUND", "User does not exist"),
            AppError::Storage(StorageError::Unavailable(_)) => (
                "SERVICE_UNAVAILABLE",
                "Storage service temporarily unavailable",
            ),
            AppError::Storage(_) => ("STORAGE_ERROR", "Internal server error"),
            AppError::Config(_) => ("CONFIG_ERROR", "Internal server error"),
            AppError::Internal(_) => ("INTERNAL_ERROR", "Internal server error"),
        };
        let status = self.status_code();

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message.to_string(),
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }
}

/// An error bound to the request it failed.
/// The response's `error_id` is the request id already written to the logs.
#[derive(Debug)]
pub struct RequestError {
    pub request_id: String,
    pub error: AppError,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (request {})", self.error, self.request_id)
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for RequestError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_response) = self.error.error_response(&self.request_id);
        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Log `error` once under this request id and bind it to the response
    pub fn fail(&self, error: AppError) -> RequestError {
        self.log_error(&error);
        RequestError {
            request_id: self.request_id.clone(),
            error,
        }
    }

    fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        if error.is_rejection() {
            tracing::warn!(
                request_id = %self.request_id,
                error = %error,
                context = ?context,
                "Request rejected"
            );
        } else {
            tracing::error!(
                request_id = %self.request_id,
                error = %error,
                context = ?context,
                "Request failed"
            );
        }
    }
}
