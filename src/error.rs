/// Error Handling Module
///
/// One error type per concern, all converging on `AppError`:
/// 1. Component errors (token codec, credential hasher, storage)
/// 2. Boundary errors (authentication failures the caller may see)
/// 3. HTTP response mapping with structured logging

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. COMPONENT ERRORS
/// ============================================================================

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooLong(String, usize),
    InvalidFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Failures of the refresh token store or the principal directory
#[derive(Debug)]
pub enum StorageError {
    Timeout,
    Unavailable(String),
    Query(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Timeout => write!(f, "Storage call timed out"),
            StorageError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            StorageError::Query(msg) => write!(f, "Storage query failed: {}", msg),
        }
    }
}

impl StdError for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StorageError::Timeout,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                StorageError::Unavailable(err.to_string())
            }
            other => StorageError::Query(other.to_string()),
        }
    }
}

/// Token codec failures.
///
/// `Expired` is only reported for tokens whose signature checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Invalid,
    Expired,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Invalid => write!(f, "Invalid token"),
            TokenError::Expired => write!(f, "Token has expired"),
        }
    }
}

impl StdError for TokenError {}

/// Credential hasher failures
#[derive(Debug)]
pub enum HashError {
    /// The stored hash string could not be parsed
    Format(String),
    Hashing(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::Format(msg) => write!(f, "Malformed hash: {}", msg),
            HashError::Hashing(msg) => write!(f, "Hashing failed: {}", msg),
        }
    }
}

impl StdError for HashError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// ============================================================================
/// 2. BOUNDARY ERRORS
/// ============================================================================

/// Authentication failures as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown email or wrong password; the two are never distinguished
    InvalidCredentials,
    MissingToken,
    TokenInvalid,
    TokenExpired,
    Unauthorized(String),
}

impl AuthError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AuthError::Unauthorized(msg.into())
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::MissingToken => write!(f, "no token"),
            AuthError::TokenInvalid => write!(f, "invalid token"),
            AuthError::TokenExpired => write!(f, "token expired"),
            AuthError::Unauthorized(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for AuthError {}

/// Central error type returned by handlers and the session manager
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Storage(StorageError),
    Auth(AuthError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Storage(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

/// A hash that cannot be parsed means the stored data or the code is broken,
/// so it surfaces as an internal error and never as an auth outcome.
impl From<HashError> for AppError {
    fn from(err: HashError) -> Self {
        AppError::Internal(err.to_string())
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
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

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl AppError {
    /// JSON error response carrying `request_id` as its `error_id`
    pub fn render(&self, request_id: &str) -> HttpResponse {
        let (status, body) = <Self as ErrorHandler>::error_response(self, request_id);
        HttpResponse::build(status).json(body)
    }

    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),

            // Storage details stay in the logs
            AppError::Storage(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Service temporarily unavailable".to_string(),
            ),

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INVALID_CREDENTIALS",
                    "Invalid credentials".to_string(),
                ),
                AuthError::MissingToken => {
                    (StatusCode::UNAUTHORIZED, "MISSING_TOKEN", "no token".to_string())
                }
                AuthError::TokenInvalid => {
                    (StatusCode::UNAUTHORIZED, "TOKEN_INVALID", "invalid token".to_string())
                }
                AuthError::TokenExpired => {
                    (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "token expired".to_string())
                }
                AuthError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
            },

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.classify();
        let body = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );
        (status, body)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Storage(e) => {
                tracing::error!(request_id = request_id, error = %e, "Storage error");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(request_id = request_id, "Invalid credentials attempt");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
///
/// Logging happens in `LoggerMiddleware`, which re-renders the body under the
/// request's own id; the id minted here only survives outside that middleware.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.render(&request_id)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_invalid_credentials_maps_to_422() {
        let err = AppError::from(AuthError::InvalidCredentials);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_expired_and_invalid_tokens_have_distinct_codes() {
        let (status_expired, expired) =
            <AppError as ErrorHandler>::error_response(&AuthError::TokenExpired.into(), "r1");
        let (status_invalid, invalid) =
            <AppError as ErrorHandler>::error_response(&AuthError::TokenInvalid.into(), "r2");

        assert_eq!(status_expired, StatusCode::UNAUTHORIZED);
        assert_eq!(status_invalid, StatusCode::UNAUTHORIZED);
        assert_eq!(expired.code, "TOKEN_EXPIRED");
        assert_eq!(invalid.code, "TOKEN_INVALID");
    }

    #[test]
    fn test_storage_error_does_not_leak_details() {
        let err = AppError::from(StorageError::Query("relation \"users\" does not exist".into()));
        let (status, body) = <AppError as ErrorHandler>::error_response(&err, "r3");

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.message.contains("users"));
    }

    #[test]
    fn test_hash_error_is_internal() {
        let err = AppError::from(HashError::Format("bad".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
