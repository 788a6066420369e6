//! Error handling for Civica Core.
//!
//! Every fallible operation returns [`CivicaError`]. Its [`ErrorCode`] fixes
//! the HTTP status, the log level and the `civica_errors_total` labels, so
//! call sites only pick a code and a user-safe message.
//!
//! Authorization outcomes (`PolicyDenied`, `HierarchyViolation`,
//! `OutOfScope`, `LevelScopeMismatch`) all map to 403 and are final.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::Level;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Civica operations.
pub type Result<T> = std::result::Result<T, CivicaError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes, serialized as `SCREAMING_SNAKE_CASE`.
///
/// Clients match on these; the wording of messages may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication
    Unauthorized,
    InvalidToken,
    TokenExpired,

    // Authorization
    Forbidden,
    PolicyDenied,
    HierarchyViolation,
    OutOfScope,
    LevelScopeMismatch,

    // Caller input
    ValidationError,
    InvalidPagination,

    // Lookups
    RecordNotFound,
    RoleNotFound,
    GrantNotFound,
    DuplicateRecord,

    // Storage
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    SerializationError,
    DeserializationError,

    // Process
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,
    InternalError,
}

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, lookups outside visibility)
    Low,
    /// Authentication failures and authorization denials
    Medium,
    /// Storage and serialization failures
    High,
    /// The service cannot do its job
    Critical,
}

impl ErrorCode {
    /// HTTP status, severity and metric category, in one table.
    const fn profile(&self) -> (StatusCode, ErrorSeverity, &'static str) {
        use ErrorSeverity::*;
        match self {
            Self::Unauthorized | Self::InvalidToken | Self::TokenExpired => {
                (StatusCode::UNAUTHORIZED, Medium, "authentication")
            }
            Self::Forbidden
            | Self::PolicyDenied
            | Self::HierarchyViolation
            | Self::OutOfScope
            | Self::LevelScopeMismatch => (StatusCode::FORBIDDEN, Medium, "authorization"),
            Self::ValidationError | Self::InvalidPagination => (StatusCode::BAD_REQUEST, Low, "validation"),
            Self::RecordNotFound | Self::RoleNotFound | Self::GrantNotFound => {
                (StatusCode::NOT_FOUND, Low, "lookup")
            }
            Self::DuplicateRecord => (StatusCode::CONFLICT, Low, "lookup"),
            Self::DatabaseConnectionFailed => (StatusCode::SERVICE_UNAVAILABLE, Critical, "storage"),
            Self::DatabaseError
            | Self::DatabaseQueryFailed
            | Self::SerializationError
            | Self::DeserializationError => (StatusCode::INTERNAL_SERVER_ERROR, High, "storage"),
            Self::ConfigurationError | Self::MissingConfiguration | Self::InvalidConfiguration => {
                (StatusCode::INTERNAL_SERVER_ERROR, High, "configuration")
            }
            Self::InternalError => (StatusCode::INTERNAL_SERVER_ERROR, Critical, "internal"),
        }
    }

    pub const fn http_status(&self) -> StatusCode {
        self.profile().0
    }

    pub const fn severity(&self) -> ErrorSeverity {
        self.profile().1
    }

    /// Label used in logs and the `civica_errors_total` counter.
    pub const fn category(&self) -> &'static str {
        self.profile().2
    }

    /// Whether a client may retry the same request.
    ///
    /// Authorization outcomes are final and never retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseConnectionFailed | Self::DatabaseQueryFailed)
    }

    /// Whether this code belongs to the forbidden family.
    pub const fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::Forbidden
                | Self::PolicyDenied
                | Self::HierarchyViolation
                | Self::OutOfScope
                | Self::LevelScopeMismatch
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Related entity ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Requirements that were not satisfied (policy denials)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_missing(mut self, missing: Vec<String>) -> Self {
        self.missing = missing;
        self
    }

    fn is_empty(&self) -> bool {
        self.entity_id.is_none() && self.missing.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Civica Core.
///
/// This error type supports:
/// - Structured error codes for API responses
/// - An optional source error
/// - User-safe vs internal messages
/// - HTTP status code mapping
/// - Metrics integration
#[derive(Error, Debug)]
#[error("[{code}] {user_message}{}", .internal_message.as_deref().map(|m| format!(" (internal: {m})")).unwrap_or_default())]
pub struct CivicaError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-safe error message (can be exposed to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CivicaError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a not found error.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(&entity_type, &entity_id))
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a bad pagination request error.
    pub fn invalid_pagination(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidPagination, message)
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// A policy denial naming every unsatisfied requirement.
    pub fn policy_denied(missing: Vec<String>) -> Self {
        Self::new(
            ErrorCode::PolicyDenied,
            format!("Missing required permissions: {}", missing.join(", ")),
        )
        .with_details(ErrorDetails::new().with_missing(missing))
    }

    /// The actor's role level cannot manage the target level.
    pub fn hierarchy_violation(actor: impl fmt::Display, target: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::HierarchyViolation,
            format!("Role level {} cannot manage role level {}", actor, target),
        )
    }

    /// The target organizational unit lies outside the caller's scope.
    pub fn out_of_scope(target: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::OutOfScope,
            format!("Target {} is outside the caller's scope", target),
        )
    }

    /// A role level was paired with an access level it does not agree with.
    pub fn level_scope_mismatch(role_level: impl fmt::Display, access_level: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::LevelScopeMismatch,
            format!(
                "Role level {} is not compatible with access level {}",
                role_level, access_level
            ),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-safe message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Whether this error is a forbidden outcome.
    pub fn is_forbidden(&self) -> bool {
        self.code.is_forbidden()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        self.code.severity()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Emit this error at the level its severity calls for.
    pub fn log(&self) {
        let code = self.code.to_string();
        let status = self.http_status().as_u16();
        let internal = self.internal_message.as_deref().unwrap_or("");
        let source = self.source.as_ref().map(|s| s.to_string()).unwrap_or_default();

        macro_rules! emit {
            ($lvl:expr) => {
                tracing::event!(
                    $lvl,
                    error_code = %code,
                    category = self.code.category(),
                    http_status = status,
                    severity = ?self.severity(),
                    internal = internal,
                    source = %source,
                    "{}",
                    self.user_message
                )
            };
        }
        // `event!` needs a constant level per callsite.
        match self.severity() {
            ErrorSeverity::Low => emit!(Level::DEBUG),
            ErrorSeverity::Medium => emit!(Level::WARN),
            ErrorSeverity::High | ErrorSeverity::Critical => emit!(Level::ERROR),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "civica_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Error message (same envelope field as successful responses)
    pub error: String,

    /// Machine-readable error code
    pub error_code: ErrorCode,

    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&CivicaError> for ErrorResponse {
    fn from(error: &CivicaError) -> Self {
        Self {
            success: false,
            error: error.user_message.to_string(),
            error_code: error.code,
            details: if error.details.is_empty() {
                None
            } else {
                Some(error.details.clone())
            },
            timestamp: chrono::Utc::now(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for CivicaError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for CivicaError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (ErrorCode::RecordNotFound, "Record not found"),
            sqlx::Error::Database(db) if db.is_unique_violation() => (
                ErrorCode::DuplicateRecord,
                "A record with this identifier already exists",
            ),
            sqlx::Error::Database(_) => (ErrorCode::DatabaseQueryFailed, "Query failed"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => (
                ErrorCode::DatabaseConnectionFailed,
                "The database is unavailable",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };
        let internal = error.to_string();
        Self::with_internal(code, user_msg, internal).with_source(error)
    }
}

impl From<serde_json::Error> for CivicaError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<jsonwebtoken::errors::Error> for CivicaError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::ExpiredSignature => (ErrorCode::TokenExpired, "Token has expired"),
            _ => (ErrorCode::InvalidToken, "Invalid bearer token"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for CivicaError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<CivicaError>() {
            Ok(civica_error) => civica_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for CivicaError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
