use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Error Codes
// ============================================================================

pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INVALID_FORMAT: &str = "INVALID_FORMAT";
    pub const AUTHENTICATION_ERROR: &str = "AUTHENTICATION_ERROR";
    pub const AUTHORIZATION_ERROR: &str = "AUTHORIZATION_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const LIMIT_EXCEEDED: &str = "LIMIT_EXCEEDED";
    pub const DUPLICATE_TRACKING: &str = "DUPLICATE_TRACKING";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const EXTERNAL_SERVICE_ERROR: &str = "EXTERNAL_SERVICE_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    pub const BAD_GATEWAY: &str = "BAD_GATEWAY";
    pub const CIRCUIT_BREAKER_OPEN: &str = "CIRCUIT_BREAKER_OPEN";
    pub const CIRCUIT_BREAKER_HALF_OPEN_LIMIT: &str = "CIRCUIT_BREAKER_HALF_OPEN_LIMIT";
    pub const CANCELLED: &str = "CANCELLED";
}

/// Detail key carrying the number of seconds a client should wait before retrying.
pub const RETRY_AFTER_DETAIL: &str = "retry_after_seconds";

// ============================================================================
// Kinds and Severity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    Internal,
    External,
    Timeout,
    Unavailable,
    BadGateway,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Internal => "internal",
            ErrorKind::External => "external",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::BadGateway => "bad_gateway",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::Authorization => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::RateLimit => 429,
            ErrorKind::Timeout => 408,
            ErrorKind::Unavailable => 503,
            ErrorKind::BadGateway | ErrorKind::External => 502,
            ErrorKind::Internal => 500,
        }
    }

    /// Client-caused failures are never retried; infrastructure failures are.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::Unavailable
                | ErrorKind::BadGateway
                | ErrorKind::External
                | ErrorKind::RateLimit
        )
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::Validation | ErrorKind::NotFound => Severity::Low,
            ErrorKind::Authentication
            | ErrorKind::Authorization
            | ErrorKind::Conflict
            | ErrorKind::RateLimit => Severity::Medium,
            ErrorKind::External
            | ErrorKind::Timeout
            | ErrorKind::Unavailable
            | ErrorKind::BadGateway => Severity::High,
            ErrorKind::Internal => Severity::Critical,
        }
    }

    pub fn default_code(self) -> &'static str {
        match self {
            ErrorKind::Validation => codes::VALIDATION_ERROR,
            ErrorKind::Authentication => codes::AUTHENTICATION_ERROR,
            ErrorKind::Authorization => codes::AUTHORIZATION_ERROR,
            ErrorKind::NotFound => codes::NOT_FOUND,
            ErrorKind::Conflict => codes::CONFLICT,
            ErrorKind::RateLimit => codes::RATE_LIMIT_EXCEEDED,
            ErrorKind::Internal => codes::INTERNAL_ERROR,
            ErrorKind::External => codes::EXTERNAL_SERVICE_ERROR,
            ErrorKind::Timeout => codes::TIMEOUT,
            ErrorKind::Unavailable => codes::SERVICE_UNAVAILABLE,
            ErrorKind::BadGateway => codes::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

// ============================================================================
// AppError
// ============================================================================

/// The structured error carried across every service boundary.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub http_status: u16,
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
    pub service: Option<String>,
    pub operation: Option<String>,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.default_code().to_string(),
            message: message.into(),
            severity: kind.default_severity(),
            http_status: kind.http_status(),
            timestamp: Utc::now(),
            request_id: None,
            service: None,
            operation: None,
            retryable: kind.default_retryable(),
            details: BTreeMap::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message).with_code(codes::INVALID_FORMAT)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("{} {} not found", resource, id))
            .with_detail("resource", resource)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn limit_exceeded(message: impl Into<String>, limit: usize) -> Self {
        Self::new(ErrorKind::Conflict, message)
            .with_code(codes::LIMIT_EXCEEDED)
            .with_detail("limit", limit)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        let err = Self::new(ErrorKind::RateLimit, message);
        match retry_after_seconds {
            Some(secs) => err.with_detail(RETRY_AFTER_DETAIL, secs),
            None => err,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadGateway, message)
    }

    pub fn circuit_open(breaker: &str) -> Self {
        Self::new(ErrorKind::Unavailable, format!("circuit breaker '{}' is open", breaker))
            .with_code(codes::CIRCUIT_BREAKER_OPEN)
            .with_detail("breaker", breaker)
            .with_detail(RETRY_AFTER_DETAIL, 30)
    }

    pub fn half_open_limit(breaker: &str) -> Self {
        Self::new(
            ErrorKind::Unavailable,
            format!("circuit breaker '{}' is half-open and at its request limit", breaker),
        )
        .with_code(codes::CIRCUIT_BREAKER_HALF_OPEN_LIMIT)
        .with_detail("breaker", breaker)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
            .with_code(codes::CANCELLED)
            .retryable(false)
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = status;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    pub fn is_circuit_open(&self) -> bool {
        self.is(codes::CIRCUIT_BREAKER_OPEN) || self.is(codes::CIRCUIT_BREAKER_HALF_OPEN_LIMIT)
    }

    pub fn retry_after_seconds(&self) -> Option<u64> {
        self.details.get(RETRY_AFTER_DETAIL).and_then(Value::as_u64)
    }

    /// Render the public HTTP envelope. In production, internal messages are
    /// replaced with a generic message so implementation detail never leaks.
    pub fn to_envelope(&self, production: bool) -> ErrorEnvelope {
        let hide = production && self.kind == ErrorKind::Internal;
        let message = if hide {
            "An internal error occurred".to_string()
        } else {
            self.message.clone()
        };
        let details = if hide || self.details.is_empty() {
            None
        } else {
            Some(self.details.clone())
        };

        ErrorEnvelope {
            error: ErrorBody {
                error_type: self.kind,
                code: self.code.clone(),
                message,
                timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                request_id: self.request_id.clone().unwrap_or_default(),
                service: self.service.clone().unwrap_or_default(),
                operation: self.operation.clone(),
                details,
                retryable: self.retryable.then_some(true),
            },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::invalid_format(format!("JSON processing failed: {}", err))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(err: rust_decimal::Error) -> Self {
        AppError::invalid_format(format!("invalid decimal: {}", err))
    }
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: ErrorKind,
    pub code: String,
    pub message: String,
    pub timestamp: String,
    pub request_id: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}
