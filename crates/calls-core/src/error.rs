//! Error types for call lifecycle operations

use thiserror::Error;

/// Result type for calls-core operations
pub type Result<T> = std::result::Result<T, CallError>;

/// Errors that can occur while creating, reading, or reconciling calls
#[derive(Debug, Error)]
pub enum CallError {
    /// Call, contact, or script lookup miss
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Owner already holds the maximum number of active calls
    #[error("Maximum number of active calls reached ({active}/{max})")]
    AdmissionDenied { active: u64, max: u32 },

    /// Operation not permitted in the call's current state
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Upstream HTTP or network failure talking to the telephony provider
    #[error("Provider error: {}", describe_provider_failure(.status, .body))]
    Provider { status: Option<u16>, body: String },

    /// Push-boundary shared secret mismatch
    #[error("Invalid or missing webhook secret")]
    AuthenticationFailed,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON encoding or decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification of a [`CallError`], used by the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AdmissionDenied,
    InvalidOperation,
    Provider,
    AuthenticationFailed,
    Internal,
}

impl CallError {
    /// Create a call-not-found error
    pub fn call_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { entity: "Call", id: id.into() }
    }

    /// Create a contact-not-found error
    pub fn contact_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { entity: "Contact", id: id.into() }
    }

    /// Create a script-not-found error
    pub fn script_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { entity: "Call script", id: id.into() }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation { message: message.into() }
    }

    /// Create a provider error
    pub fn provider(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::Provider { status, body: body.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AdmissionDenied { .. } => ErrorKind::AdmissionDenied,
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            Self::Database(_) | Self::Serialization(_) | Self::Config { .. } | Self::Internal { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

fn describe_provider_failure(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, body),
        None => body.to_string(),
    }
}

impl From<config::ConfigError> for CallError {
    fn from(err: config::ConfigError) -> Self {
        Self::config(err.to_string())
    }
}
