//! Shared error type across httpmeter crates.

use thiserror::Error;

/// Stable error codes, safe to print in logs and assert on in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Configuration failed to parse or validate.
    InvalidConfig,
    /// Configuration `version` is not supported.
    UnsupportedVersion,
    /// Filesystem or socket failure.
    Io,
    /// Anything else.
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Io => "IO",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeterError>;

/// Unified error type used by core, gateway and smoke.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("unsupported config version: {0}")]
    UnsupportedVersion(u32),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl MeterError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MeterError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            MeterError::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            MeterError::Io(_) => ErrorCode::Io,
            MeterError::Internal(_) => ErrorCode::Internal,
        }
    }
}
