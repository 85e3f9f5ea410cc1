//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
///
/// Business rejections (unknown account, not enough coins, ...) are separate
/// variants from storage failures so the boundary can map them without
/// looking at message text. See [`Error::kind`] and [`Error::is_rejection`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("Cannot transfer coins to yourself")]
    SelfTransfer,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    InvalidAmount,
    SelfTransfer,
    InvalidCredentials,
    Validation,
    Timeout,
    Cancelled,
    StorageFailure,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::SelfTransfer => "self_transfer",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::Validation => "validation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::Config => "config",
        }
    }

    /// Expected business outcome rather than an internal failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound
                | ErrorKind::InsufficientFunds
                | ErrorKind::InvalidAmount
                | ErrorKind::SelfTransfer
                | ErrorKind::InvalidCredentials
                | ErrorKind::Validation
        )
    }
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Error::SelfTransfer => ErrorKind::SelfTransfer,
            Error::InvalidCredentials => ErrorKind::InvalidCredentials,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Timeout => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
            Error::Storage(_) | Error::Io(_) | Error::Json(_) => ErrorKind::StorageFailure,
        }
    }

    /// True for expected business outcomes that should be reported to the
    /// caller as a rejection rather than an internal failure
    pub fn is_rejection(&self) -> bool {
        self.kind().is_rejection()
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output at the boundary)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            context: None,
        }
    }

    /// Create a successful result with context
    pub fn ok_with_context(data: T, context: HashMap<String, serde_json::Value>) -> Self {
        Self {
            context: Some(context),
            ..Self::ok(data)
        }
    }

    /// Create a failed result from a core error
    pub fn fail(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            context: None,
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(&e),
        }
    }
}
