//! Error types shared across the crate.
//!
//! Device-level errors are usually captured into the recorded data rather
//! than returned. Sequencing, connection and persistence errors are returned
//! to the caller.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by an arm or camera driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("failed to connect to {address}: {reason}")]
    Connection { address: String, reason: String },

    /// Non-zero driver status, surfaced verbatim.
    #[error("{op} failed with driver error code {code}")]
    Driver { op: String, code: i32 },

    #[error("device {0} is not connected")]
    Disconnected(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("device I/O error: {0}")]
    Io(String),
}

impl DeviceError {
    pub fn driver(op: impl Into<String>, code: i32) -> Self {
        Self::Driver {
            op: op.into(),
            code,
        }
    }

    /// The driver status code, if the controller reported one
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors raised while persisting episodes and dataset metadata.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The columnar writer cannot be used; callers fall back to JSON.
    #[error("columnar writer unavailable: {0}")]
    WriterUnavailable(String),

    #[error("column {column} mixes scalar and vector values")]
    InconsistentColumn { column: String },

    #[error("columnar encoding error: {0}")]
    Columnar(String),

    #[error("missing column: {0}")]
    MissingColumn(String),
}

#[cfg(feature = "parquet")]
impl From<arrow::error::ArrowError> for StoreError {
    fn from(error: arrow::error::ArrowError) -> Self {
        StoreError::Columnar(error.to_string())
    }
}

#[cfg(feature = "parquet")]
impl From<parquet::errors::ParquetError> for StoreError {
    fn from(error: parquet::errors::ParquetError) -> Self {
        StoreError::Columnar(error.to_string())
    }
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors returned by the recorders and the recording loop.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Caller sequencing error (no open episode, finalize twice, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connection failed: {0}")]
    Connection(#[source] DeviceError),

    #[error("device error: {0}")]
    Device(#[source] DeviceError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("recording loop did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("recording loop panicked: {0}")]
    LoopPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecorderError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

pub type RecorderResult<T> = Result<T, RecorderError>;
pub type StoreResult<T> = Result<T, StoreError>;
