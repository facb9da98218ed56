//! Error types for NWP Fetcher
//!
//! This module defines error types for all components of the pipeline.
//! Errors are designed to be actionable: configuration problems fail before
//! any I/O, per-file transfer problems aggregate into batch reports, and
//! store-side inconsistencies are kept distinct from transient faults.

use std::path::PathBuf;
use thiserror::Error;

/// Scheduling and cycle-request errors
///
/// These correspond to malformed input and always fail before any I/O.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Unknown product name in config or CLI input
    #[error("Unknown product: {name}. Expected one of gfs, ecmwf-hres, ecmwf-ens")]
    UnknownProduct { name: String },

    /// Unknown source kind in config or CLI input
    #[error("Unknown source kind: {name}. Expected archive or realtime")]
    UnknownSourceKind { name: String },

    /// Cycle hour not admissible for the product
    #[error("{product} cycles run at {allowed:?} UTC, got {hour:02}z")]
    InvalidCycleHour {
        product: &'static str,
        hour: u32,
        allowed: &'static [u32],
    },

    /// Requested lead time exceeds the product ceiling
    #[error("{product} max lead time is {ceiling}h, got {requested}h")]
    LeadTimeOverCeiling {
        product: &'static str,
        requested: u32,
        ceiling: u32,
    },

    /// Lead time must be positive
    #[error("Max lead time must be greater than zero")]
    ZeroLeadTime,

    /// Resolution token is part of path construction and cannot be empty
    #[error("Resolution must be non-empty (e.g. '0p25')")]
    EmptyResolution,
}

/// Object store access errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Location string did not resolve to a (kind, bucket, key) triple
    #[error("Invalid store URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Underlying object store operation failed
    #[error("Object store operation failed")]
    Backend(#[from] object_store::Error),

    /// Local filesystem I/O failed
    #[error("File I/O error")]
    Io(#[from] std::io::Error),
}

/// Completeness validation errors
///
/// An incomplete cycle is fatal to the invocation but explicitly intended
/// for caller-driven retry; it carries the missing and available lead-time
/// sets for diagnostics.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Required files are missing upstream, or the sentinel has not landed
    #[error(
        "Cycle incomplete upstream: {} required lead times missing, sentinel_missing={sentinel_missing}",
        required.len()
    )]
    Incomplete {
        required: Vec<u32>,
        available: Vec<u32>,
        sentinel_missing: bool,
    },

    /// Probe failed against the source store
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-file transfer errors during fetch
#[derive(Error, Debug)]
pub enum TransferError {
    /// Source object does not exist
    #[error("Source object not found: {uri}")]
    SourceMissing { uri: String },

    /// Store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Publish engine errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// Chunk directory is empty or does not exist
    #[error("No chunk files found under {}", path.display())]
    EmptyChunkSet { path: PathBuf },

    /// No control file in the chunk directory
    #[error("No control file (consolidated metadata) found under {}", path.display())]
    ControlFileMissing { path: PathBuf },

    /// One or more data chunks exhausted retries; the control file was
    /// never uploaded, so the destination never appears complete
    #[error("{} chunk uploads failed after retries", failed.len())]
    ChunksFailed { failed: Vec<(String, String)> },

    /// The control file upload failed after all chunks landed
    #[error("Control file upload failed: {name}: {reason}")]
    ControlFailed { name: String, reason: String },

    /// Post-publish audit found destination objects missing after an
    /// apparently successful upload. Indicates store-side inconsistency,
    /// never silently retried.
    #[error("Publish verification failed: {} objects missing at destination", missing.len())]
    Integrity { missing: Vec<String> },

    /// Store operation failed outside the per-chunk retry loop
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local filesystem error while scanning the chunk set
    #[error("File I/O error")]
    Io(#[from] std::io::Error),
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Serialization failed when writing a sample config
    #[error("Failed to serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// No cycle given on the CLI, in $CYCLE, or in the config file
    #[error("Cycle not specified. Provide --cycle, set $CYCLE, or set it in the config file")]
    MissingCycle,
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Scheduling / cycle-request error
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// Object store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Completeness validation error
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Transfer error
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Publish error
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable by re-running the invocation later
    pub fn is_recoverable(&self) -> bool {
        match self {
            // A missing sentinel means the cycle is still producing
            AppError::Validation(ValidationError::Incomplete { .. })
            | AppError::Validation(ValidationError::Store(_))
            | AppError::Store(StoreError::Backend(_))
            | AppError::Transfer(_)
            | AppError::Publish(PublishError::ChunksFailed { .. })
            | AppError::Publish(PublishError::ControlFailed { .. }) => true,

            // Integrity gaps indicate store-side loss, not a transient fault
            AppError::Publish(PublishError::Integrity { .. })
            | AppError::Schedule(_)
            | AppError::Config(_) => false,

            _ => false,
        }
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Schedule(_) => "schedule",
            AppError::Store(_) => "store",
            AppError::Validation(_) => "validation",
            AppError::Transfer(_) => "transfer",
            AppError::Publish(_) => "publish",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Schedule result type alias
pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Validation result type alias
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Publish result type alias
pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = AppError::Schedule(ScheduleError::ZeroLeadTime);
        assert_eq!(err.category(), "schedule");
        assert!(!err.is_recoverable());

        let err = AppError::Validation(ValidationError::Incomplete {
            required: vec![3],
            available: vec![0, 1, 2],
            sentinel_missing: false,
        });
        assert_eq!(err.category(), "validation");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_integrity_is_fatal() {
        let err = AppError::Publish(PublishError::Integrity {
            missing: vec!["c/0/0".to_string()],
        });
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "publish");
    }
}
