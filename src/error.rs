/*!
 * Error types for lumisplit
 */

use lumisplit_core_lumi::LumiError;
use lumisplit_core_perf::PerfError;
use std::fmt;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SplitError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Error, Debug)]
pub enum SplitError {
    /// Invalid splitting configuration; nothing was produced
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed run/lumi data in a mask or input file
    #[error("Invalid lumi mask: {0}")]
    Mask(#[from] LumiError),

    /// The recovery mask for a fileset could not be obtained
    #[error("Recovery mask unavailable for collection '{collection}', fileset '{fileset}': {reason}")]
    RecoveryMask {
        collection: String,
        fileset: String,
        reason: String,
    },

    /// Performance data error
    #[error("Performance data error: {0}")]
    Perf(#[from] PerfError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl SplitError {
    pub fn config(message: impl Into<String>) -> Self {
        SplitError::Config(message.into())
    }

    pub fn recovery_mask(
        collection: impl Into<String>,
        fileset: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        SplitError::RecoveryMask {
            collection: collection.into(),
            fileset: fileset.into(),
            reason: reason.to_string(),
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EXIT_FATAL
        } else {
            EXIT_PARTIAL
        }
    }

    /// Fatal errors fail the whole call; retrying with the same input cannot help
    pub fn is_fatal(&self) -> bool {
        match self {
            SplitError::Config(_) => true,
            SplitError::Mask(_) => true,
            SplitError::TomlParse(_) => true,
            SplitError::TomlSerialize(_) => true,
            SplitError::Json(_) => true,

            // The recovery service may come back on a later pass
            SplitError::RecoveryMask { .. } => false,
            SplitError::Perf(_) => false,
            SplitError::Io(_) => false,
        }
    }

    /// Whether this error only aborts the current fileset's pass
    pub fn aborts_fileset(&self) -> bool {
        matches!(self, SplitError::RecoveryMask { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            SplitError::Config(_) | SplitError::TomlParse(_) | SplitError::TomlSerialize(_) => {
                ErrorCategory::Configuration
            }
            SplitError::Mask(_) => ErrorCategory::Validation,
            SplitError::RecoveryMask { .. } => ErrorCategory::Recovery,
            SplitError::Perf(_) => ErrorCategory::Performance,
            SplitError::Io(_) => ErrorCategory::IoError,
            SplitError::Json(_) => ErrorCategory::Codec,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad configuration
    Configuration,
    /// Malformed run/lumi data
    Validation,
    /// Recovery mask provider failures
    Recovery,
    /// Curve service failures
    Performance,
    /// I/O operation errors
    IoError,
    /// Serialization errors
    Codec,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Recovery => write!(f, "recovery"),
            ErrorCategory::Performance => write!(f, "performance"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Codec => write!(f, "codec"),
        }
    }
}
