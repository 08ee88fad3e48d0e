//! Error types for lumi list construction

use thiserror::Error;

/// Result type for lumi list operations
pub type Result<T> = std::result::Result<T, LumiError>;

/// Errors raised while building a [`crate::LumiList`]
#[derive(Error, Debug)]
pub enum LumiError {
    /// Interval whose start is after its end
    #[error("Invalid lumi range [{start}, {end}] in run {run}")]
    InvalidRange { run: u32, start: u32, end: u32 },

    /// Lumi section zero is not a valid lumi number
    #[error("Lumi 0 is not valid (run {run})")]
    ZeroLumi { run: u32 },

    /// Parallel arrays of different lengths
    #[error("Length mismatch: {runs} runs but {lumis} lumi entries")]
    LengthMismatch { runs: usize, lumis: usize },

    /// A lumi range string could not be parsed
    #[error("Malformed lumi range string '{0}'")]
    MalformedRange(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
