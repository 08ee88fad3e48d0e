//! Error types for performance estimation

use thiserror::Error;

/// Result type for curve fetching and estimation
pub type Result<T> = std::result::Result<T, PerfError>;

#[derive(Error, Debug)]
pub enum PerfError {
    /// The curve service could not be reached or answered with an error
    #[error("Curve service error: {0}")]
    Service(String),

    /// No endpoint configured for the requested curve
    #[error("No {0} endpoint configured")]
    NotConfigured(&'static str),

    /// The service answered, but the payload is unusable
    #[error("Invalid curve data: {0}")]
    InvalidCurve(String),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for PerfError {
    fn from(err: reqwest::Error) -> Self {
        PerfError::Service(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_configured_display() {
        let err = PerfError::NotConfigured("luminosity");
        assert_eq!(err.to_string(), "No luminosity endpoint configured");
    }
}
