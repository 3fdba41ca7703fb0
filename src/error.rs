// error.rs
// Error types for the community boundary pipeline

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Recoverable conditions (similarity fallback, empty years) are
/// reported as values, see [`crate::pipeline::Warning`] and
/// [`crate::pipeline::PipelineOutcome::Skipped`].
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter (k = 0, bad threshold, no feature columns)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Input data breaks the feature matrix contract
    #[error("Data contract violation: {0}")]
    DataContract(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::Configuration("knn_k must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: knn_k must be at least 1"
        );
    }
}
