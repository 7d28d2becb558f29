//! Error types for the flock-feed library.
//!
//! Search and duplicate matching never fail on expected conditions (empty
//! terms, malformed URLs, missing fields). Errors only come from building
//! components out of bad configuration or from reading input files.

use thiserror::Error;

/// Errors that can occur in the flock-feed application.
#[derive(Error, Debug)]
pub enum FlockError {
    /// A video URL pattern failed to compile
    #[error("Invalid video pattern '{name}': {source}")]
    InvalidPattern {
        /// Pattern name as given in configuration
        name: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// A video URL pattern compiled but has no `id` capture group
    #[error("Video pattern '{0}' must contain a capture group named 'id'")]
    MissingIdGroup(String),

    /// Stemmer language not supported
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Regex compilation errors outside of video patterns
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Convenience type alias for Result with FlockError
pub type Result<T> = std::result::Result<T, FlockError>;
