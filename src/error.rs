//! Error types for coin detection

use thiserror::Error;

/// Errors raised by the detection building blocks
#[derive(Debug, Error)]
pub enum CoinError {
    /// The input image has no pixels
    #[error("empty image: no pixels to process")]
    EmptyImage,

    /// A parameter is outside its valid range
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A step expected metadata written by an earlier step
    #[error("missing metadata '{key}' (is {step} placed after circle detection?)")]
    MissingMetadata { key: &'static str, step: &'static str },

    /// A template or reference folder could not be read
    #[error("cannot read template directory {path}: {source}")]
    TemplateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A font file could not be parsed
    #[error("invalid font file {0}")]
    FontLoad(std::path::PathBuf),
}

/// Result type for coin detection operations
pub type CoinResult<T> = Result<T, CoinError>;
