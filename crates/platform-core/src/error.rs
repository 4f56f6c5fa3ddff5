use thiserror::Error;

/// Top-level error type for the Platform console.
///
/// Subsystem crates define their own error types and wrap this one so that
/// configuration and I/O failures propagate with `?` across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlatformError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Audit sink error: {0}")]
    Audit(String),
}

impl From<toml::de::Error> for PlatformError {
    fn from(err: toml::de::Error) -> Self {
        PlatformError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PlatformError {
    fn from(err: toml::ser::Error) -> Self {
        PlatformError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
