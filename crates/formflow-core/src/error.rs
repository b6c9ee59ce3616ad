use thiserror::Error;

/// Top-level error type for formflow.
///
/// Subsystem crates define their own error types and convert into this one
/// at crate boundaries so that the `?` operator works in the binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FormflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown form: {0}")]
    UnknownForm(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Consent registry error: {0}")]
    Consent(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Submission rejected: {0}")]
    Rejected(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}

impl From<toml::de::Error> for FormflowError {
    fn from(err: toml::de::Error) -> Self {
        FormflowError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FormflowError {
    fn from(err: toml::ser::Error) -> Self {
        FormflowError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FormflowError {
    fn from(err: serde_json::Error) -> Self {
        FormflowError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for formflow operations.
pub type Result<T> = std::result::Result<T, FormflowError>;
