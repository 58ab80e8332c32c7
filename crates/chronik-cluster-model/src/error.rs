use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ModelError::InvalidConfiguration(message.into())
    }

    /// Whether this error describes a problem in the user's resource that
    /// should be reported back verbatim rather than retried.
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, ModelError::InvalidConfiguration(_))
    }
}
