use thiserror::Error;

use crate::common::error::GuardError::GenericError;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    DeviceError(#[from] devmap::Error),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl GuardError {
    /// The node is misconfigured; retrying the step will not help.
    pub fn is_fatal(&self) -> bool {
        match self {
            GuardError::DeviceError(error) => error.is_fatal(),
            GuardError::ConfigError(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::error::Error> for GuardError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::DeserializationError(e.to_string())
    }
}

impl From<toml::de::Error> for GuardError {
    fn from(error: toml::de::Error) -> Self {
        Self::ConfigError(error.to_string())
    }
}

pub fn error<T>(message: String) -> crate::Result<T> {
    Err(GenericError(message))
}

impl From<String> for GuardError {
    fn from(e: String) -> Self {
        GenericError(e)
    }
}
