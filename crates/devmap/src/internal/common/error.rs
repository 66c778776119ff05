use thiserror::Error;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum DevError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// Host or configuration mismatch that must stop the step before anything is written.
    #[error("Fatal configuration error: {0}")]
    FatalConfig(String),
    #[error("Cannot lock cgroup: {0}")]
    LockError(String),
    #[error("Cgroup error: {0}")]
    CgroupError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl DevError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DevError::FatalConfig(_))
    }
}

impl From<glob::PatternError> for DevError {
    fn from(e: glob::PatternError) -> Self {
        Self::FatalConfig(e.to_string())
    }
}
impl From<String> for DevError {
    fn from(e: String) -> Self {
        Self::GenericError(e)
    }
}
impl From<&str> for DevError {
    fn from(e: &str) -> Self {
        Self::GenericError(e.to_string())
    }
}

pub fn fatal<T>(message: String) -> crate::Result<T> {
    Err(DevError::FatalConfig(message))
}
