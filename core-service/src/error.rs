use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),
}

impl CoreError {
    /// The cache error behind this one, if any.
    pub fn as_cache_error(&self) -> Option<&core_cache::CacheError> {
        match self {
            CoreError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
