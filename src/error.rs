//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error taxonomy for the segmentation pipeline and its collaborators
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model or runtime unavailable, or the environment cannot host the model
    #[error("Initialization error: {0}")]
    Init(String),

    /// Fetched or cached model weights failed plausibility checks
    #[error("Corrupt model data: {0}")]
    CorruptModel(String),

    /// Inference attempted before the backend reached the ready state
    #[error("Backend '{0}' is not initialized")]
    NotInitialized(String),

    /// Runtime failure inside the numeric pipeline
    #[error("Inference error: {0}")]
    Inference(String),

    /// Input bytes are not a decodable image
    #[error("Decode error: {0}")]
    Decode(String),

    /// Output serialization failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// Network failures while fetching model weights
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A request was submitted while another one is still active
    #[error("Request rejected: {0}")]
    Busy(String),

    /// The request was overtaken by a reset or a newer request
    #[error("Request superseded by a newer request")]
    Superseded,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new initialization error
    pub fn init<S: Into<String>>(msg: S) -> Self {
        Self::Init(msg.into())
    }

    /// Create a new corrupt model error
    pub fn corrupt_model<S: Into<String>>(msg: S) -> Self {
        Self::CorruptModel(msg.into())
    }

    /// Create a new not-initialized error for the named backend
    pub fn not_initialized<S: Into<String>>(backend: S) -> Self {
        Self::NotInitialized(backend.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new busy error
    pub fn busy<S: Into<String>>(msg: S) -> Self {
        Self::Busy(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error with the underlying cause appended
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether this error came from acquiring or loading a model
    #[must_use]
    pub fn is_init_error(&self) -> bool {
        matches!(
            self,
            Self::Init(_) | Self::CorruptModel(_) | Self::Network(_)
        )
    }
}

impl From<image::ImageError> for BgRemovalError {
    fn from(error: image::ImageError) -> Self {
        match error {
            image::ImageError::Encoding(e) => Self::Encode(e.to_string()),
            image::ImageError::IoError(e) => Self::Io(e),
            other => Self::Decode(other.to_string()),
        }
    }
}
