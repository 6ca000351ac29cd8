//! Error types for tensor bucketing operations

use thiserror::Error;

use crate::tensor::TensorType;

/// Main error type for bucketing operations
#[derive(Error, Debug)]
pub enum Error {
    /// A sequence that must be homogeneous holds more than one tensor type
    #[error("Tensor type mismatch ({context}): expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the operation was committed to
        expected: TensorType,
        /// Type of the offending tensor
        found: TensorType,
        /// Where the offending tensor was found, e.g. "input 3"
        context: String,
    },

    /// Flat buffer element count disagrees with the target tensors
    #[error("Element count mismatch: expected {expected} elements, found {found}")]
    CountMismatch {
        /// Element count required by the target tensors
        expected: usize,
        /// Element count actually available
        found: usize,
    },

    /// Shape or layout is incompatible with the requested operation
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A sparse tensor was given where a dense one was expected, or vice versa
    #[error("Density mismatch: {0}")]
    DensityMismatch(String),

    /// The reference ordering asked for more tensors of a type than were supplied
    #[error("Reorder exhausted: no tensor of type {tensor_type} left for reference position {position}")]
    ReorderExhausted {
        /// Type that ran out
        tensor_type: TensorType,
        /// Position in the reference sequence
        position: usize,
    },

    /// Operation needs at least one tensor
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mailbox was closed by one side of the hand-off
    #[error("Mailbox closed")]
    Closed,

    /// Tensor operation error
    #[error("Tensor operation error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SafeTensors header error
    #[error("SafeTensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),
}

/// Result type alias for bucketing operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Create a density mismatch error
    pub fn density_mismatch(msg: impl Into<String>) -> Self {
        Self::DensityMismatch(msg.into())
    }

    /// Create an empty input error
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }
}
