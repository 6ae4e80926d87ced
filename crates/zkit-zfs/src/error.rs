//! Error types for the dataset subsystem.

use thiserror::Error;
use zkit_nv::DecodeError;

use crate::ioctl::BoundaryError;

/// Result type alias for dataset operations.
pub type ZfsResult<T> = Result<T, ZfsError>;

/// Error variants for dataset operations.
#[derive(Debug, Error)]
pub enum ZfsError {
    /// A required argument was missing or empty.
    #[error("Missing argument: {argument}")]
    MissingArgument {
        /// Name of the missing argument.
        argument: &'static str,
    },

    /// An argument was present but unusable.
    #[error("Invalid argument {argument}: {reason}")]
    InvalidArgument {
        /// Name of the argument.
        argument: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A native reply could not be decoded.
    #[error("Decode error in {command}: {source}")]
    Decode {
        /// Command whose reply was malformed.
        command: String,
        /// Underlying codec error.
        source: DecodeError,
    },

    /// A decoded reply did not have the expected record shape.
    #[error("Malformed record field {field}: {reason}")]
    MalformedRecord {
        /// Field that failed to parse.
        field: String,
        /// Description of the mismatch.
        reason: String,
    },

    /// No dataset matched the requested name.
    #[error("Dataset not found: {name}")]
    NotFound {
        /// The dataset name.
        name: String,
    },

    /// A lookup expected exactly one dataset and got several.
    #[error("Expected 1 dataset for {name}, got {count}")]
    AmbiguousResult {
        /// The dataset name.
        name: String,
        /// Number of records returned.
        count: usize,
    },

    /// The property name is not part of the schema.
    #[error("Unknown property: {name}")]
    UnknownProperty {
        /// The requested property name.
        name: String,
    },

    /// The operation is reserved and not implemented.
    #[error("Not implemented: {feature}")]
    NotImplemented {
        /// The unimplemented feature.
        feature: &'static str,
    },

    /// The operation does not apply to this dataset.
    #[error("Invalid operation on {name}: {reason}")]
    InvalidOperation {
        /// The dataset name.
        name: String,
        /// Why the operation was refused.
        reason: &'static str,
    },

    /// The ioctl boundary reported a failure.
    #[error("{command} failed: {source}")]
    Boundary {
        /// Command that failed.
        command: String,
        /// Error reported by the boundary.
        source: BoundaryError,
    },

    /// The caller's deadline passed before the command was issued.
    #[error("Deadline exceeded before {command}")]
    DeadlineExceeded {
        /// Command that was not issued.
        command: String,
    },

    /// The caller cancelled before the command was issued.
    #[error("Cancelled before {command}")]
    Cancelled {
        /// Command that was not issued.
        command: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZfsError {
    /// Broad category of the error, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ZfsError::MissingArgument { .. } | ZfsError::InvalidArgument { .. } => "validation",
            ZfsError::Decode { .. } | ZfsError::MalformedRecord { .. } => "decode",
            ZfsError::NotFound { .. } => "not_found",
            ZfsError::AmbiguousResult { .. } => "ambiguous_result",
            ZfsError::UnknownProperty { .. } => "unknown_property",
            ZfsError::NotImplemented { .. } => "not_implemented",
            ZfsError::InvalidOperation { .. } => "invalid_operation",
            ZfsError::Boundary { .. } => "boundary",
            ZfsError::DeadlineExceeded { .. } | ZfsError::Cancelled { .. } => "aborted",
            ZfsError::Config { .. } => "config",
            ZfsError::Io(_) => "io",
        }
    }

    /// True when the dataset does not exist, whether reported by resolution
    /// or by the kernel. Concurrent destroys racing on a shared descendant
    /// surface this way.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ZfsError::NotFound { .. }
                | ZfsError::Boundary {
                    source: BoundaryError::NotFound,
                    ..
                }
        )
    }
}
