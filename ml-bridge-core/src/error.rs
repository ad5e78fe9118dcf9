//! Error types for bridged ML data pipelines

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bridge operations
///
/// Every variant is raised synchronously at the stage or collation call that
/// detected it. Nothing is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Positional sample length does not match the number of field names
    #[error("Shape mismatch: expected {expected} positional fields, got {found}")]
    ShapeMismatch {
        /// Number of field names supplied
        expected: usize,
        /// Number of positional fields in the sample
        found: usize,
    },

    /// A field value cannot be interpreted by the conversion or collation
    #[error("Unsupported field type for '{field}': {kind}")]
    UnsupportedFieldType {
        /// Path of the offending field
        field: String,
        /// Description of the value that was found
        kind: String,
    },

    /// A sample in a batch exposes a different set of field names
    #[error("Field set mismatch at sample {index}: expected {expected:?}, got {found:?}")]
    FieldSetMismatch {
        /// Position of the offending sample in the batch
        index: usize,
        /// Field names of the first sample
        expected: Vec<String>,
        /// Field names of the offending sample
        found: Vec<String>,
    },

    /// Per-sample values of one field cannot be stacked together
    #[error("Cannot stack field '{field}': expected {expected}, got {found}")]
    StackShapeMismatch {
        /// Path of the offending field
        field: String,
        /// Shape family of the first sample's value
        expected: String,
        /// Shape family of the offending value
        found: String,
    },

    /// A stage received data in a layout or domain it does not accept
    #[error("Ordering violation: {0}")]
    OrderingViolation(String),

    /// A field name appears more than once
    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    /// Collation was asked to build a batch from zero samples
    #[error("Cannot collate an empty batch")]
    EmptyBatch,

    /// A pipeline stage failed
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        /// Name of the failing stage
        stage: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Data type mismatch
    #[error("Data type mismatch: {0}")]
    TypeMismatch(String),

    /// Index out of bounds
    #[error("Index out of bounds: {index} >= {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Length of the indexed collection
        len: usize,
    },
}

impl Error {
    /// Wrap this error with the name of the stage that produced it
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Error::StageFailed {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Strip any `StageFailed` wrappers and return the underlying error
    pub fn root(&self) -> &Error {
        match self {
            Error::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_unwraps_nested_stage_errors() {
        let err = Error::EmptyBatch.in_stage("inner").in_stage("outer");

        assert_eq!(err.root(), &Error::EmptyBatch);
        assert_eq!(
            err.to_string(),
            "Stage 'outer' failed: Stage 'inner' failed: Cannot collate an empty batch"
        );
    }

    #[test]
    fn shape_mismatch_message() {
        let err = Error::ShapeMismatch { expected: 2, found: 3 };
        assert_eq!(
            err.to_string(),
            "Shape mismatch: expected 2 positional fields, got 3"
        );
    }
}
