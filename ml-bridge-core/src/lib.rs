//! Core data model for bridged ML data pipelines
//!
//! This crate defines the values that flow between array-domain and
//! tensor-domain stages: samples in positional or named form, batches of
//! collated samples, `ndarray`-backed arrays, dense tensors, the
//! [`TransformStage`] trait with its ordering contracts, and the error
//! taxonomy shared by every crate in the workspace.

#![warn(missing_docs)]

pub mod array;
pub mod batch;
pub mod dtype;
pub mod error;
pub mod sample;
pub mod stage;
pub mod tensor;
pub mod value;

// Re-export key types for convenience
pub use array::ArrayValue;
pub use batch::Batch;
pub use dtype::{DType, FloatWidth};
pub use error::{Error, Result};
pub use sample::{Layout, Sample};
pub use stage::{Domain, PipelineState, StageContract, TransformStage};
pub use tensor::{Tensor, TensorData, TensorType};
pub use value::{FieldMap, FieldValue, OpaqueValue};
