//! Pipeline stages that bridge array-domain and tensor-domain augmentation
//!
//! The adapters in [`adapters`] name positional samples and convert arrays to
//! tensors, [`collate`] turns samples into batches under a named strategy,
//! and [`pipeline`] chains stages while checking that every stage sees the
//! layout and domain it declares.

#![warn(missing_docs)]

pub mod adapters;
pub mod array_ops;
pub mod cast;
pub mod collate;
pub mod parameter;
pub mod pipeline;
pub mod tensor_ops;

pub use adapters::{ArrayToTensor, SequenceToMapping};
pub use array_ops::{AddChannelAxis, MapArrays, NormalizeArray};
pub use cast::{cast_tensors, CastTensors};
pub use collate::{ArrayCollate, CollationStrategy, Collator, TensorCollate};
pub use parameter::{
    ConstantParameter, DiscreteParameter, NormalParameter, Parameter, UniformParameter,
};
pub use pipeline::{BridgePlan, Pipeline, PipelineBuilder};
pub use tensor_ops::{
    box_to_seg, box_to_seg_into, instance_to_semantic, seg_to_box, InstanceToSemantic,
    RandomScaleIntensity,
};

// Re-export core types
pub use ml_bridge_core::{
    Batch, Domain, Error, FieldMap, FieldValue, Layout, PipelineState, Result, Sample,
    StageContract, TransformStage,
};

static_assertions::assert_impl_all!(SequenceToMapping: Send, Sync);
static_assertions::assert_impl_all!(ArrayToTensor: Send, Sync);
static_assertions::assert_impl_all!(BridgePlan: Send, Sync);
