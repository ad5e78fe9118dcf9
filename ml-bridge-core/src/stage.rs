//! Transform stage trait and ordering contracts

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::sample::{Layout, Sample};

/// Numeric representation a sample is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Numeric fields are `ndarray` arrays
    Array,

    /// Numeric fields are tensors
    Tensor,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Array => f.write_str("array"),
            Domain::Tensor => f.write_str("tensor"),
        }
    }
}

/// Layout and domain of the data at one point of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    /// Sample layout
    pub layout: Layout,

    /// Numeric domain
    pub domain: Domain,
}

impl PipelineState {
    /// State of raw dataset output: positional arrays
    pub fn dataset_output() -> Self {
        Self {
            layout: Layout::Sequence,
            domain: Domain::Array,
        }
    }

    /// State of a mapping sample in the given domain
    pub fn mapping(domain: Domain) -> Self {
        Self {
            layout: Layout::Mapping,
            domain,
        }
    }
}

/// What a stage accepts and what it emits
///
/// `None` on the input side means "any"; on the output side it means
/// "unchanged".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageContract {
    /// Layout the stage requires
    pub input_layout: Option<Layout>,

    /// Domain the stage requires
    pub input_domain: Option<Domain>,

    /// Layout the stage produces
    pub output_layout: Option<Layout>,

    /// Domain the stage produces
    pub output_domain: Option<Domain>,
}

impl StageContract {
    /// Accepts anything, changes nothing structural
    pub fn any() -> Self {
        Self::default()
    }

    /// Mapping samples with array-typed fields
    pub fn array_domain() -> Self {
        Self {
            input_layout: Some(Layout::Mapping),
            input_domain: Some(Domain::Array),
            ..Self::default()
        }
    }

    /// Mapping samples with tensor-typed fields
    pub fn tensor_domain() -> Self {
        Self {
            input_layout: Some(Layout::Mapping),
            input_domain: Some(Domain::Tensor),
            ..Self::default()
        }
    }

    /// Shape adapter: positional in, named out
    pub fn shape_adapter() -> Self {
        Self {
            output_layout: Some(Layout::Mapping),
            ..Self::default()
        }
    }

    /// Type adapter: named arrays in, named tensors out
    pub fn type_adapter() -> Self {
        Self {
            input_layout: Some(Layout::Mapping),
            output_domain: Some(Domain::Tensor),
            ..Self::default()
        }
    }

    /// Check that this contract accepts `state` and return the state after it
    pub fn check(&self, stage: &str, state: PipelineState) -> Result<PipelineState> {
        if self.input_layout == Some(Layout::Mapping) && state.layout != Layout::Mapping {
            return Err(Error::OrderingViolation(format!(
                "stage '{stage}' requires mapping input but receives sequences; \
                 place a sequence-to-mapping stage before it"
            )));
        }

        if let Some(required) = self.input_domain {
            if required != state.domain {
                let hint = match required {
                    Domain::Array => "array-domain stages must run before the array-to-tensor stage",
                    Domain::Tensor => "place an array-to-tensor stage before it",
                };
                return Err(Error::OrderingViolation(format!(
                    "stage '{stage}' requires {required} input but receives {}; {hint}",
                    state.domain
                )));
            }
        }

        Ok(PipelineState {
            layout: self.output_layout.unwrap_or(state.layout),
            domain: self.output_domain.unwrap_or(state.domain),
        })
    }
}

/// One step of an augmentation pipeline
///
/// Stages take the sample by value and hand back the transformed sample, so
/// exactly one stage owns the data at a time. Loaders call `apply` from
/// several worker threads at once.
pub trait TransformStage: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Layout and domain requirements of this stage
    fn contract(&self) -> StageContract;

    /// Transform one sample (or one batch viewed as a sample)
    fn apply(&self, sample: Sample) -> Result<Sample>;

    /// State after this stage runs on input in `state`
    ///
    /// Composite stages override this to check each of their parts in turn.
    fn validate(&self, state: PipelineState) -> Result<PipelineState> {
        self.contract().check(self.name(), state)
    }
}

impl<T: TransformStage + ?Sized> TransformStage for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn contract(&self) -> StageContract {
        (**self).contract()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        (**self).apply(sample)
    }

    fn validate(&self, state: PipelineState) -> Result<PipelineState> {
        (**self).validate(state)
    }
}

impl<T: TransformStage + ?Sized> TransformStage for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn contract(&self) -> StageContract {
        (**self).contract()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        (**self).apply(sample)
    }

    fn validate(&self, state: PipelineState) -> Result<PipelineState> {
        (**self).validate(state)
    }
}

static_assertions::assert_obj_safe!(TransformStage);
