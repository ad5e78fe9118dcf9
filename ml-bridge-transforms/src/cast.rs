//! Recursive tensor casting
//!
//! Walks tensors, lists and maps and converts every tensor it reaches to a
//! target element type. Everything else is returned as it was.

use std::collections::BTreeSet;

use ml_bridge_core::{
    DType, FieldValue, Result, Sample, StageContract, Tensor, TransformStage,
};

/// Cast every tensor reachable from `value` to `dtype`
pub fn cast_tensors(value: FieldValue, dtype: DType) -> FieldValue {
    match value {
        FieldValue::Tensor(tensor) => FieldValue::Tensor(cast_tensor(tensor, dtype)),
        FieldValue::List(items) => {
            FieldValue::List(items.into_iter().map(|v| cast_tensors(v, dtype)).collect())
        }
        FieldValue::Map(map) => FieldValue::Map(
            map.into_iter()
                .map(|(k, v)| (k, cast_tensors(v, dtype)))
                .collect(),
        ),
        other => other,
    }
}

fn cast_tensor(tensor: Tensor, dtype: DType) -> Tensor {
    if tensor.dtype() == dtype {
        tensor
    } else {
        tensor.cast(dtype)
    }
}

/// Tensor-domain stage casting tensors to one element type
#[derive(Debug, Clone)]
pub struct CastTensors {
    dtype: DType,
    fields: Option<BTreeSet<String>>,
}

impl CastTensors {
    /// Cast every tensor in the sample
    pub fn new(dtype: DType) -> Self {
        Self { dtype, fields: None }
    }

    /// Restrict the cast to the named top-level fields
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Target element type
    pub fn dtype(&self) -> DType {
        self.dtype
    }
}

impl TransformStage for CastTensors {
    fn name(&self) -> &str {
        "cast_tensors"
    }

    fn contract(&self) -> StageContract {
        StageContract::tensor_domain()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let fields = sample.into_mapping()?;
        let cast = fields
            .into_iter()
            .map(|(name, value)| {
                let selected = self
                    .fields
                    .as_ref()
                    .map_or(true, |fields| fields.contains(&name));
                if selected {
                    (name, cast_tensors(value, self.dtype))
                } else {
                    (name, value)
                }
            })
            .collect();
        Ok(Sample::Mapping(cast))
    }
}
