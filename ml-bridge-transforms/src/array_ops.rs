//! Generic array-domain stages
//!
//! These stand in for an external array-oriented augmentation library: they
//! expect named samples (or batches) whose numeric fields are still arrays.

use std::fmt;

use ml_bridge_core::{
    ArrayValue, Error, FieldMap, FieldValue, Result, Sample, StageContract, TransformStage,
};

type ArrayFn = dyn Fn(ArrayValue) -> Result<ArrayValue> + Send + Sync;

/// Take the named array out of `fields`, failing if it is missing or not an array
fn take_array(fields: &mut FieldMap, field: &str) -> Result<ArrayValue> {
    match fields.remove(field) {
        Some(FieldValue::Array(array)) => Ok(array),
        Some(other) => Err(Error::UnsupportedFieldType {
            field: field.to_string(),
            kind: format!("{} where an array was expected", other.describe()),
        }),
        None => Err(Error::InvalidArgument(format!("sample has no field '{field}'"))),
    }
}

/// Apply a closure to one array field
pub struct MapArrays {
    name: String,
    field: String,
    func: Box<ArrayFn>,
}

impl MapArrays {
    /// Create a stage named `name` that rewrites `field` with `func`
    pub fn new<F>(name: impl Into<String>, field: impl Into<String>, func: F) -> Self
    where
        F: Fn(ArrayValue) -> Result<ArrayValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            field: field.into(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for MapArrays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapArrays")
            .field("name", &self.name)
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl TransformStage for MapArrays {
    fn name(&self) -> &str {
        &self.name
    }

    fn contract(&self) -> StageContract {
        StageContract::array_domain()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let mut fields = sample.into_mapping()?;
        let array = take_array(&mut fields, &self.field)?;
        fields.insert(self.field.clone(), FieldValue::Array((self.func)(array)?));
        Ok(Sample::Mapping(fields))
    }
}

/// Normalize an array field to `(x - mean) / std`, producing `f32`
#[derive(Debug, Clone)]
pub struct NormalizeArray {
    field: String,
    mean: f32,
    std: f32,
}

impl NormalizeArray {
    /// Standardize with the given mean and standard deviation
    pub fn new(field: impl Into<String>, mean: f32, std: f32) -> Self {
        Self {
            field: field.into(),
            mean,
            std,
        }
    }

    /// Divide by `scale`, e.g. `255.0` for 8-bit images
    pub fn scale(field: impl Into<String>, scale: f32) -> Self {
        Self::new(field, 0.0, scale)
    }
}

impl TransformStage for NormalizeArray {
    fn name(&self) -> &str {
        "normalize_array"
    }

    fn contract(&self) -> StageContract {
        StageContract::array_domain()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        if self.std == 0.0 {
            return Err(Error::InvalidArgument(
                "normalization std must be non-zero".into(),
            ));
        }
        let mut fields = sample.into_mapping()?;
        let array = take_array(&mut fields, &self.field)?;
        let normalized = array.to_f32().mapv(|x| (x - self.mean) / self.std);
        fields.insert(self.field.clone(), FieldValue::Array(ArrayValue::Float32(normalized)));
        Ok(Sample::Mapping(fields))
    }
}

/// Insert a length-one axis into an array field, e.g. `[28, 28]` to `[1, 28, 28]`
#[derive(Debug, Clone)]
pub struct AddChannelAxis {
    field: String,
    axis: usize,
}

impl AddChannelAxis {
    /// Insert the axis at position `axis`
    pub fn new(field: impl Into<String>, axis: usize) -> Self {
        Self {
            field: field.into(),
            axis,
        }
    }
}

impl TransformStage for AddChannelAxis {
    fn name(&self) -> &str {
        "add_channel_axis"
    }

    fn contract(&self) -> StageContract {
        StageContract::array_domain()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let mut fields = sample.into_mapping()?;
        let array = take_array(&mut fields, &self.field)?;
        fields.insert(self.field.clone(), FieldValue::Array(array.insert_axis(self.axis)?));
        Ok(Sample::Mapping(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_bridge_core::{DType, Tensor};
    use ndarray::{ArrayD, IxDyn};

    fn sample() -> Sample {
        Sample::from_pairs([
            ("data", FieldValue::from(ArrayD::<u8>::from_elem(IxDyn(&[28, 28]), 51))),
            ("label", FieldValue::Int(1)),
        ])
        .unwrap()
    }

    #[test]
    fn normalize_scales_to_unit_range() {
        let out = NormalizeArray::scale("data", 255.0).apply(sample()).unwrap();
        let data = out.get("data").and_then(FieldValue::as_array).unwrap();

        assert_eq!(data.dtype(), DType::Float32);
        assert!(data.to_f64_vec().iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn normalize_rejects_zero_std() {
        assert!(NormalizeArray::new("data", 0.0, 0.0).apply(sample()).is_err());
    }

    #[test]
    fn add_channel_axis_prepends_dimension() {
        let out = AddChannelAxis::new("data", 0).apply(sample()).unwrap();
        assert_eq!(out.get("data").and_then(FieldValue::as_array).unwrap().shape(), &[1, 28, 28]);
    }

    #[test]
    fn map_arrays_runs_closure() {
        let flip = MapArrays::new("invert", "data", |array| match array {
            ArrayValue::UInt8(a) => Ok(ArrayValue::UInt8(a.mapv(|x| 255 - x))),
            other => Ok(other),
        });

        let out = flip.apply(sample()).unwrap();
        let data = out.get("data").and_then(FieldValue::as_array).unwrap();
        assert_eq!(data.to_f64_vec()[0], 204.0);
        assert_eq!(flip.name(), "invert");
    }

    #[test]
    fn tensor_fields_are_not_arrays() {
        let sample = Sample::from_pairs([(
            "data",
            FieldValue::from(Tensor::from_vec(vec![1u8], vec![1]).unwrap()),
        )])
        .unwrap();

        let err = NormalizeArray::scale("data", 2.0).apply(sample).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFieldType { .. }));
    }

    #[test]
    fn missing_field_is_reported() {
        let err = AddChannelAxis::new("image", 0).apply(sample()).unwrap_err();
        assert!(err.to_string().contains("no field 'image'"));
    }
}
