//! Collation strategies: turning a list of samples into one batch
//!
//! Both strategies share the same structural rules. Every sample must be a
//! mapping with the same field names; values of one field are stacked along a
//! new leading axis. They differ only in the numeric representation they
//! stack: [`ArrayCollate`] builds arrays and runs while array-domain stages
//! are still ahead, [`TensorCollate`] builds tensors once everything before
//! collation emits tensors. Which one a loader uses is chosen by
//! [`CollationStrategy`] in its configuration.

use std::collections::BTreeSet;
use std::mem::discriminant;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ml_bridge_core::{
    ArrayValue, Batch, Domain, Error, FieldMap, FieldValue, Result, Sample, Tensor,
};

/// Named collation strategy selected by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollationStrategy {
    /// Stack into arrays
    #[default]
    ArrayCollate,

    /// Stack into tensors
    TensorCollate,
}

impl CollationStrategy {
    /// Domain of the batches this strategy produces
    pub fn output_domain(self) -> Domain {
        match self {
            CollationStrategy::ArrayCollate => Domain::Array,
            CollationStrategy::TensorCollate => Domain::Tensor,
        }
    }
}

/// Stacks samples into array-typed batches
#[derive(Debug, Clone, Default)]
pub struct ArrayCollate {
    widen: BTreeSet<String>,
}

impl ArrayCollate {
    /// Create a collator that preserves every element type
    pub fn new() -> Self {
        Self::default()
    }

    /// Widen the named fields (integers to `i64`, floats to `f64`)
    #[must_use]
    pub fn with_widened<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.widen.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Collate `samples` into one batch
    pub fn collate(&self, samples: Vec<Sample>) -> Result<Batch> {
        collate_samples(samples, Domain::Array, &self.widen)
    }
}

/// Stacks samples into tensor-typed batches
#[derive(Debug, Clone, Default)]
pub struct TensorCollate {
    widen: BTreeSet<String>,
}

impl TensorCollate {
    /// Create a collator that preserves every element type
    pub fn new() -> Self {
        Self::default()
    }

    /// Widen the named fields (integers to `i64`, floats to `f64`)
    #[must_use]
    pub fn with_widened<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.widen.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Collate `samples` into one batch
    pub fn collate(&self, samples: Vec<Sample>) -> Result<Batch> {
        collate_samples(samples, Domain::Tensor, &self.widen)
    }
}

/// A configured collation function
#[derive(Debug, Clone)]
pub enum Collator {
    /// Array stacking
    Array(ArrayCollate),

    /// Tensor stacking
    Tensor(TensorCollate),
}

impl Collator {
    /// Build the collator for `strategy`, widening the given fields
    pub fn from_strategy(strategy: CollationStrategy, widen: &[String]) -> Self {
        match strategy {
            CollationStrategy::ArrayCollate => {
                Collator::Array(ArrayCollate::new().with_widened(widen.iter().cloned()))
            }
            CollationStrategy::TensorCollate => {
                Collator::Tensor(TensorCollate::new().with_widened(widen.iter().cloned()))
            }
        }
    }

    /// Strategy this collator implements
    pub fn strategy(&self) -> CollationStrategy {
        match self {
            Collator::Array(_) => CollationStrategy::ArrayCollate,
            Collator::Tensor(_) => CollationStrategy::TensorCollate,
        }
    }

    /// Collate `samples` into one batch
    pub fn collate(&self, samples: Vec<Sample>) -> Result<Batch> {
        match self {
            Collator::Array(c) => c.collate(samples),
            Collator::Tensor(c) => c.collate(samples),
        }
    }
}

impl From<ArrayCollate> for Collator {
    fn from(collate: ArrayCollate) -> Self {
        Collator::Array(collate)
    }
}

impl From<TensorCollate> for Collator {
    fn from(collate: TensorCollate) -> Self {
        Collator::Tensor(collate)
    }
}

fn collate_samples(samples: Vec<Sample>, domain: Domain, widen: &BTreeSet<String>) -> Result<Batch> {
    let size = samples.len();
    let maps = samples
        .into_iter()
        .map(Sample::into_mapping)
        .collect::<Result<Vec<_>>>()?;

    let fields = collate_maps(None, maps, domain, widen)?;
    debug!(samples = size, fields = fields.len(), %domain, "collated batch");
    Ok(Batch::new(fields, size))
}

fn collate_maps(
    prefix: Option<&str>,
    maps: Vec<FieldMap>,
    domain: Domain,
    widen: &BTreeSet<String>,
) -> Result<FieldMap> {
    let first = maps.first().ok_or(Error::EmptyBatch)?;
    let expected: Vec<String> = first.keys().cloned().collect();

    for (index, map) in maps.iter().enumerate().skip(1) {
        if !map.keys().eq(expected.iter()) {
            return Err(Error::FieldSetMismatch {
                index,
                expected,
                found: map.keys().cloned().collect(),
            });
        }
    }

    // Key sets are identical, so every map yields its fields in the same order.
    let mut columns: Vec<Vec<FieldValue>> = expected
        .iter()
        .map(|_| Vec::with_capacity(maps.len()))
        .collect();
    for map in maps {
        for (column, (_, value)) in columns.iter_mut().zip(map) {
            column.push(value);
        }
    }

    expected
        .into_iter()
        .zip(columns)
        .map(|(name, values)| {
            let path = match prefix {
                Some(prefix) => format!("{prefix}.{name}"),
                None => name.clone(),
            };
            let stacked = stack_values(&path, values, domain, widen)?;
            Ok((name, stacked))
        })
        .collect()
}

fn same_family(a: &FieldValue, b: &FieldValue) -> bool {
    if discriminant(a) != discriminant(b) {
        return false;
    }
    match (a, b) {
        (FieldValue::Array(x), FieldValue::Array(y)) => {
            x.dtype() == y.dtype() && x.shape() == y.shape()
        }
        (FieldValue::Tensor(x), FieldValue::Tensor(y)) => {
            x.dtype() == y.dtype() && x.shape() == y.shape()
        }
        (FieldValue::List(x), FieldValue::List(y)) => x.len() == y.len(),
        _ => true,
    }
}

fn unsupported(path: &str, value: &FieldValue, domain: Domain) -> Error {
    Error::UnsupportedFieldType {
        field: path.to_string(),
        kind: format!("{} cannot be stacked by {domain} collation", value.describe()),
    }
}

#[allow(clippy::needless_pass_by_value)]
fn stack_values(
    path: &str,
    values: Vec<FieldValue>,
    domain: Domain,
    widen: &BTreeSet<String>,
) -> Result<FieldValue> {
    let first = values.first().ok_or(Error::EmptyBatch)?;
    if let Some(other) = values.iter().find(|v| !same_family(first, v)) {
        return Err(Error::StackShapeMismatch {
            field: path.to_string(),
            expected: first.describe(),
            found: other.describe(),
        });
    }
    let widened = widen.contains(path);
    let count = values.len();

    match first {
        FieldValue::Array(_) if domain == Domain::Array => {
            let arrays: Vec<&ArrayValue> = values.iter().filter_map(FieldValue::as_array).collect();
            let stacked = ArrayValue::stack(&arrays)?;
            Ok(FieldValue::Array(if widened { stacked.widened() } else { stacked }))
        }
        FieldValue::Tensor(_) if domain == Domain::Tensor => {
            let tensors: Vec<&Tensor> = values.iter().filter_map(FieldValue::as_tensor).collect();
            let stacked = Tensor::stack(&tensors)?;
            Ok(FieldValue::Tensor(if widened {
                stacked.cast(stacked.dtype().widened())
            } else {
                stacked
            }))
        }
        FieldValue::Int(_) => {
            let ints: Vec<i64> = values.iter().filter_map(FieldValue::as_int).collect();
            scalar_column(domain, ints, count)
        }
        FieldValue::Float(_) => {
            let floats: Vec<f64> = values
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Float(x) => Some(*x),
                    _ => None,
                })
                .collect();
            scalar_column(domain, floats, count)
        }
        FieldValue::Bool(_) => {
            let bools: Vec<bool> = values
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Bool(x) => Some(*x),
                    _ => None,
                })
                .collect();
            match domain {
                Domain::Array => {
                    let array = ArrayD::from_shape_vec(IxDyn(&[count]), bools)
                        .map_err(|e| Error::InvalidArgument(e.to_string()))?;
                    Ok(FieldValue::Array(ArrayValue::Bool(array)))
                }
                Domain::Tensor => Ok(FieldValue::Tensor(Tensor::from_bools(bools, vec![count])?)),
            }
        }
        FieldValue::Text(_) => Ok(FieldValue::List(values)),
        FieldValue::List(items) => {
            let width = items.len();
            let mut columns: Vec<Vec<FieldValue>> =
                (0..width).map(|_| Vec::with_capacity(count)).collect();
            for value in values {
                if let FieldValue::List(items) = value {
                    for (column, item) in columns.iter_mut().zip(items) {
                        column.push(item);
                    }
                }
            }
            columns
                .into_iter()
                .enumerate()
                .map(|(i, column)| stack_values(&format!("{path}[{i}]"), column, domain, widen))
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::List)
        }
        FieldValue::Map(_) => {
            let maps = values
                .into_iter()
                .filter_map(|v| match v {
                    FieldValue::Map(map) => Some(map),
                    _ => None,
                })
                .collect();
            collate_maps(Some(path), maps, domain, widen).map(FieldValue::Map)
        }
        FieldValue::Array(_) | FieldValue::Tensor(_) | FieldValue::Opaque(_) => {
            Err(unsupported(path, first, domain))
        }
    }
}

/// Stack numeric scalars into a 1-D array or tensor of length `count`
fn scalar_column<T>(domain: Domain, values: Vec<T>, count: usize) -> Result<FieldValue>
where
    T: ml_bridge_core::TensorType,
    ArrayValue: From<ArrayD<T>>,
{
    match domain {
        Domain::Array => {
            let array = ArrayD::from_shape_vec(IxDyn(&[count]), values)
                .map_err(|e| Error::InvalidArgument(e.to_string()))?;
            Ok(FieldValue::Array(ArrayValue::from(array)))
        }
        Domain::Tensor => Ok(FieldValue::Tensor(Tensor::from_vec(values, vec![count])?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_bridge_core::{DType, OpaqueValue};
    use proptest::prelude::*;

    fn image_sample(fill: f32, label: i64) -> Sample {
        Sample::from_pairs([
            ("x", FieldValue::from(ArrayD::<f32>::from_elem(IxDyn(&[1, 28, 28]), fill))),
            ("label", FieldValue::Int(label)),
        ])
        .unwrap()
    }

    #[test]
    fn stacks_images_along_new_axis() {
        let batch = ArrayCollate::new()
            .collate(vec![image_sample(0.0, 1), image_sample(1.0, 2)])
            .unwrap();

        assert_eq!(batch.len(), 2);
        let x = batch.get("x").unwrap().as_array().unwrap();
        assert_eq!(x.shape(), &[2, 1, 28, 28]);
        assert_eq!(x.dtype(), DType::Float32);

        let label = batch.get("label").unwrap().as_array().unwrap();
        assert_eq!(label.dtype(), DType::Int64);
        assert_eq!(label.to_f64_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn field_set_mismatch_is_reported_with_index() {
        let full = Sample::from_pairs([("x", 1i64), ("y", 2i64)]).unwrap();
        let partial = Sample::from_pairs([("x", 1i64)]).unwrap();

        let err = ArrayCollate::new().collate(vec![full, partial]).unwrap_err();

        assert_eq!(
            err,
            Error::FieldSetMismatch {
                index: 1,
                expected: vec!["x".into(), "y".into()],
                found: vec!["x".into()],
            }
        );
    }

    #[test]
    fn inconsistent_shapes_cannot_be_stacked() {
        let a = Sample::from_pairs([("x", ArrayD::<f32>::zeros(IxDyn(&[2, 2])))]).unwrap();
        let b = Sample::from_pairs([("x", ArrayD::<f32>::zeros(IxDyn(&[3, 2])))]).unwrap();

        let err = ArrayCollate::new().collate(vec![a, b]).unwrap_err();
        assert_eq!(
            err,
            Error::StackShapeMismatch {
                field: "x".into(),
                expected: "array f32[2, 2]".into(),
                found: "array f32[3, 2]".into(),
            }
        );
    }

    #[test]
    fn inconsistent_dtypes_cannot_be_stacked() {
        let a = Sample::from_pairs([("x", FieldValue::Int(1))]).unwrap();
        let b = Sample::from_pairs([("x", FieldValue::Float(1.0))]).unwrap();

        assert!(matches!(
            ArrayCollate::new().collate(vec![a, b]),
            Err(Error::StackShapeMismatch { .. })
        ));
    }

    #[test]
    fn integer_types_are_preserved_unless_widened() {
        let sample = || Sample::from_pairs([("m", ArrayD::<u8>::zeros(IxDyn(&[4])))]).unwrap();

        let plain = ArrayCollate::new().collate(vec![sample(), sample()]).unwrap();
        assert_eq!(plain.get("m").unwrap().as_array().unwrap().dtype(), DType::UInt8);

        let widened = ArrayCollate::new()
            .with_widened(["m"])
            .collate(vec![sample(), sample()])
            .unwrap();
        assert_eq!(widened.get("m").unwrap().as_array().unwrap().dtype(), DType::Int64);
    }

    #[test]
    fn array_collation_rejects_tensors() {
        let sample = || {
            Sample::from_pairs([("x", Tensor::from_vec(vec![1.0f32], vec![1]).unwrap())]).unwrap()
        };

        let err = ArrayCollate::new().collate(vec![sample(), sample()]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFieldType { .. }));
    }

    #[test]
    fn tensor_collation_stacks_tensors_and_rejects_arrays() {
        let tensor_sample = || {
            Sample::from_pairs([
                ("x", FieldValue::from(Tensor::from_vec(vec![1.0f32, 2.0], vec![2]).unwrap())),
                ("ok", FieldValue::Bool(true)),
            ])
            .unwrap()
        };
        let batch = TensorCollate::new()
            .collate(vec![tensor_sample(), tensor_sample(), tensor_sample()])
            .unwrap();
        assert_eq!(batch.get("x").unwrap().as_tensor().unwrap().shape(), &[3, 2]);
        assert_eq!(batch.get("ok").unwrap().as_tensor().unwrap().dtype(), DType::Bool);

        let array_sample = Sample::from_pairs([("x", ArrayD::<f32>::zeros(IxDyn(&[2])))]).unwrap();
        assert!(matches!(
            TensorCollate::new().collate(vec![array_sample]),
            Err(Error::UnsupportedFieldType { .. })
        ));
    }

    #[test]
    fn nested_maps_lists_and_text() {
        let sample = |id: i64| {
            let mut meta = FieldMap::new();
            meta.insert("id".into(), FieldValue::Int(id));
            meta.insert("path".into(), FieldValue::Text(format!("img_{id}.png")));
            Sample::from_pairs([
                ("meta", FieldValue::Map(meta)),
                ("pair", FieldValue::List(vec![FieldValue::Float(0.5), FieldValue::Int(id)])),
            ])
            .unwrap()
        };

        let batch = ArrayCollate::new().collate(vec![sample(1), sample(2)]).unwrap();

        let FieldValue::Map(meta) = batch.get("meta").unwrap() else {
            panic!("meta should collate to a map");
        };
        assert_eq!(meta["id"].as_array().unwrap().shape(), &[2]);
        assert_eq!(
            meta["path"],
            FieldValue::List(vec!["img_1.png".into(), "img_2.png".into()])
        );

        let FieldValue::List(pair) = batch.get("pair").unwrap() else {
            panic!("pair should collate to a list");
        };
        assert_eq!(pair[0].as_array().unwrap().dtype(), DType::Float64);
        assert_eq!(pair[1].as_array().unwrap().to_f64_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn empty_and_positional_inputs_fail() {
        assert_eq!(ArrayCollate::new().collate(Vec::new()).unwrap_err(), Error::EmptyBatch);
        assert!(matches!(
            ArrayCollate::new().collate(vec![Sample::Sequence(vec![FieldValue::Int(1)])]),
            Err(Error::OrderingViolation(_))
        ));
    }

    #[test]
    fn opaque_values_are_unsupported() {
        let sample = Sample::from_pairs([("h", FieldValue::Opaque(OpaqueValue::new(1u8)))]).unwrap();
        assert!(matches!(
            ArrayCollate::new().collate(vec![sample]),
            Err(Error::UnsupportedFieldType { .. })
        ));
    }

    #[test]
    fn strategy_names_round_trip_through_config() {
        let strategy: CollationStrategy = serde_json::from_str("\"tensorCollate\"").unwrap();
        assert_eq!(strategy, CollationStrategy::TensorCollate);
        assert_eq!(
            Collator::from_strategy(strategy, &[]).strategy(),
            CollationStrategy::TensorCollate
        );
    }

    proptest! {
        #[test]
        fn batch_has_one_stacked_field_per_sample_field(
            k in 1usize..6,
            m in 1usize..5,
            dims in prop::collection::vec(1usize..4, 0..3),
        ) {
            let sample = || {
                Sample::from_pairs((0..m).map(|i| {
                    (format!("f{i}"), FieldValue::from(ArrayD::<i32>::zeros(IxDyn(&dims))))
                }))
                .unwrap()
            };

            let batch = ArrayCollate::new().collate((0..k).map(|_| sample()).collect()).unwrap();

            prop_assert_eq!(batch.field_count(), m);
            for value in batch.fields().values() {
                let array = value.as_array().unwrap();
                prop_assert_eq!(array.shape()[0], k);
                prop_assert_eq!(&array.shape()[1..], &dims[..]);
            }
        }
    }
}
