//! Segmentation utilities and tensor-domain stages

use std::sync::Arc;

use tracing::trace;

use ml_bridge_core::{
    DType, Error, FieldMap, FieldValue, Result, Sample, StageContract, Tensor, TransformStage,
};

use crate::parameter::Parameter;

fn unravel(mut flat: usize, shape: &[usize], index: &mut [usize]) {
    for (slot, &dim) in index.iter_mut().zip(shape).rev() {
        *slot = flat % dim;
        flat /= dim;
    }
}

/// Instance id held by a segmentation value; background, negative,
/// fractional and non-finite values hold none
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn instance_id(value: f64) -> Option<usize> {
    (value.is_finite() && value >= 1.0 && value.fract() == 0.0).then(|| value as usize)
}

fn take_tensor(fields: &mut FieldMap, field: &str) -> Result<Tensor> {
    match fields.remove(field) {
        Some(FieldValue::Tensor(tensor)) => Ok(tensor),
        Some(other) => Err(Error::UnsupportedFieldType {
            field: field.to_string(),
            kind: format!("{} where a tensor was expected", other.describe()),
        }),
        None => Err(Error::InvalidArgument(format!("sample has no field '{field}'"))),
    }
}

/// Paint bounding boxes into a new segmentation of `shape`
///
/// Box `i` is written with the value `i + 1`. See [`box_to_seg_into`].
pub fn box_to_seg(boxes: &[Vec<usize>], shape: &[usize], dtype: DType) -> Result<Tensor> {
    let mut out = Tensor::zeros(shape.to_vec(), dtype);
    box_to_seg_into(boxes, &mut out)?;
    Ok(out)
}

/// Paint bounding boxes into an existing segmentation
///
/// A 4-entry box `(min0, min1, max0, max1)` covers the half-open ranges
/// `[min0, max0)` and `[min1, max1)` of the last two dimensions. A 6-entry
/// box `(min0, min1, max0, max1, min2, max2)` covers the inclusive ranges of
/// the last three. Leading dimensions are painted in full and later boxes
/// overwrite earlier ones.
pub fn box_to_seg_into(boxes: &[Vec<usize>], out: &mut Tensor) -> Result<()> {
    let shape = out.shape().to_vec();
    let ndim = shape.len();
    let mut index = vec![0; ndim];

    for (i, b) in boxes.iter().enumerate() {
        let ranges: Vec<(usize, usize)> = match b.len() {
            4 => vec![(b[0], b[2]), (b[1], b[3])],
            6 => vec![
                (b[0], b[2].saturating_add(1)),
                (b[1], b[3].saturating_add(1)),
                (b[4], b[5].saturating_add(1)),
            ],
            n => {
                return Err(Error::InvalidArgument(format!(
                    "boxes must have 4 (2-D) or 6 (3-D) entries, found {n}"
                )))
            }
        };
        if ranges.len() > ndim {
            return Err(Error::InvalidArgument(format!(
                "{}-D box does not fit a {ndim}-D segmentation",
                ranges.len()
            )));
        }

        let spatial = ndim - ranges.len();
        let id = (i + 1) as f64;
        for flat in 0..out.len() {
            unravel(flat, &shape, &mut index);
            let inside = index[spatial..]
                .iter()
                .zip(&ranges)
                .all(|(&x, &(lo, hi))| lo <= x && x < hi);
            if inside {
                out.set_f64(&index, id)?;
            }
        }
    }
    Ok(())
}

/// Bounding boxes of every instance in a segmentation
///
/// Instance ids run from 1 to the maximum value in `seg`; every id in that
/// range must be present, and every value must be a whole number no larger
/// than the element count. Boxes cover the last `dim` dimensions and are
/// encoded as `f32` tensors `[min0, min1, max0, max1]`, followed by
/// `min, max` pairs for each further dimension when `dim > 2`.
pub fn seg_to_box(seg: &Tensor, dim: usize) -> Result<Vec<Tensor>> {
    let ndim = seg.ndim();
    if dim < 2 || dim > ndim {
        return Err(Error::InvalidArgument(format!(
            "cannot extract {dim}-D boxes from a {ndim}-D segmentation"
        )));
    }

    let values = seg.to_f64_vec();
    let mut ids = Vec::with_capacity(values.len());
    for value in values {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(Error::InvalidArgument(format!(
                "segmentation value {value} is not an instance id"
            )));
        }
        let id = instance_id(value).unwrap_or(0);
        if id > seg.len() {
            return Err(Error::InvalidArgument(format!(
                "instance id {id} exceeds the {} elements of the segmentation",
                seg.len()
            )));
        }
        ids.push(id);
    }
    let max_id = ids.iter().copied().max().unwrap_or(0);

    let mut extents: Vec<Option<(Vec<usize>, Vec<usize>)>> = vec![None; max_id];
    let mut index = vec![0; ndim];
    for (flat, id) in ids.into_iter().enumerate() {
        if id == 0 {
            continue;
        }
        unravel(flat, seg.shape(), &mut index);
        let slot = &mut extents[id - 1];
        match slot {
            Some((mins, maxs)) => {
                for ((lo, hi), &x) in mins.iter_mut().zip(maxs.iter_mut()).zip(&index) {
                    *lo = (*lo).min(x);
                    *hi = (*hi).max(x);
                }
            }
            None => *slot = Some((index.clone(), index.clone())),
        }
    }

    let first = ndim - dim;
    extents
        .into_iter()
        .enumerate()
        .map(|(i, extent)| {
            let (mins, maxs) = extent.ok_or_else(|| {
                Error::InvalidArgument(format!("instance {} is missing from segmentation", i + 1))
            })?;
            let mut coords = vec![mins[first], mins[first + 1], maxs[first], maxs[first + 1]];
            for axis in first + 2..ndim {
                coords.push(mins[axis]);
                coords.push(maxs[axis]);
            }
            let coords: Vec<f32> = coords.into_iter().map(|c| c as f32).collect();
            let len = coords.len();
            Tensor::from_vec(coords, vec![len])
        })
        .collect()
}

/// Map instance ids to class labels
///
/// Id `i` (starting at 1) becomes `classes[i - 1]`. Background, ids
/// without a class and values that are not whole ids stay 0.
pub fn instance_to_semantic(instance: &Tensor, classes: &[i64]) -> Result<Tensor> {
    let mut out = Tensor::zeros(instance.shape().to_vec(), instance.dtype());
    let mut index = vec![0; instance.ndim()];
    for (flat, value) in instance.to_f64_vec().into_iter().enumerate() {
        let Some(id) = instance_id(value) else {
            continue;
        };
        if let Some(&class) = classes.get(id - 1) {
            unravel(flat, instance.shape(), &mut index);
            out.set_f64(&index, class as f64)?;
        }
    }
    Ok(out)
}

/// Stage writing the semantic segmentation of one instance field to another
#[derive(Debug, Clone)]
pub struct InstanceToSemantic {
    instance_field: String,
    semantic_field: String,
    classes: Vec<i64>,
}

impl InstanceToSemantic {
    /// Convert `instance_field` into `semantic_field` using `classes`
    pub fn new(
        instance_field: impl Into<String>,
        semantic_field: impl Into<String>,
        classes: Vec<i64>,
    ) -> Self {
        Self {
            instance_field: instance_field.into(),
            semantic_field: semantic_field.into(),
            classes,
        }
    }
}

impl TransformStage for InstanceToSemantic {
    fn name(&self) -> &str {
        "instance_to_semantic"
    }

    fn contract(&self) -> StageContract {
        StageContract::tensor_domain()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let mut fields = sample.into_mapping()?;
        let instance = take_tensor(&mut fields, &self.instance_field)?;
        let semantic = instance_to_semantic(&instance, &self.classes)?;
        fields.insert(self.instance_field.clone(), instance.into());
        fields.insert(self.semantic_field.clone(), semantic.into());
        Ok(Sample::Mapping(fields))
    }
}

/// Multiply a tensor field by a random factor drawn on every call
#[derive(Debug, Clone)]
pub struct RandomScaleIntensity {
    field: String,
    factor: Arc<dyn Parameter>,
}

impl RandomScaleIntensity {
    /// Scale `field` by values drawn from `factor`
    pub fn new(field: impl Into<String>, factor: Arc<dyn Parameter>) -> Self {
        Self {
            field: field.into(),
            factor,
        }
    }
}

impl TransformStage for RandomScaleIntensity {
    fn name(&self) -> &str {
        "random_scale_intensity"
    }

    fn contract(&self) -> StageContract {
        StageContract::tensor_domain()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let mut fields = sample.into_mapping()?;
        let tensor = take_tensor(&mut fields, &self.field)?;
        let factor = self.factor.forward(&[], DType::Float64)?.get_f64(&[])?;
        trace!(field = %self.field, factor, "scaling intensity");
        fields.insert(self.field.clone(), tensor.map_f64(|x| x * factor).into());
        Ok(Sample::Mapping(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ConstantParameter;
    use test_case::test_case;

    #[test]
    fn paints_2d_boxes_half_open() {
        let seg = box_to_seg(&[vec![0, 0, 2, 1], vec![1, 1, 3, 3]], &[1, 3, 3], DType::Int64).unwrap();

        assert_eq!(
            seg.as_slice::<i64>().unwrap(),
            &[
                1, 0, 0, //
                1, 2, 2, //
                0, 2, 2,
            ]
        );
    }

    #[test]
    fn paints_3d_boxes_inclusive() {
        let seg = box_to_seg(&[vec![0, 0, 1, 0, 1, 1]], &[2, 2, 2], DType::UInt8).unwrap();
        let values = seg.to_f64_vec();

        // x in 0..=1, y == 0, z == 1
        assert_eq!(values, vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test_case(vec![0, 1, 2] ; "three entries")]
    #[test_case(vec![0, 1, 2, 3, 4] ; "five entries")]
    fn odd_box_lengths_are_rejected(b: Vec<usize>) {
        assert!(box_to_seg(&[b], &[4, 4], DType::Int32).is_err());
    }

    #[test]
    fn open_ended_3d_box_fills_the_volume() {
        let open = vec![0, 0, usize::MAX, usize::MAX, 0, usize::MAX];
        let seg = box_to_seg(&[open], &[2, 2, 2], DType::UInt8).unwrap();

        assert_eq!(seg.as_slice::<u8>().unwrap(), &[1; 8]);
    }

    #[test]
    fn boxes_round_trip_through_segmentation() {
        let seg = box_to_seg(&[vec![0, 1, 1, 2], vec![2, 0, 3, 1]], &[4, 4], DType::Int32).unwrap();
        let boxes = seg_to_box(&seg, 2).unwrap();

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].as_slice::<f32>().unwrap(), &[0.0, 1.0, 0.0, 1.0]);
        assert_eq!(boxes[1].as_slice::<f32>().unwrap(), &[2.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn seg_to_box_3d_appends_depth_pair() {
        let mut seg = Tensor::zeros(vec![3, 3, 3], DType::Int32);
        seg.set_f64(&[0, 1, 1], 1.0).unwrap();
        seg.set_f64(&[2, 2, 2], 1.0).unwrap();

        let boxes = seg_to_box(&seg, 3).unwrap();
        assert_eq!(boxes[0].as_slice::<f32>().unwrap(), &[0.0, 1.0, 2.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn missing_instances_are_reported() {
        let seg = Tensor::from_vec(vec![0i32, 2, 2, 0], vec![2, 2]).unwrap();
        assert!(seg_to_box(&seg, 2).is_err());
    }

    #[test_case(f32::NAN ; "nan")]
    #[test_case(f32::INFINITY ; "infinity")]
    #[test_case(f32::NEG_INFINITY ; "negative infinity")]
    #[test_case(1.5 ; "fractional")]
    #[test_case(5.0 ; "larger than the segmentation")]
    fn seg_to_box_rejects_values_that_are_not_ids(value: f32) {
        let seg = Tensor::from_vec(vec![1.0f32, value], vec![1, 2]).unwrap();
        let err = seg_to_box(&seg, 2).unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test_case(f32::NAN ; "nan")]
    #[test_case(f32::INFINITY ; "infinity")]
    #[test_case(1.5 ; "fractional")]
    #[test_case(-2.0 ; "negative")]
    fn values_that_are_not_ids_stay_background(value: f32) {
        let instance = Tensor::from_vec(vec![1.0f32, value], vec![2]).unwrap();
        let semantic = instance_to_semantic(&instance, &[5, 7]).unwrap();

        assert_eq!(semantic.as_slice::<f32>().unwrap(), &[5.0, 0.0]);
    }

    #[test]
    fn maps_instances_to_classes() {
        let instance = Tensor::from_vec(vec![0i64, 1, 2, 3], vec![2, 2]).unwrap();
        let semantic = instance_to_semantic(&instance, &[5, 7]).unwrap();

        assert_eq!(semantic.as_slice::<i64>().unwrap(), &[0, 5, 7, 0]);
    }

    #[test]
    fn instance_stage_keeps_source_field() {
        let instance = Tensor::from_vec(vec![1i32, 0], vec![2]).unwrap();
        let sample = Sample::from_pairs([("inst", FieldValue::from(instance.clone()))]).unwrap();

        let out = InstanceToSemantic::new("inst", "seg", vec![3]).apply(sample).unwrap();

        assert_eq!(out.get("inst").and_then(FieldValue::as_tensor), Some(&instance));
        assert_eq!(
            out.get("seg").and_then(FieldValue::as_tensor).unwrap().as_slice::<i32>().unwrap(),
            &[3, 0]
        );
    }

    #[test]
    fn scales_intensity_by_drawn_factor() {
        let data = Tensor::from_vec(vec![1.0f32, 2.0], vec![2]).unwrap();
        let sample = Sample::from_pairs([("data", FieldValue::from(data))]).unwrap();
        let stage = RandomScaleIntensity::new("data", Arc::new(ConstantParameter(1.5)));

        let out = stage.apply(sample).unwrap();
        assert_eq!(
            out.get("data").and_then(FieldValue::as_tensor).unwrap().as_slice::<f32>().unwrap(),
            &[1.5, 3.0]
        );
    }
}
