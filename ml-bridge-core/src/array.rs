//! Array-domain values backed by `ndarray`
//!
//! Array-domain stages work on [`ArrayValue`]s. Conversion into the tensor
//! domain happens only through [`ArrayValue::to_tensor`].

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::dtype::{DType, FloatWidth};
use crate::error::{Error, Result};
use crate::tensor::{Tensor, TensorData};

/// A dynamically shaped array of one of the supported element types
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// Boolean array
    Bool(ArrayD<bool>),

    /// 8-bit unsigned integer array
    UInt8(ArrayD<u8>),

    /// 32-bit signed integer array
    Int32(ArrayD<i32>),

    /// 64-bit signed integer array
    Int64(ArrayD<i64>),

    /// 32-bit float array
    Float32(ArrayD<f32>),

    /// 64-bit float array
    Float64(ArrayD<f64>),
}

macro_rules! impl_from_array {
    ($ty:ty, $variant:ident) => {
        impl From<ArrayD<$ty>> for ArrayValue {
            fn from(array: ArrayD<$ty>) -> Self {
                ArrayValue::$variant(array)
            }
        }
    };
}

impl_from_array!(bool, Bool);
impl_from_array!(u8, UInt8);
impl_from_array!(i32, Int32);
impl_from_array!(i64, Int64);
impl_from_array!(f32, Float32);
impl_from_array!(f64, Float64);

/// Elements in logical (row-major) order, whatever the memory layout
fn logical_vec<T: Clone>(array: &ArrayD<T>) -> Vec<T> {
    array.iter().cloned().collect()
}

fn stack_views<T: Clone>(views: &[ArrayViewD<'_, T>]) -> Result<ArrayD<T>> {
    ndarray::stack(Axis(0), views).map_err(|e| Error::InvalidArgument(e.to_string()))
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
impl ArrayValue {
    /// Element type of this array
    pub fn dtype(&self) -> DType {
        match self {
            ArrayValue::Bool(_) => DType::Bool,
            ArrayValue::UInt8(_) => DType::UInt8,
            ArrayValue::Int32(_) => DType::Int32,
            ArrayValue::Int64(_) => DType::Int64,
            ArrayValue::Float32(_) => DType::Float32,
            ArrayValue::Float64(_) => DType::Float64,
        }
    }

    /// Shape of this array
    pub fn shape(&self) -> &[usize] {
        match self {
            ArrayValue::Bool(a) => a.shape(),
            ArrayValue::UInt8(a) => a.shape(),
            ArrayValue::Int32(a) => a.shape(),
            ArrayValue::Int64(a) => a.shape(),
            ArrayValue::Float32(a) => a.shape(),
            ArrayValue::Float64(a) => a.shape(),
        }
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Check if this array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Describe dtype and shape, e.g. `u8[1, 28, 28]`
    pub fn shape_family(&self) -> String {
        format!("{}{:?}", self.dtype(), self.shape())
    }

    /// Copy all elements out as `f64`, in logical order
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            ArrayValue::Bool(a) => a.iter().map(|&x| f64::from(u8::from(x))).collect(),
            ArrayValue::UInt8(a) => a.iter().map(|&x| f64::from(x)).collect(),
            ArrayValue::Int32(a) => a.iter().map(|&x| f64::from(x)).collect(),
            ArrayValue::Int64(a) => a.iter().map(|&x| x as f64).collect(),
            ArrayValue::Float32(a) => a.iter().map(|&x| f64::from(x)).collect(),
            ArrayValue::Float64(a) => a.iter().copied().collect(),
        }
    }

    /// Convert into a tensor, resolving float data to `width`
    ///
    /// Shape and values are preserved. Integer and boolean arrays keep their
    /// element type.
    pub fn to_tensor(&self, width: FloatWidth) -> Result<Tensor> {
        let shape = self.shape().to_vec();
        let data = match self {
            ArrayValue::Bool(a) => TensorData::Bool(a.iter().map(|&x| u8::from(x)).collect()),
            ArrayValue::UInt8(a) => TensorData::UInt8(logical_vec(a)),
            ArrayValue::Int32(a) => TensorData::Int32(logical_vec(a)),
            ArrayValue::Int64(a) => TensorData::Int64(logical_vec(a)),
            ArrayValue::Float32(a) => TensorData::Float32(logical_vec(a)),
            ArrayValue::Float64(a) => TensorData::Float64(logical_vec(a)),
        };
        let target = width.target_for(self.dtype());
        Tensor::from_data(data.cast(target), shape)
    }

    /// Build an array from a tensor, keeping its element type
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let shape = IxDyn(tensor.shape());
        let shape_err = |e: ndarray::ShapeError| Error::InvalidArgument(e.to_string());
        Ok(match tensor.data() {
            TensorData::Bool(v) => ArrayValue::Bool(
                ArrayD::from_shape_vec(shape, v.iter().map(|&x| x != 0).collect())
                    .map_err(shape_err)?,
            ),
            TensorData::UInt8(v) => {
                ArrayValue::UInt8(ArrayD::from_shape_vec(shape, v.clone()).map_err(shape_err)?)
            }
            TensorData::Int32(v) => {
                ArrayValue::Int32(ArrayD::from_shape_vec(shape, v.clone()).map_err(shape_err)?)
            }
            TensorData::Int64(v) => {
                ArrayValue::Int64(ArrayD::from_shape_vec(shape, v.clone()).map_err(shape_err)?)
            }
            TensorData::Float32(v) => {
                ArrayValue::Float32(ArrayD::from_shape_vec(shape, v.clone()).map_err(shape_err)?)
            }
            TensorData::Float64(v) => {
                ArrayValue::Float64(ArrayD::from_shape_vec(shape, v.clone()).map_err(shape_err)?)
            }
        })
    }

    /// Widen to the widest type of the same family
    pub fn widened(&self) -> ArrayValue {
        match self {
            ArrayValue::Bool(_) | ArrayValue::Int64(_) | ArrayValue::Float64(_) => self.clone(),
            ArrayValue::UInt8(a) => ArrayValue::Int64(a.mapv(i64::from)),
            ArrayValue::Int32(a) => ArrayValue::Int64(a.mapv(i64::from)),
            ArrayValue::Float32(a) => ArrayValue::Float64(a.mapv(f64::from)),
        }
    }

    /// Convert to `Float32`, for stages that do floating point arithmetic
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            ArrayValue::Bool(a) => a.mapv(|x| f32::from(u8::from(x))),
            ArrayValue::UInt8(a) => a.mapv(f32::from),
            ArrayValue::Int32(a) => a.mapv(|x| x as f32),
            ArrayValue::Int64(a) => a.mapv(|x| x as f32),
            ArrayValue::Float32(a) => a.clone(),
            ArrayValue::Float64(a) => a.mapv(|x| x as f32),
        }
    }

    /// Insert a new axis of length one at `axis`
    pub fn insert_axis(self, axis: usize) -> Result<ArrayValue> {
        if axis > self.ndim() {
            return Err(Error::IndexOutOfBounds {
                index: axis,
                len: self.ndim() + 1,
            });
        }
        let axis = Axis(axis);
        Ok(match self {
            ArrayValue::Bool(a) => ArrayValue::Bool(a.insert_axis(axis)),
            ArrayValue::UInt8(a) => ArrayValue::UInt8(a.insert_axis(axis)),
            ArrayValue::Int32(a) => ArrayValue::Int32(a.insert_axis(axis)),
            ArrayValue::Int64(a) => ArrayValue::Int64(a.insert_axis(axis)),
            ArrayValue::Float32(a) => ArrayValue::Float32(a.insert_axis(axis)),
            ArrayValue::Float64(a) => ArrayValue::Float64(a.insert_axis(axis)),
        })
    }

    /// Stack arrays of identical dtype and shape along a new leading axis
    ///
    /// Callers are expected to have checked the shape family; mismatches are
    /// still reported, as `TypeMismatch` or `InvalidArgument`.
    pub fn stack(arrays: &[&ArrayValue]) -> Result<ArrayValue> {
        let first = arrays.first().ok_or(Error::EmptyBatch)?;

        macro_rules! stack_variant {
            ($variant:ident) => {{
                let views = arrays
                    .iter()
                    .map(|value| match value {
                        ArrayValue::$variant(a) => Ok(a.view()),
                        other => Err(Error::TypeMismatch(format!(
                            "cannot stack {} array onto {} array",
                            other.dtype(),
                            first.dtype()
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                ArrayValue::$variant(stack_views(&views)?)
            }};
        }

        Ok(match first {
            ArrayValue::Bool(_) => stack_variant!(Bool),
            ArrayValue::UInt8(_) => stack_variant!(UInt8),
            ArrayValue::Int32(_) => stack_variant!(Int32),
            ArrayValue::Int64(_) => stack_variant!(Int64),
            ArrayValue::Float32(_) => stack_variant!(Float32),
            ArrayValue::Float64(_) => stack_variant!(Float64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, ArrayD, IxDyn};
    use proptest::prelude::*;

    #[test]
    fn to_tensor_preserves_integer_values_and_shape() {
        let array = ArrayValue::from(arr2(&[[1u8, 2, 3], [4, 5, 6]]).into_dyn());
        let tensor = array.to_tensor(FloatWidth::F32).unwrap();

        assert_eq!(tensor.dtype(), DType::UInt8);
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(tensor.as_slice::<u8>().unwrap(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn to_tensor_uses_logical_order_for_transposed_arrays() {
        let array = arr2(&[[1i32, 2], [3, 4]]).reversed_axes().into_dyn();
        let tensor = ArrayValue::from(array).to_tensor(FloatWidth::F32).unwrap();

        assert_eq!(tensor.as_slice::<i32>().unwrap(), &[1, 3, 2, 4]);
    }

    #[test]
    fn to_tensor_resolves_float_width() {
        let array = ArrayValue::from(ArrayD::<f64>::from_elem(IxDyn(&[2]), 0.5));

        assert_eq!(array.to_tensor(FloatWidth::F32).unwrap().dtype(), DType::Float32);
        assert_eq!(array.to_tensor(FloatWidth::Preserve).unwrap().dtype(), DType::Float64);
    }

    #[test]
    fn from_tensor_inverts_to_tensor() {
        let array = ArrayValue::from(arr2(&[[true, false], [false, true]]).into_dyn());
        let tensor = array.to_tensor(FloatWidth::Preserve).unwrap();

        assert_eq!(ArrayValue::from_tensor(&tensor).unwrap(), array);
    }

    #[test]
    fn stack_adds_leading_axis() {
        let a = ArrayValue::from(ArrayD::<f32>::zeros(IxDyn(&[1, 28, 28])));
        let b = ArrayValue::from(ArrayD::<f32>::ones(IxDyn(&[1, 28, 28])));
        let stacked = ArrayValue::stack(&[&a, &b]).unwrap();

        assert_eq!(stacked.shape(), &[2, 1, 28, 28]);
        assert_eq!(stacked.dtype(), DType::Float32);
    }

    #[test]
    fn stack_rejects_mixed_dtypes() {
        let a = ArrayValue::from(ArrayD::<f32>::zeros(IxDyn(&[2])));
        let b = ArrayValue::from(ArrayD::<f64>::zeros(IxDyn(&[2])));

        assert!(matches!(
            ArrayValue::stack(&[&a, &b]),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn widening_keeps_values() {
        let array = ArrayValue::from(arr2(&[[250u8, 3]]).into_dyn());
        let widened = array.widened();

        assert_eq!(widened.dtype(), DType::Int64);
        assert_eq!(widened.to_f64_vec(), vec![250.0, 3.0]);
    }

    #[test]
    fn insert_axis_checks_bounds() {
        let array = ArrayValue::from(ArrayD::<i32>::zeros(IxDyn(&[28, 28])));

        assert_eq!(array.clone().insert_axis(0).unwrap().shape(), &[1, 28, 28]);
        assert!(array.insert_axis(3).is_err());
    }

    proptest! {
        #[test]
        fn stacked_tensor_matches_stacked_arrays(
            rows in 1usize..5,
            cols in 1usize..5,
            count in 1usize..6,
        ) {
            let arrays: Vec<ArrayValue> = (0..count)
                .map(|k| {
                    let values: Vec<i64> = (0..rows * cols).map(|i| (k * 100 + i) as i64).collect();
                    ArrayD::from_shape_vec(IxDyn(&[rows, cols]), values).unwrap().into()
                })
                .collect();
            let refs: Vec<&ArrayValue> = arrays.iter().collect();

            let stacked = ArrayValue::stack(&refs).unwrap();
            let tensor = stacked.to_tensor(FloatWidth::F32).unwrap();

            prop_assert_eq!(tensor.shape(), &[count, rows, cols][..]);
            prop_assert_eq!(tensor.to_f64_vec(), stacked.to_f64_vec());
            let expected: Vec<f64> = arrays.iter().flat_map(ArrayValue::to_f64_vec).collect();
            prop_assert_eq!(tensor.to_f64_vec(), expected);
        }
    }
}
