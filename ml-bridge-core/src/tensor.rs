//! Dense tensor implementation for tensor-domain stages
//!
//! Tensors are contiguous, row-major and own their storage. Elements are
//! `bytemuck::Pod` values so the storage can be viewed as raw bytes without
//! copying.

use std::fmt;

use bytemuck::Pod;

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Trait for types that can be stored in tensors
pub trait TensorType: Pod + Send + Sync + 'static {
    /// Tensor data type of this element
    const DTYPE: DType;

    /// Wrap a vector of elements as tensor storage
    fn into_data(values: Vec<Self>) -> TensorData;

    /// View tensor storage as a slice of this element type
    fn view(data: &TensorData) -> Option<&[Self]>;
}

macro_rules! impl_tensor_type {
    ($ty:ty, $variant:ident) => {
        impl TensorType for $ty {
            const DTYPE: DType = DType::$variant;

            fn into_data(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }

            fn view(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(values) => Some(values),
                    _ => None,
                }
            }
        }
    };
}

impl_tensor_type!(u8, UInt8);
impl_tensor_type!(i32, Int32);
impl_tensor_type!(i64, Int64);
impl_tensor_type!(f32, Float32);
impl_tensor_type!(f64, Float64);

/// Typed element storage of a tensor
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// Booleans stored as 0/1 bytes
    Bool(Vec<u8>),

    /// 8-bit unsigned integers
    UInt8(Vec<u8>),

    /// 32-bit signed integers
    Int32(Vec<i32>),

    /// 64-bit signed integers
    Int64(Vec<i64>),

    /// 32-bit floats
    Float32(Vec<f32>),

    /// 64-bit floats
    Float64(Vec<f64>),
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
impl TensorData {
    /// Zero-filled storage of `len` elements
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::Bool => TensorData::Bool(vec![0; len]),
            DType::UInt8 => TensorData::UInt8(vec![0; len]),
            DType::Int32 => TensorData::Int32(vec![0; len]),
            DType::Int64 => TensorData::Int64(vec![0; len]),
            DType::Float32 => TensorData::Float32(vec![0.0; len]),
            DType::Float64 => TensorData::Float64(vec![0.0; len]),
        }
    }

    /// Data type of the stored elements
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Bool(_) => DType::Bool,
            TensorData::UInt8(_) => DType::UInt8,
            TensorData::Int32(_) => DType::Int32,
            TensorData::Int64(_) => DType::Int64,
            TensorData::Float32(_) => DType::Float32,
            TensorData::Float64(_) => DType::Float64,
        }
    }

    /// Number of stored elements
    pub fn len(&self) -> usize {
        match self {
            TensorData::Bool(v) | TensorData::UInt8(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::Float32(v) => v.len(),
            TensorData::Float64(v) => v.len(),
        }
    }

    /// Check if no elements are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the storage as raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TensorData::Bool(v) | TensorData::UInt8(v) => v,
            TensorData::Int32(v) => bytemuck::cast_slice(v),
            TensorData::Int64(v) => bytemuck::cast_slice(v),
            TensorData::Float32(v) => bytemuck::cast_slice(v),
            TensorData::Float64(v) => bytemuck::cast_slice(v),
        }
    }

    /// Rebuild storage of the given type from raw bytes
    pub fn from_bytes(dtype: DType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % dtype.size_bytes() != 0 {
            return Err(Error::InvalidArgument(format!(
                "Byte length {} is not a multiple of the {} element size {}",
                bytes.len(),
                dtype,
                dtype.size_bytes()
            )));
        }

        Ok(match dtype {
            DType::Bool => TensorData::Bool(bytes.iter().map(|&b| u8::from(b != 0)).collect()),
            DType::UInt8 => TensorData::UInt8(bytes.to_vec()),
            DType::Int32 => TensorData::Int32(bytemuck::pod_collect_to_vec(bytes)),
            DType::Int64 => TensorData::Int64(bytemuck::pod_collect_to_vec(bytes)),
            DType::Float32 => TensorData::Float32(bytemuck::pod_collect_to_vec(bytes)),
            DType::Float64 => TensorData::Float64(bytemuck::pod_collect_to_vec(bytes)),
        })
    }

    /// Read element `index` as `f64`
    pub fn value_f64(&self, index: usize) -> f64 {
        match self {
            TensorData::Bool(v) | TensorData::UInt8(v) => f64::from(v[index]),
            TensorData::Int32(v) => f64::from(v[index]),
            TensorData::Int64(v) => v[index] as f64,
            TensorData::Float32(v) => f64::from(v[index]),
            TensorData::Float64(v) => v[index],
        }
    }

    /// Overwrite element `index` with `value`, converted to the storage type
    pub fn set_f64(&mut self, index: usize, value: f64) {
        match self {
            TensorData::Bool(v) => v[index] = u8::from(value != 0.0),
            TensorData::UInt8(v) => v[index] = value as u8,
            TensorData::Int32(v) => v[index] = value as i32,
            TensorData::Int64(v) => v[index] = value as i64,
            TensorData::Float32(v) => v[index] = value as f32,
            TensorData::Float64(v) => v[index] = value,
        }
    }

    /// Copy all elements out as `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.value_f64(i)).collect()
    }

    fn to_i64_vec(&self) -> Vec<i64> {
        match self {
            TensorData::Bool(v) | TensorData::UInt8(v) => v.iter().map(|&x| i64::from(x)).collect(),
            TensorData::Int32(v) => v.iter().map(|&x| i64::from(x)).collect(),
            TensorData::Int64(v) => v.clone(),
            TensorData::Float32(v) => v.iter().map(|&x| x as i64).collect(),
            TensorData::Float64(v) => v.iter().map(|&x| x as i64).collect(),
        }
    }

    /// Convert the storage to another element type
    ///
    /// Integer to integer conversions go through `i64` so they stay exact
    /// for every value the target can represent.
    pub fn cast(&self, dtype: DType) -> TensorData {
        if self.dtype() == dtype {
            return self.clone();
        }

        if !self.dtype().is_float() && !dtype.is_float() {
            let ints = self.to_i64_vec();
            return match dtype {
                DType::Bool => TensorData::Bool(ints.iter().map(|&x| u8::from(x != 0)).collect()),
                DType::UInt8 => TensorData::UInt8(ints.iter().map(|&x| x as u8).collect()),
                DType::Int32 => TensorData::Int32(ints.iter().map(|&x| x as i32).collect()),
                DType::Int64 => TensorData::Int64(ints),
                DType::Float32 | DType::Float64 => unreachable!("float targets handled below"),
            };
        }

        let floats = self.to_f64_vec();
        match dtype {
            DType::Bool => TensorData::Bool(floats.iter().map(|&x| u8::from(x != 0.0)).collect()),
            DType::UInt8 => TensorData::UInt8(floats.iter().map(|&x| x as u8).collect()),
            DType::Int32 => TensorData::Int32(floats.iter().map(|&x| x as i32).collect()),
            DType::Int64 => TensorData::Int64(floats.iter().map(|&x| x as i64).collect()),
            DType::Float32 => TensorData::Float32(floats.iter().map(|&x| x as f32).collect()),
            DType::Float64 => TensorData::Float64(floats),
        }
    }

    /// Append the elements of `other`, which must have the same type
    fn extend_from(&mut self, other: &TensorData) -> Result<()> {
        match (self, other) {
            (TensorData::Bool(a), TensorData::Bool(b))
            | (TensorData::UInt8(a), TensorData::UInt8(b)) => a.extend_from_slice(b),
            (TensorData::Int32(a), TensorData::Int32(b)) => a.extend_from_slice(b),
            (TensorData::Int64(a), TensorData::Int64(b)) => a.extend_from_slice(b),
            (TensorData::Float32(a), TensorData::Float32(b)) => a.extend_from_slice(b),
            (TensorData::Float64(a), TensorData::Float64(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(Error::TypeMismatch(format!(
                    "cannot append {} elements to {} storage",
                    b.dtype(),
                    a.dtype()
                )))
            }
        }
        Ok(())
    }
}

/// A dense multidimensional tensor
#[derive(Clone, PartialEq)]
pub struct Tensor {
    /// Element storage in row-major order
    data: TensorData,

    /// Shape of the tensor (dimensions)
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a zero-filled tensor with the given shape
    pub fn zeros(shape: Vec<usize>, dtype: DType) -> Self {
        let size = shape.iter().product();
        Self {
            data: TensorData::zeros(dtype, size),
            shape,
        }
    }

    /// Create a tensor from typed storage
    pub fn from_data(data: TensorData, shape: Vec<usize>) -> Result<Self> {
        let expected_size: usize = shape.iter().product();
        if data.len() != expected_size {
            return Err(Error::InvalidArgument(format!(
                "Data length {} does not match shape product {}",
                data.len(),
                expected_size
            )));
        }

        Ok(Self { data, shape })
    }

    /// Create a tensor from a vector
    pub fn from_vec<T: TensorType>(values: Vec<T>, shape: Vec<usize>) -> Result<Self> {
        Self::from_data(T::into_data(values), shape)
    }

    /// Create a boolean tensor from a vector
    pub fn from_bools(values: Vec<bool>, shape: Vec<usize>) -> Result<Self> {
        Self::from_data(
            TensorData::Bool(values.into_iter().map(u8::from).collect()),
            shape,
        )
    }

    /// Create a tensor from raw bytes
    pub fn from_bytes(dtype: DType, bytes: &[u8], shape: Vec<usize>) -> Result<Self> {
        Self::from_data(TensorData::from_bytes(dtype, bytes)?, shape)
    }

    /// Create a zero-dimensional tensor holding one value
    pub fn scalar<T: TensorType>(value: T) -> Self {
        Self {
            data: T::into_data(vec![value]),
            shape: Vec::new(),
        }
    }

    /// Get the shape of this tensor
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the strides of this tensor, in elements
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![0; self.shape.len()];
        let mut stride = 1;
        for i in (0..self.shape.len()).rev() {
            strides[i] = stride;
            stride *= self.shape[i];
        }
        strides
    }

    /// Get the number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if this tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the element type
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Get the underlying storage
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Consume the tensor and return its storage
    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Calculate the size in bytes of this tensor
    pub fn size_bytes(&self) -> usize {
        self.len() * self.dtype().size_bytes()
    }

    /// View the elements as raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// View the elements as a typed slice
    pub fn as_slice<T: TensorType>(&self) -> Result<&[T]> {
        T::view(&self.data).ok_or_else(|| {
            Error::TypeMismatch(format!(
                "tensor holds {} elements, requested {}",
                self.dtype(),
                T::DTYPE
            ))
        })
    }

    /// Copy all elements out as `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.to_f64_vec()
    }

    /// Reshape this tensor to a new shape with the same element count
    pub fn reshape(&self, new_shape: Vec<usize>) -> Result<Self> {
        let new_size: usize = new_shape.iter().product();
        if new_size != self.len() {
            return Err(Error::InvalidArgument(format!(
                "Cannot reshape tensor of size {} to size {}",
                self.len(),
                new_size
            )));
        }

        Ok(Self {
            data: self.data.clone(),
            shape: new_shape,
        })
    }

    fn offset(&self, indices: &[usize]) -> Result<usize> {
        if indices.len() != self.shape.len() {
            return Err(Error::InvalidArgument(format!(
                "Expected {} indices, got {}",
                self.shape.len(),
                indices.len()
            )));
        }

        let mut offset = 0;
        for ((&idx, &dim), stride) in indices.iter().zip(&self.shape).zip(self.strides()) {
            if idx >= dim {
                return Err(Error::IndexOutOfBounds { index: idx, len: dim });
            }
            offset += idx * stride;
        }
        Ok(offset)
    }

    /// Get the value at the specified indices as `f64`
    pub fn get_f64(&self, indices: &[usize]) -> Result<f64> {
        let offset = self.offset(indices)?;
        Ok(self.data.value_f64(offset))
    }

    /// Set the value at the specified indices
    pub fn set_f64(&mut self, indices: &[usize], value: f64) -> Result<()> {
        let offset = self.offset(indices)?;
        self.data.set_f64(offset, value);
        Ok(())
    }

    /// Convert the tensor to another element type
    pub fn cast(&self, dtype: DType) -> Self {
        Self {
            data: self.data.cast(dtype),
            shape: self.shape.clone(),
        }
    }

    /// Apply `f` to every element, keeping the element type
    pub fn map_f64(&self, f: impl Fn(f64) -> f64) -> Self {
        let mut data = self.data.clone();
        for i in 0..data.len() {
            let value = data.value_f64(i);
            data.set_f64(i, f(value));
        }
        Self {
            data,
            shape: self.shape.clone(),
        }
    }

    /// Describe dtype and shape, e.g. `f32[1, 28, 28]`
    pub fn shape_family(&self) -> String {
        format!("{}{:?}", self.dtype(), self.shape)
    }

    /// Stack tensors of identical dtype and shape along a new leading axis
    pub fn stack(tensors: &[&Tensor]) -> Result<Self> {
        let first = tensors.first().ok_or(Error::EmptyBatch)?;

        let mut data = TensorData::zeros(first.dtype(), 0);
        for tensor in tensors {
            if tensor.shape != first.shape {
                return Err(Error::InvalidArgument(format!(
                    "Cannot stack tensor of shape {:?} onto shape {:?}",
                    tensor.shape, first.shape
                )));
            }
            data.extend_from(&tensor.data)?;
        }

        let mut shape = Vec::with_capacity(first.ndim() + 1);
        shape.push(tensors.len());
        shape.extend_from_slice(&first.shape);

        Self::from_data(data, shape)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor<{}>{{ shape: {:?}, size: {} }}",
            self.dtype(),
            self.shape,
            self.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn from_vec_checks_shape_product() {
        let err = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], vec![2, 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn strides_are_row_major() {
        let tensor = Tensor::zeros(vec![2, 3, 4], DType::Float32);
        assert_eq!(tensor.strides(), vec![12, 4, 1]);
    }

    #[test]
    fn get_and_set_by_index() {
        let mut tensor = Tensor::zeros(vec![2, 3], DType::Int64);
        tensor.set_f64(&[1, 2], 7.0).unwrap();

        assert_eq!(tensor.get_f64(&[1, 2]).unwrap(), 7.0);
        assert_eq!(tensor.as_slice::<i64>().unwrap(), &[0, 0, 0, 0, 0, 7]);
        assert_eq!(
            tensor.get_f64(&[2, 0]).unwrap_err(),
            Error::IndexOutOfBounds { index: 2, len: 2 }
        );
    }

    #[test]
    fn typed_view_rejects_wrong_type() {
        let tensor = Tensor::from_vec(vec![1i32, 2], vec![2]).unwrap();
        assert!(matches!(tensor.as_slice::<f32>(), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn bytes_survive_a_trip_through_raw_storage() {
        let tensor = Tensor::from_vec(vec![1.5f64, -2.25, 3.0], vec![3]).unwrap();
        let rebuilt = Tensor::from_bytes(DType::Float64, tensor.as_bytes(), vec![3]).unwrap();

        assert_eq!(rebuilt, tensor);
        assert_eq!(tensor.size_bytes(), 24);
    }

    #[test_case(DType::UInt8)]
    #[test_case(DType::Int32)]
    #[test_case(DType::Int64)]
    #[test_case(DType::Float32)]
    #[test_case(DType::Float64)]
    fn raw_storage_rebuilds_every_numeric_dtype(dtype: DType) {
        let tensor = Tensor::from_vec(vec![0u8, 7, 42, 255], vec![2, 2])
            .unwrap()
            .cast(dtype);

        // Offset by one byte so the source slice is not aligned for the element type
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(tensor.as_bytes());
        let data = TensorData::from_bytes(dtype, &bytes[1..]).unwrap();

        assert_eq!(data.dtype(), dtype);
        assert_eq!(&data, tensor.data());
    }

    #[test_case(DType::Int32)]
    #[test_case(DType::Int64)]
    #[test_case(DType::Float32)]
    #[test_case(DType::Float64)]
    fn cast_preserves_small_integers(dtype: DType) {
        let tensor = Tensor::from_vec(vec![0u8, 1, 200], vec![3]).unwrap();
        let cast = tensor.cast(dtype);

        assert_eq!(cast.dtype(), dtype);
        assert_eq!(cast.to_f64_vec(), vec![0.0, 1.0, 200.0]);
    }

    #[test]
    fn cast_to_bool_marks_nonzero() {
        let tensor = Tensor::from_vec(vec![0.0f32, 0.5, -1.0], vec![3]).unwrap();
        let cast = tensor.cast(DType::Bool);
        assert_eq!(cast.data(), &TensorData::Bool(vec![0, 1, 1]));
    }

    #[test]
    fn stack_adds_leading_axis() {
        let a = Tensor::from_vec(vec![1i32, 2, 3, 4], vec![2, 2]).unwrap();
        let b = Tensor::from_vec(vec![5i32, 6, 7, 8], vec![2, 2]).unwrap();
        let stacked = Tensor::stack(&[&a, &b]).unwrap();

        assert_eq!(stacked.shape(), &[2, 2, 2]);
        assert_eq!(stacked.as_slice::<i32>().unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn stack_rejects_mixed_dtypes() {
        let a = Tensor::from_vec(vec![1i32], vec![1]).unwrap();
        let b = Tensor::from_vec(vec![1i64], vec![1]).unwrap();
        assert!(matches!(Tensor::stack(&[&a, &b]), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn scalar_has_empty_shape() {
        let tensor = Tensor::scalar(3i64);
        assert_eq!(tensor.ndim(), 0);
        assert_eq!(tensor.len(), 1);
        assert_eq!(tensor.get_f64(&[]).unwrap(), 3.0);
    }
}
