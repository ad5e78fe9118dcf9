//! Field values carried by samples and batches

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ndarray::ArrayD;

use crate::array::ArrayValue;
use crate::tensor::Tensor;

/// Named fields of a mapping-shaped sample or batch
///
/// Keys are unique by construction and iterate in a stable order.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A value the bridge carries without being able to interpret it
///
/// Conversions and collation reject opaque values with
/// `UnsupportedFieldType`; stages that know the concrete type can downcast.
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    /// Wrap an arbitrary value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    /// Name of the wrapped type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the wrapped value as `T`, if that is its type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>", self.type_name)
    }
}

/// One field of a sample
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Array-domain numeric data
    Array(ArrayValue),

    /// Tensor-domain numeric data
    Tensor(Tensor),

    /// Integer scalar
    Int(i64),

    /// Floating point scalar
    Float(f64),

    /// Boolean scalar
    Bool(bool),

    /// Text
    Text(String),

    /// Nested ordered values
    List(Vec<FieldValue>),

    /// Nested named values
    Map(FieldMap),

    /// Uninterpretable caller data
    Opaque(OpaqueValue),
}

impl FieldValue {
    /// Short description of the kind and shape of this value
    pub fn describe(&self) -> String {
        match self {
            FieldValue::Array(a) => format!("array {}", a.shape_family()),
            FieldValue::Tensor(t) => format!("tensor {}", t.shape_family()),
            FieldValue::Int(_) => "int".to_string(),
            FieldValue::Float(_) => "float".to_string(),
            FieldValue::Bool(_) => "bool".to_string(),
            FieldValue::Text(_) => "text".to_string(),
            FieldValue::List(items) => format!("list of {}", items.len()),
            FieldValue::Map(map) => format!("map {:?}", map.keys().collect::<Vec<_>>()),
            FieldValue::Opaque(o) => format!("opaque {}", o.type_name()),
        }
    }

    /// Check if this value or any nested value is array-typed
    pub fn contains_array(&self) -> bool {
        match self {
            FieldValue::Array(_) => true,
            FieldValue::List(items) => items.iter().any(FieldValue::contains_array),
            FieldValue::Map(map) => map.values().any(FieldValue::contains_array),
            _ => false,
        }
    }

    /// Check if this value or any nested value is tensor-typed
    pub fn contains_tensor(&self) -> bool {
        match self {
            FieldValue::Tensor(_) => true,
            FieldValue::List(items) => items.iter().any(FieldValue::contains_tensor),
            FieldValue::Map(map) => map.values().any(FieldValue::contains_tensor),
            _ => false,
        }
    }

    /// Borrow as an array
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            FieldValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Borrow as a tensor
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            FieldValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Read as an integer scalar
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<ArrayValue> for FieldValue {
    fn from(value: ArrayValue) -> Self {
        FieldValue::Array(value)
    }
}

impl<T> From<ArrayD<T>> for FieldValue
where
    ArrayValue: From<ArrayD<T>>,
{
    fn from(array: ArrayD<T>) -> Self {
        FieldValue::Array(ArrayValue::from(array))
    }
}

impl From<Tensor> for FieldValue {
    fn from(value: Tensor) -> Self {
        FieldValue::Tensor(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::List(value)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(value: FieldMap) -> Self {
        FieldValue::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn nested_arrays_are_found() {
        let mut inner = FieldMap::new();
        inner.insert("mask".into(), ArrayD::<u8>::zeros(IxDyn(&[2, 2])).into());
        let value = FieldValue::List(vec![FieldValue::Int(1), FieldValue::Map(inner)]);

        assert!(value.contains_array());
        assert!(!value.contains_tensor());
    }

    #[test]
    fn opaque_values_downcast_and_compare_by_identity() {
        let value = OpaqueValue::new(vec![1u32, 2]);
        let same = value.clone();
        let other = OpaqueValue::new(vec![1u32, 2]);

        assert_eq!(value.downcast_ref::<Vec<u32>>(), Some(&vec![1, 2]));
        assert!(value.downcast_ref::<String>().is_none());
        assert_eq!(value, same);
        assert_ne!(value, other);
        assert!(value.type_name().contains("Vec<u32>"));
    }

    #[test]
    fn describe_reports_shape_family() {
        let value = FieldValue::from(ArrayD::<f32>::zeros(IxDyn(&[1, 28, 28])));
        assert_eq!(value.describe(), "array f32[1, 28, 28]");
    }
}
