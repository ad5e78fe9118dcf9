//! Element data types shared by the array and tensor domains

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of an array or tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// Boolean (stored as one byte per value in tensors)
    Bool,

    /// 8-bit unsigned integer
    UInt8,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,
}

impl DType {
    /// Get the size of one element in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            DType::Bool | DType::UInt8 => 1,
            DType::Int32 | DType::Float32 => 4,
            DType::Int64 | DType::Float64 => 8,
        }
    }

    /// Check if this type is a floating point type
    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// Check if this type is an integer type
    pub fn is_integer(self) -> bool {
        matches!(self, DType::UInt8 | DType::Int32 | DType::Int64)
    }

    /// The widest type of the same family
    ///
    /// Integers widen to `Int64`, floats to `Float64`. `Bool` stays `Bool`.
    pub fn widened(self) -> DType {
        match self {
            DType::Bool => DType::Bool,
            DType::UInt8 | DType::Int32 | DType::Int64 => DType::Int64,
            DType::Float32 | DType::Float64 => DType::Float64,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::UInt8 => "u8",
            DType::Int32 => "i32",
            DType::Int64 => "i64",
            DType::Float32 => "f32",
            DType::Float64 => "f64",
        };
        f.write_str(name)
    }
}

/// Width used for floating point data when it crosses into the tensor domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatWidth {
    /// Convert floating point data to `Float32`
    #[default]
    F32,

    /// Convert floating point data to `Float64`
    F64,

    /// Keep the width of the source data
    Preserve,
}

impl FloatWidth {
    /// Resolve the target type for data of the given source type
    ///
    /// Non-float types are returned unchanged.
    pub fn target_for(self, source: DType) -> DType {
        if !source.is_float() {
            return source;
        }
        match self {
            FloatWidth::F32 => DType::Float32,
            FloatWidth::F64 => DType::Float64,
            FloatWidth::Preserve => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(DType::UInt8, DType::Int64)]
    #[test_case(DType::Int32, DType::Int64)]
    #[test_case(DType::Float32, DType::Float64)]
    #[test_case(DType::Bool, DType::Bool)]
    fn widening(input: DType, expected: DType) {
        assert_eq!(input.widened(), expected);
    }

    #[test_case(FloatWidth::F32, DType::Float64, DType::Float32)]
    #[test_case(FloatWidth::F64, DType::Float32, DType::Float64)]
    #[test_case(FloatWidth::Preserve, DType::Float64, DType::Float64)]
    #[test_case(FloatWidth::F32, DType::Int64, DType::Int64)]
    fn float_width_targets(width: FloatWidth, source: DType, expected: DType) {
        assert_eq!(width.target_for(source), expected);
    }

    #[test]
    fn default_float_width_is_single_precision() {
        assert_eq!(FloatWidth::default(), FloatWidth::F32);
    }
}
