//! Batches of collated samples

use std::fmt;

use crate::error::{Error, Result};
use crate::sample::Sample;
use crate::value::{FieldMap, FieldValue};

/// Collated samples: one stacked container per field
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Stacked fields
    fields: FieldMap,

    /// Number of samples that were collated
    size: usize,
}

impl Batch {
    /// Create a batch from already stacked fields
    pub fn new(fields: FieldMap, size: usize) -> Self {
        Self { fields, size }
    }

    /// Rebuild a batch from a mapping sample produced by a batch-level stage
    pub fn from_sample(sample: Sample, size: usize) -> Result<Self> {
        Ok(Self::new(sample.into_mapping()?, size))
    }

    /// Number of samples in this batch
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if this batch holds no samples
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Get a field by name
    pub fn get(&self, name: &str) -> Result<&FieldValue> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::InvalidArgument(format!("Batch has no field '{name}'")))
    }

    /// All fields
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Field names, in stable order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Consume the batch and return its fields
    pub fn into_fields(self) -> FieldMap {
        self.fields
    }

    /// View this batch as a mapping sample so batch-level stages can run on it
    pub fn into_sample(self) -> Sample {
        Sample::Mapping(self.fields)
    }

    /// Approximate payload size in bytes
    pub fn memory_usage(&self) -> usize {
        fn value_bytes(value: &FieldValue) -> usize {
            match value {
                FieldValue::Array(a) => a.len() * a.dtype().size_bytes(),
                FieldValue::Tensor(t) => t.size_bytes(),
                FieldValue::Int(_) | FieldValue::Float(_) => 8,
                FieldValue::Bool(_) => 1,
                FieldValue::Text(s) => s.len(),
                FieldValue::List(items) => items.iter().map(value_bytes).sum(),
                FieldValue::Map(map) => map.iter().map(|(k, v)| k.len() + value_bytes(v)).sum(),
                FieldValue::Opaque(_) => 0,
            }
        }

        self.fields.values().map(value_bytes).sum()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Batch: {} samples, {} fields", self.size, self.fields.len())?;
        for (name, value) in &self.fields {
            writeln!(f, "  {:15} {}", name, value.describe())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    fn batch() -> Batch {
        let mut fields = FieldMap::new();
        fields.insert(
            "x".into(),
            Tensor::from_vec(vec![0.0f32; 6], vec![2, 3]).unwrap().into(),
        );
        fields.insert("name".into(), FieldValue::List(vec!["a".into(), "bc".into()]));
        Batch::new(fields, 2)
    }

    #[test]
    fn display_lists_fields() {
        let text = batch().to_string();

        assert!(text.starts_with("Batch: 2 samples, 2 fields"));
        assert!(text.contains("tensor f32[2, 3]"));
    }

    #[test]
    fn memory_usage_counts_payload() {
        assert_eq!(batch().memory_usage(), 24 + 3);
    }

    #[test]
    fn round_trips_through_sample_form() {
        let original = batch();
        let rebuilt = Batch::from_sample(original.clone().into_sample(), 2).unwrap();

        assert_eq!(rebuilt, original);
        assert!(original.get("missing").is_err());
    }
}
