//! Samples in positional or named form

use crate::error::{Error, Result};
use crate::value::{FieldMap, FieldValue};

/// Structural layout of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Ordered positional fields, e.g. `(data, label)`
    Sequence,

    /// Named fields
    Mapping,
}

/// One unit of data flowing through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// Ordered positional fields
    Sequence(Vec<FieldValue>),

    /// Named fields
    Mapping(FieldMap),
}

impl Sample {
    /// Build a mapping sample from `(name, value)` pairs
    ///
    /// Fails with `DuplicateField` if a name repeats.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self>
    where
        K: Into<String>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut fields = FieldMap::new();
        for (name, value) in pairs {
            let name = name.into();
            if fields.contains_key(&name) {
                return Err(Error::DuplicateField(name));
            }
            fields.insert(name, value.into());
        }
        Ok(Sample::Mapping(fields))
    }

    /// Layout of this sample
    pub fn layout(&self) -> Layout {
        match self {
            Sample::Sequence(_) => Layout::Sequence,
            Sample::Mapping(_) => Layout::Mapping,
        }
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        match self {
            Sample::Sequence(values) => values.len(),
            Sample::Mapping(fields) => fields.len(),
        }
    }

    /// Check if this sample has no fields
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the named fields, if this sample is a mapping
    pub fn as_mapping(&self) -> Option<&FieldMap> {
        match self {
            Sample::Mapping(fields) => Some(fields),
            Sample::Sequence(_) => None,
        }
    }

    /// Take the named fields
    ///
    /// Fails with `OrderingViolation` for a positional sample: some stage
    /// that needs named fields ran before the sequence was converted.
    pub fn into_mapping(self) -> Result<FieldMap> {
        match self {
            Sample::Mapping(fields) => Ok(fields),
            Sample::Sequence(values) => Err(Error::OrderingViolation(format!(
                "expected a mapping sample, got a sequence of {} fields; convert it to a mapping first",
                values.len()
            ))),
        }
    }

    /// Look up a named field
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.as_mapping().and_then(|fields| fields.get(name))
    }

    /// Field names of a mapping sample, in stable order
    pub fn field_names(&self) -> Vec<String> {
        self.as_mapping()
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl From<FieldMap> for Sample {
    fn from(fields: FieldMap) -> Self {
        Sample::Mapping(fields)
    }
}

impl From<Vec<FieldValue>> for Sample {
    fn from(values: Vec<FieldValue>) -> Self {
        Sample::Sequence(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pairs_rejects_duplicates() {
        let err = Sample::from_pairs([("x", 1i64), ("x", 2i64)]).unwrap_err();
        assert_eq!(err, Error::DuplicateField("x".into()));
    }

    #[test]
    fn sequence_cannot_be_read_as_mapping() {
        let sample = Sample::Sequence(vec![FieldValue::Int(1)]);

        assert_eq!(sample.layout(), Layout::Sequence);
        assert!(sample.get("x").is_none());
        assert!(sample.field_names().is_empty());
        assert!(matches!(sample.into_mapping(), Err(Error::OrderingViolation(_))));
    }

    #[test]
    fn field_names_are_sorted() {
        let sample = Sample::from_pairs([("label", 1i64), ("data", 2i64)]).unwrap();
        assert_eq!(sample.field_names(), vec!["data", "label"]);
    }
}
