//! Shape and type adapters between array-domain and tensor-domain stages

use std::collections::HashSet;

use tracing::trace;

use ml_bridge_core::{
    Error, FieldMap, FieldValue, FloatWidth, Result, Sample, StageContract, TransformStage,
};

/// Turns positional samples into named ones
///
/// `SequenceToMapping::new(["data", "label"])` maps `(image, 3)` to
/// `{"data": image, "label": 3}`. Samples that are already mappings pass
/// through untouched.
#[derive(Debug, Clone)]
pub struct SequenceToMapping {
    names: Vec<String>,
}

impl SequenceToMapping {
    /// Create the adapter; names must be non-empty and unique
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::InvalidArgument(
                "sequence-to-mapping needs at least one field name".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(Error::DuplicateField(name.clone()));
            }
        }

        Ok(Self { names })
    }

    /// Field names, in positional order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl TransformStage for SequenceToMapping {
    fn name(&self) -> &str {
        "sequence_to_mapping"
    }

    fn contract(&self) -> StageContract {
        StageContract::shape_adapter()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let values = match sample {
            Sample::Sequence(values) => values,
            mapping @ Sample::Mapping(_) => {
                trace!("sample already in mapping form");
                return Ok(mapping);
            }
        };

        if values.len() != self.names.len() {
            return Err(Error::ShapeMismatch {
                expected: self.names.len(),
                found: values.len(),
            });
        }

        let fields: FieldMap = self.names.iter().cloned().zip(values).collect();
        Ok(Sample::Mapping(fields))
    }
}

/// Converts every reachable array field into a tensor
///
/// Nested lists and maps are walked. Tensors and scalars pass through, so
/// applying the stage twice is the same as applying it once. Float arrays are
/// converted to the configured [`FloatWidth`], `F32` unless changed.
#[derive(Debug, Clone, Default)]
pub struct ArrayToTensor {
    float_width: FloatWidth,
}

impl ArrayToTensor {
    /// Create the adapter with the default float width
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `width` for floating point arrays
    #[must_use]
    pub fn with_float_width(mut self, width: FloatWidth) -> Self {
        self.float_width = width;
        self
    }

    /// Float width this adapter converts to
    pub fn float_width(&self) -> FloatWidth {
        self.float_width
    }

    /// Convert one value, recursing into lists and maps
    pub fn convert_value(&self, path: &str, value: FieldValue) -> Result<FieldValue> {
        match value {
            FieldValue::Array(array) => Ok(FieldValue::Tensor(array.to_tensor(self.float_width)?)),
            FieldValue::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| self.convert_value(&format!("{path}[{i}]"), item))
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::List),
            FieldValue::Map(map) => self.convert_fields(Some(path), map).map(FieldValue::Map),
            FieldValue::Opaque(opaque) => Err(Error::UnsupportedFieldType {
                field: path.to_string(),
                kind: format!("opaque {}", opaque.type_name()),
            }),
            passthrough @ (FieldValue::Tensor(_)
            | FieldValue::Int(_)
            | FieldValue::Float(_)
            | FieldValue::Bool(_)
            | FieldValue::Text(_)) => Ok(passthrough),
        }
    }

    fn convert_fields(&self, prefix: Option<&str>, fields: FieldMap) -> Result<FieldMap> {
        fields
            .into_iter()
            .map(|(name, value)| {
                let path = match prefix {
                    Some(prefix) => format!("{prefix}.{name}"),
                    None => name.clone(),
                };
                Ok((name, self.convert_value(&path, value)?))
            })
            .collect()
    }
}

impl TransformStage for ArrayToTensor {
    fn name(&self) -> &str {
        "array_to_tensor"
    }

    fn contract(&self) -> StageContract {
        StageContract::type_adapter()
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let fields = sample.into_mapping()?;
        self.convert_fields(None, fields).map(Sample::Mapping)
    }
}
