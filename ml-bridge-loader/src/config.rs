//! Loader configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use ml_bridge_core::FloatWidth;
use ml_bridge_transforms::{ArrayToTensor, CollationStrategy, Collator};

use crate::error::{Error, Result};

/// Configuration for a [`DataLoader`](crate::DataLoader)
///
/// Loaded from JSON; missing keys take their defaults.
///
/// ```json
/// { "batch_size": 32, "shuffle": true, "seed": 7, "collation": "arrayCollate" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Samples per batch
    pub batch_size: usize,

    /// Shuffle sample order every epoch
    pub shuffle: bool,

    /// Seed for shuffling; `None` draws one from the OS
    pub seed: Option<u64>,

    /// Drop the final batch when it is smaller than `batch_size`
    pub drop_last: bool,

    /// Worker threads for the sample pipeline; 0 means one per CPU
    pub workers: usize,

    /// Collation strategy
    pub collation: CollationStrategy,

    /// Float width used when arrays are turned into tensors
    pub float_width: FloatWidth,

    /// Fields collated with widened element types (`i64`/`f64`)
    pub widen: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            shuffle: false,
            seed: None,
            drop_last: false,
            workers: 1,
            collation: CollationStrategy::default(),
            float_width: FloatWidth::default(),
            widen: Vec::new(),
        }
    }
}

impl LoaderConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if let Some(dup) = self
            .widen
            .iter()
            .enumerate()
            .find_map(|(i, f)| self.widen[..i].contains(f).then_some(f))
        {
            return Err(Error::InvalidConfig(format!(
                "field '{dup}' listed twice in widen"
            )));
        }
        Ok(())
    }

    /// Number of worker threads to use
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    /// Collation function selected by `collation`
    pub fn collator(&self) -> Collator {
        Collator::from_strategy(self.collation, &self.widen)
    }

    /// Array to tensor adapter using `float_width`
    pub fn array_to_tensor(&self) -> ArrayToTensor {
        ArrayToTensor::new().with_float_width(self.float_width)
    }
}
