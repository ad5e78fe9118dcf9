//! Data loading for bridged ML data pipelines
//!
//! A [`DataLoader`] reads samples from a [`Dataset`], runs them through the
//! sample pipeline, collates them with the strategy named in its
//! [`LoaderConfig`] and runs the batch pipeline on the result.

#![warn(missing_docs)]

pub mod config;
pub mod dataset;
mod error;
pub mod loader;
pub mod logging;

pub use config::LoaderConfig;
pub use dataset::{Dataset, FnDataset, InMemoryDataset};
pub use error::{Error, Result};
pub use loader::{Batches, DataLoader, LoaderStats};
pub use logging::{LogFormat, LoggingConfig};

// Re-export the pipeline building blocks
pub use ml_bridge_core::{Batch, FieldValue, Sample};
pub use ml_bridge_transforms::{BridgePlan, CollationStrategy, Pipeline};

static_assertions::assert_impl_all!(DataLoader: Send, Sync);
