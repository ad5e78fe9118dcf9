//! Benchmarks for bridged ML data pipelines
//!
//! Everything here runs on a synthetic MNIST-like dataset: positional
//! `(image, label)` samples with `u8` images of shape `[1, H, W]`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ml_bridge_core::{FieldValue, Sample};
use ml_bridge_loader::{DataLoader, Dataset, FnDataset, LoaderConfig};
use ml_bridge_transforms::{
    ArrayToTensor, CollationStrategy, NormalizeArray, Pipeline, SequenceToMapping,
};

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Measured epochs
    pub iterations: usize,

    /// Unmeasured epochs run first
    pub warmup_iterations: usize,

    /// Samples in the synthetic dataset
    pub samples: usize,

    /// Samples per batch
    pub batch_size: usize,

    /// Image height and width
    pub image_size: usize,

    /// Worker threads for the sample pipeline
    pub workers: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            warmup_iterations: 1,
            samples: 2048,
            batch_size: 64,
            image_size: 28,
            workers: 4,
        }
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per epoch
    pub avg_time: Duration,

    /// Fastest epoch
    pub min_time: Duration,

    /// Slowest epoch
    pub max_time: Duration,

    /// Bytes held by the largest batch
    pub batch_bytes: usize,

    /// Samples per second
    pub throughput: f64,
}

/// Synthetic dataset of `(image, label)` samples, deterministic per index
pub fn synthetic_mnist(samples: usize, image_size: usize) -> Arc<dyn Dataset> {
    Arc::new(FnDataset::new(samples, move |index| {
        let mut rng = StdRng::seed_from_u64(index as u64);
        let pixels: Vec<u8> = (0..image_size * image_size).map(|_| rng.gen()).collect();
        let image = ArrayD::from_shape_vec(IxDyn(&[1, image_size, image_size]), pixels)
            .map_err(|e| ml_bridge_core::Error::InvalidArgument(e.to_string()))?;
        Ok(Sample::Sequence(vec![
            image.into(),
            FieldValue::Int((index % 10) as i64),
        ]))
    }))
}

/// Loader over the synthetic dataset
///
/// Array collation normalizes whole batches and converts them to tensors
/// afterwards; tensor collation does both per sample before collating.
pub fn mnist_loader(config: &BenchConfig, strategy: CollationStrategy) -> Result<DataLoader> {
    let loader_config = LoaderConfig {
        batch_size: config.batch_size,
        workers: config.workers,
        collation: strategy,
        ..LoaderConfig::default()
    };

    let naming = SequenceToMapping::new(["data", "label"])?;
    let normalize = NormalizeArray::scale("data", 255.0);
    let to_tensor = ArrayToTensor::new().with_float_width(loader_config.float_width);

    let (sample_pipeline, batch_pipeline) = match strategy {
        CollationStrategy::ArrayCollate => (
            Pipeline::builder().stage(naming).build(),
            Pipeline::builder().stage(normalize).stage(to_tensor).build(),
        ),
        CollationStrategy::TensorCollate => (
            Pipeline::builder()
                .stage(naming)
                .stage(normalize)
                .stage(to_tensor)
                .build(),
            Pipeline::new(),
        ),
    };

    DataLoader::new(
        synthetic_mnist(config.samples, config.image_size),
        sample_pipeline,
        batch_pipeline,
        loader_config,
    )
    .context("building loader")
}

/// Run `epoch` repeatedly and time it
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, mut epoch: F) -> Result<BenchResult>
where
    F: FnMut() -> Result<usize>,
{
    ensure!(config.iterations > 0, "at least one measured iteration is required");

    for _ in 0..config.warmup_iterations {
        epoch()?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let mut batch_bytes = 0;
    let start_total = Instant::now();
    for _ in 0..config.iterations {
        let start = Instant::now();
        batch_bytes = batch_bytes.max(epoch()?);
        times.push(start.elapsed());
    }
    let total_time = start_total.elapsed();

    let avg_time = times.iter().sum::<Duration>() / u32::try_from(times.len())?;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();
    let total_samples = config.iterations * config.samples;

    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        batch_bytes,
        throughput: total_samples as f64 / total_time.as_secs_f64(),
    })
}

/// Time full epochs of the synthetic loader under `strategy`
pub fn bench_loader(config: &BenchConfig, strategy: CollationStrategy) -> Result<BenchResult> {
    let loader = mnist_loader(config, strategy)?;
    run_benchmark(&format!("{strategy:?}"), config, || {
        let mut largest = 0;
        for batch in loader.batches() {
            largest = largest.max(batch?.memory_usage());
        }
        Ok(largest)
    })
}
