//! Benchmark runner comparing collation strategies on synthetic MNIST

use anyhow::Result;
use tracing::info;

use ml_bridge_bench::{bench_loader, mnist_loader, BenchConfig, BenchResult};
use ml_bridge_loader::logging;
use ml_bridge_transforms::CollationStrategy;

fn print_result(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Batch size:   {} bytes", result.batch_bytes);
    println!("  Throughput:   {:.2} samples/sec", result.throughput);
}

fn main() -> Result<()> {
    logging::init()?;

    println!("=== Bridged Pipeline Benchmarks ===");

    let config = BenchConfig::default();

    // Show what one batch looks like before timing anything
    let loader = mnist_loader(&config, CollationStrategy::ArrayCollate)?;
    info!(run_id = %loader.run_id(), batches = loader.num_batches(), "sample loader ready");
    if let Some(batch) = loader.batches().next() {
        println!("\n{}", batch?);
    }

    for strategy in [CollationStrategy::ArrayCollate, CollationStrategy::TensorCollate] {
        print_result(&bench_loader(&config, strategy)?);
    }

    println!("\n=== Worker Scaling ===");
    for workers in [1, 2, 4, 8] {
        let config = BenchConfig {
            workers,
            iterations: 3,
            ..BenchConfig::default()
        };
        let result = bench_loader(&config, CollationStrategy::ArrayCollate)?;
        println!("  {workers} workers: {:.2} samples/sec", result.throughput);
    }

    Ok(())
}
