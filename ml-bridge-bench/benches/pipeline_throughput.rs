use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ml_bridge_bench::{mnist_loader, BenchConfig};
use ml_bridge_core::Sample;
use ml_bridge_transforms::{
    ArrayCollate, ArrayToTensor, CollationStrategy, SequenceToMapping, TensorCollate,
    TransformStage,
};

fn named_samples(count: usize) -> Vec<Sample> {
    let dataset = ml_bridge_bench::synthetic_mnist(count, 28);
    let naming = SequenceToMapping::new(["data", "label"]).unwrap();
    (0..count)
        .map(|i| naming.apply(dataset.get(i).unwrap()).unwrap())
        .collect()
}

fn bench_collation(c: &mut Criterion) {
    let mut group = c.benchmark_group("collate");

    for batch_size in [16, 64, 256] {
        let samples = named_samples(batch_size);
        let to_tensor = ArrayToTensor::new();
        let tensors: Vec<Sample> = samples
            .iter()
            .cloned()
            .map(|s| to_tensor.apply(s).unwrap())
            .collect();

        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(BenchmarkId::new("array", batch_size), &samples, |b, samples| {
            let collate = ArrayCollate::new();
            b.iter(|| collate.collate(black_box(samples.clone())).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("tensor", batch_size), &tensors, |b, tensors| {
            let collate = TensorCollate::new();
            b.iter(|| collate.collate(black_box(tensors.clone())).unwrap());
        });
    }

    group.finish();
}

fn bench_epoch(c: &mut Criterion) {
    let mut group = c.benchmark_group("epoch");
    group.sample_size(10);

    let config = BenchConfig {
        samples: 512,
        ..BenchConfig::default()
    };
    group.throughput(Throughput::Elements(config.samples as u64));

    for strategy in [CollationStrategy::ArrayCollate, CollationStrategy::TensorCollate] {
        let loader = mnist_loader(&config, strategy).unwrap();
        group.bench_function(format!("{strategy:?}"), |b| {
            b.iter(|| {
                for batch in loader.batches() {
                    black_box(batch.unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_collation, bench_epoch);
criterion_main!(benches);
