//! Batched iteration over a dataset through a bridge plan

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use ml_bridge_core::{Batch, Domain, PipelineState, Sample};
use ml_bridge_transforms::{BridgePlan, Pipeline};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::LoaderConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};

/// Statistics from loader execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Samples read from the dataset and prepared
    pub samples_loaded: u64,

    /// Batches handed out
    pub batches_emitted: u64,
}

#[derive(Default)]
struct Counters {
    samples: AtomicU64,
    batches: AtomicU64,
}

/// Loads batches from a dataset
///
/// Each batch is built by reading its samples, running the sample pipeline on
/// every one of them (across worker threads when more than one is
/// configured), collating with the configured strategy and running the batch
/// pipeline on the result. Sample order within a batch always follows the
/// index order, whatever the worker count.
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    plan: BridgePlan,
    config: LoaderConfig,
    seed: u64,
    run_id: Uuid,
    counters: Counters,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl DataLoader {
    /// Create a loader, collating with the strategy named in `config`
    ///
    /// The plan is validated against the dataset's layout with array-domain
    /// data, so ordering mistakes surface here rather than mid-epoch.
    pub fn new(
        dataset: Arc<dyn Dataset>,
        sample_pipeline: Pipeline,
        batch_pipeline: Pipeline,
        config: LoaderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let entry = PipelineState {
            layout: dataset.layout(),
            domain: Domain::Array,
        };
        let plan = BridgePlan::new(entry, sample_pipeline, config.collator(), batch_pipeline)?;
        Self::from_plan(dataset, plan, config)
    }

    /// Create a loader from an assembled plan
    ///
    /// The plan's collation strategy must match `config.collation`.
    pub fn from_plan(
        dataset: Arc<dyn Dataset>,
        plan: BridgePlan,
        config: LoaderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let strategy = plan.collator().strategy();
        if strategy != config.collation {
            return Err(Error::InvalidConfig(format!(
                "plan collates with {strategy:?} but the configuration selects {:?}",
                config.collation
            )));
        }

        let seed = config.seed.unwrap_or_else(rand::random);
        let run_id = Uuid::new_v4();

        #[cfg(feature = "parallel")]
        let pool = {
            let workers = config.worker_count();
            if workers > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("ml-bridge-worker-{i}"))
                    .build()
                    .map_err(|e| Error::InvalidConfig(format!("cannot start {workers} workers: {e}")))?;
                Some(pool)
            } else {
                None
            }
        };

        info!(
            %run_id,
            samples = dataset.len(),
            batch_size = config.batch_size,
            workers = config.worker_count(),
            collation = ?config.collation,
            "created data loader"
        );

        Ok(Self {
            dataset,
            plan,
            config,
            seed,
            run_id,
            counters: Counters::default(),
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Identifier of this loader, attached to its log events
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Loader configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The plan batches go through
    pub fn plan(&self) -> &BridgePlan {
        &self.plan
    }

    /// Number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let len = self.dataset.len();
        let size = self.config.batch_size;
        if self.config.drop_last {
            len / size
        } else {
            len.div_ceil(size)
        }
    }

    /// Dataset indices of every batch of `epoch`, in order
    ///
    /// With shuffling enabled the order is a permutation drawn from the
    /// loader's seed and the epoch number, so a fixed seed repeats exactly.
    pub fn batch_indices(&self, epoch: u64) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.config.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch));
            order.shuffle(&mut rng);
        }

        let size = self.config.batch_size;
        order
            .chunks(size)
            .filter(|chunk| !self.config.drop_last || chunk.len() == size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// Batches of the first epoch
    pub fn batches(&self) -> Batches<'_> {
        self.epoch(0)
    }

    /// Batches of `epoch`
    pub fn epoch(&self, epoch: u64) -> Batches<'_> {
        Batches {
            loader: self,
            chunks: self.batch_indices(epoch).into_iter(),
        }
    }

    /// Build the batch holding the samples at `indices`
    #[instrument(level = "debug", skip_all, fields(run_id = %self.run_id, size = indices.len()))]
    pub fn load_batch(&self, indices: &[usize]) -> Result<Batch> {
        let prepared = self.prepare(indices)?;
        self.counters
            .samples
            .fetch_add(prepared.len() as u64, Ordering::Relaxed);

        let batch = self.plan.finish(prepared)?;
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        debug!(fields = batch.field_count(), "emitted batch");
        Ok(batch)
    }

    /// Counters since the loader was created
    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            samples_loaded: self.counters.samples.load(Ordering::Relaxed),
            batches_emitted: self.counters.batches.load(Ordering::Relaxed),
        }
    }

    fn prepare(&self, indices: &[usize]) -> Result<Vec<Sample>> {
        let load = |&index: &usize| -> ml_bridge_core::Result<Sample> {
            self.plan.prepare(self.dataset.get(index)?)
        };

        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            let prepared = pool.install(|| {
                indices
                    .par_iter()
                    .map(load)
                    .collect::<ml_bridge_core::Result<Vec<_>>>()
            })?;
            return Ok(prepared);
        }

        Ok(indices
            .iter()
            .map(load)
            .collect::<ml_bridge_core::Result<Vec<_>>>()?)
    }
}

impl fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("run_id", &self.run_id)
            .field("samples", &self.dataset.len())
            .field("config", &self.config)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

/// Iterator over the batches of one epoch
#[derive(Debug)]
pub struct Batches<'a> {
    loader: &'a DataLoader,
    chunks: std::vec::IntoIter<Vec<usize>>,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.chunks.next()?;
        Some(self.loader.load_batch(&indices))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Batches<'_> {}
