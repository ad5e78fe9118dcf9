//! Ordered pipelines of transform stages

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use ml_bridge_core::{
    Batch, Error, Layout, PipelineState, Result, Sample, StageContract, TransformStage,
};

use crate::collate::Collator;

/// An ordered chain of stages executed as a single stage
///
/// Stages run strictly in the order they were added. Cloning a pipeline is
/// cheap: stages are shared and immutable, so independent workers can each
/// hold a copy.
#[derive(Clone, Default)]
pub struct Pipeline {
    /// The stages in this pipeline
    stages: Vec<Arc<dyn TransformStage>>,
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync, Clone);

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a pipeline
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if this pipeline has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names, in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Walk the stage contracts starting from `entry`
    ///
    /// Returns the state after the last stage, or an `OrderingViolation`
    /// naming the first stage whose requirements are not met.
    pub fn validate(&self, entry: PipelineState) -> Result<PipelineState> {
        self.stages
            .iter()
            .try_fold(entry, |state, stage| stage.validate(state))
    }

    /// Run every stage on `sample`, in order
    ///
    /// Stops at the first failing stage; the error is wrapped with the
    /// stage name.
    pub fn run(&self, sample: Sample) -> Result<Sample> {
        let mut current = sample;
        for stage in &self.stages {
            trace!(stage = stage.name(), layout = ?current.layout(), "applying stage");
            current = stage.apply(current).map_err(|e| e.in_stage(stage.name()))?;
        }
        Ok(current)
    }

    /// Run every stage on a batch viewed as a mapping sample
    pub fn run_batch(&self, batch: Batch) -> Result<Batch> {
        if self.is_empty() {
            return Ok(batch);
        }
        let size = batch.len();
        let sample = self.run(batch.into_sample())?;
        Batch::from_sample(sample, size)
    }
}

impl TransformStage for Pipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    /// Combined contract of the chain
    ///
    /// A requirement of a later stage is exposed only if no earlier stage
    /// already establishes the matching layout or domain.
    fn contract(&self) -> StageContract {
        self.stages.iter().fold(StageContract::any(), |acc, stage| {
            let next = stage.contract();
            StageContract {
                input_layout: acc
                    .input_layout
                    .or(if acc.output_layout.is_none() { next.input_layout } else { None }),
                input_domain: acc
                    .input_domain
                    .or(if acc.output_domain.is_none() { next.input_domain } else { None }),
                output_layout: next.output_layout.or(acc.output_layout),
                output_domain: next.output_domain.or(acc.output_domain),
            }
        })
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        self.run(sample)
    }

    /// Checks every inner stage; the combined contract alone can hide a
    /// misplaced stage behind an earlier one
    fn validate(&self, state: PipelineState) -> Result<PipelineState> {
        Pipeline::validate(self, state)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn TransformStage>>,
}

impl PipelineBuilder {
    /// Append a stage
    #[must_use]
    pub fn stage<S: TransformStage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append an already shared stage
    #[must_use]
    pub fn shared_stage(mut self, stage: Arc<dyn TransformStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Finish without checking stage order
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }

    /// Finish, checking stage order against data entering in `entry` state
    pub fn build_validated(self, entry: PipelineState) -> Result<Pipeline> {
        let pipeline = self.build();
        pipeline.validate(entry)?;
        Ok(pipeline)
    }
}

/// Sample pipeline, collation and batch pipeline as one unit
///
/// This is the shape of a bridged loader: positional samples are named and
/// augmented per sample, collated, and then augmented per batch. The plan is
/// validated once, at construction.
#[derive(Debug, Clone)]
pub struct BridgePlan {
    sample_pipeline: Pipeline,
    collator: Collator,
    batch_pipeline: Pipeline,
    output: PipelineState,
}

impl BridgePlan {
    /// Validate and assemble a plan for data entering in `entry` state
    pub fn new(
        entry: PipelineState,
        sample_pipeline: Pipeline,
        collator: Collator,
        batch_pipeline: Pipeline,
    ) -> Result<Self> {
        let before_collation = sample_pipeline.validate(entry)?;
        if before_collation.layout != Layout::Mapping {
            return Err(Error::OrderingViolation(
                "collation requires mapping samples; end the sample pipeline with named fields"
                    .into(),
            ));
        }

        let strategy = collator.strategy();
        let required = strategy.output_domain();
        if before_collation.domain != required {
            return Err(Error::OrderingViolation(format!(
                "{strategy:?} requires {required} samples but the sample pipeline emits {}",
                before_collation.domain
            )));
        }

        let output = batch_pipeline.validate(PipelineState::mapping(required))?;
        debug!(
            sample_stages = sample_pipeline.len(),
            batch_stages = batch_pipeline.len(),
            ?strategy,
            output_domain = %output.domain,
            "validated bridge plan"
        );

        Ok(Self {
            sample_pipeline,
            collator,
            batch_pipeline,
            output,
        })
    }

    /// Per-sample stages
    pub fn sample_pipeline(&self) -> &Pipeline {
        &self.sample_pipeline
    }

    /// Collation function
    pub fn collator(&self) -> &Collator {
        &self.collator
    }

    /// Per-batch stages
    pub fn batch_pipeline(&self) -> &Pipeline {
        &self.batch_pipeline
    }

    /// State of the batches this plan emits
    pub fn output(&self) -> PipelineState {
        self.output
    }

    /// Run the per-sample stages on one sample
    pub fn prepare(&self, sample: Sample) -> Result<Sample> {
        self.sample_pipeline.run(sample)
    }

    /// Collate prepared samples and run the per-batch stages
    pub fn finish(&self, prepared: Vec<Sample>) -> Result<Batch> {
        let batch = self.collator.collate(prepared)?;
        self.batch_pipeline.run_batch(batch)
    }

    /// Run the whole plan over one batch worth of raw samples
    pub fn run(&self, samples: Vec<Sample>) -> Result<Batch> {
        let prepared = samples
            .into_iter()
            .map(|s| self.prepare(s))
            .collect::<Result<Vec<_>>>()?;
        self.finish(prepared)
    }
}
