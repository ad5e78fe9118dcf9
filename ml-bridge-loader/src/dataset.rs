//! Dataset trait and implementations

use std::fmt;

use ml_bridge_core::{Error, Layout, Result, Sample};

/// An indexable collection of samples
pub trait Dataset: Send + Sync {
    /// Number of samples
    fn len(&self) -> usize;

    /// Whether the dataset holds no samples
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load sample `index`
    fn get(&self, index: usize) -> Result<Sample>;

    /// Layout of the samples this dataset produces
    fn layout(&self) -> Layout {
        Layout::Sequence
    }
}

/// A dataset held in memory
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    samples: Vec<Sample>,
    layout: Layout,
}

impl InMemoryDataset {
    /// Create a dataset from samples sharing one layout
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        let layout = samples.first().map_or(Layout::Sequence, Sample::layout);
        if let Some(i) = samples.iter().position(|s| s.layout() != layout) {
            return Err(Error::InvalidArgument(format!(
                "sample {i} is a {:?} but sample 0 is a {layout:?}",
                samples[i].layout()
            )));
        }
        Ok(Self { samples, layout })
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.samples.get(index).cloned().ok_or(Error::IndexOutOfBounds {
            index,
            len: self.samples.len(),
        })
    }

    fn layout(&self) -> Layout {
        self.layout
    }
}

/// A dataset whose samples are produced on demand by a function
pub struct FnDataset<F> {
    len: usize,
    layout: Layout,
    make: F,
}

impl<F> FnDataset<F>
where
    F: Fn(usize) -> Result<Sample> + Send + Sync,
{
    /// Create a dataset of `len` positional samples produced by `make`
    pub fn new(len: usize, make: F) -> Self {
        Self {
            len,
            layout: Layout::Sequence,
            make,
        }
    }

    /// Declare the layout `make` produces
    #[must_use]
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }
}

impl<F> fmt::Debug for FnDataset<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDataset")
            .field("len", &self.len)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl<F> Dataset for FnDataset<F>
where
    F: Fn(usize) -> Result<Sample> + Send + Sync,
{
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Sample> {
        if index >= self.len {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        (self.make)(index)
    }

    fn layout(&self) -> Layout {
        self.layout
    }
}
