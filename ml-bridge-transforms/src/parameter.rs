//! Random parameters for augmentation stages
//!
//! A [`Parameter`] draws `n` values at a time. [`Parameter::forward`] turns a
//! draw into a tensor of a requested shape and element type, which is how
//! stages receive per-call randomness.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use ml_bridge_core::{DType, Error, Result, Tensor, TensorData};

/// Source of random values
pub trait Parameter: Send + Sync + fmt::Debug {
    /// Draw `n` values
    fn sample(&self, n: usize) -> Vec<f64>;

    /// Draw enough values to fill `size` and return them as a tensor of `dtype`
    ///
    /// An empty `size` yields a scalar tensor.
    fn forward(&self, size: &[usize], dtype: DType) -> Result<Tensor> {
        let n = size.iter().product();
        let mut data = TensorData::zeros(dtype, n);
        for (i, value) in self.sample(n).into_iter().enumerate() {
            data.set_f64(i, value);
        }
        Tensor::from_data(data, size.to_vec())
    }
}

static_assertions::assert_obj_safe!(Parameter);

fn rng_from(seed: Option<u64>) -> Mutex<StdRng> {
    Mutex::new(match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    })
}

/// Draw with the RNG behind `rng`; a poisoned lock still holds a usable RNG
fn draw<T>(rng: &Mutex<StdRng>, f: impl FnOnce(&mut StdRng) -> T) -> T {
    let mut guard = rng.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Uniform values in `[low, high)`
pub struct UniformParameter {
    low: f64,
    high: f64,
    rng: Mutex<StdRng>,
}

impl UniformParameter {
    /// Create a uniform parameter; `low` must be below `high`
    pub fn new(low: f64, high: f64, seed: Option<u64>) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(Error::InvalidArgument(format!(
                "uniform range [{low}, {high}) is empty"
            )));
        }
        Ok(Self {
            low,
            high,
            rng: rng_from(seed),
        })
    }
}

impl fmt::Debug for UniformParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformParameter")
            .field("low", &self.low)
            .field("high", &self.high)
            .finish_non_exhaustive()
    }
}

impl Parameter for UniformParameter {
    fn sample(&self, n: usize) -> Vec<f64> {
        draw(&self.rng, |rng| {
            (0..n).map(|_| rng.gen_range(self.low..self.high)).collect()
        })
    }
}

/// Normally distributed values
pub struct NormalParameter {
    dist: Normal<f64>,
    rng: Mutex<StdRng>,
}

impl NormalParameter {
    /// Create a normal parameter; `std` must be finite and non-negative
    pub fn new(mean: f64, std: f64, seed: Option<u64>) -> Result<Self> {
        if !std.is_finite() || std < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "normal({mean}, {std}): standard deviation must be finite and non-negative"
            )));
        }
        let dist = Normal::new(mean, std)
            .map_err(|e| Error::InvalidArgument(format!("normal({mean}, {std}): {e}")))?;
        Ok(Self {
            dist,
            rng: rng_from(seed),
        })
    }
}

impl fmt::Debug for NormalParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalParameter")
            .field("mean", &self.dist.mean())
            .field("std", &self.dist.std_dev())
            .finish_non_exhaustive()
    }
}

impl Parameter for NormalParameter {
    fn sample(&self, n: usize) -> Vec<f64> {
        draw(&self.rng, |rng| self.dist.sample_iter(rng).take(n).collect())
    }
}

/// Values picked uniformly, with replacement, from a fixed set
pub struct DiscreteParameter {
    choices: Vec<f64>,
    rng: Mutex<StdRng>,
}

impl DiscreteParameter {
    /// Create a discrete parameter over `choices`, which must not be empty
    pub fn new(choices: Vec<f64>, seed: Option<u64>) -> Result<Self> {
        if choices.is_empty() {
            return Err(Error::InvalidArgument(
                "discrete parameter needs at least one choice".into(),
            ));
        }
        Ok(Self {
            choices,
            rng: rng_from(seed),
        })
    }
}

impl fmt::Debug for DiscreteParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscreteParameter")
            .field("choices", &self.choices)
            .finish_non_exhaustive()
    }
}

impl Parameter for DiscreteParameter {
    fn sample(&self, n: usize) -> Vec<f64> {
        draw(&self.rng, |rng| {
            (0..n)
                .map(|_| self.choices[rng.gen_range(0..self.choices.len())])
                .collect()
        })
    }
}

/// Always the same value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantParameter(pub f64);

impl Parameter for ConstantParameter {
    fn sample(&self, n: usize) -> Vec<f64> {
        vec![self.0; n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use test_case::test_case;

    #[test]
    fn uniform_stays_in_range() {
        let p = UniformParameter::new(0.5, 1.5, Some(7)).unwrap();
        assert!(p.sample(1000).iter().all(|v| (0.5..1.5).contains(v)));
    }

    #[test_case(1.0, 1.0 ; "empty range")]
    #[test_case(2.0, 1.0 ; "reversed range")]
    #[test_case(f64::NAN, 1.0 ; "nan bound")]
    fn uniform_rejects_bad_ranges(low: f64, high: f64) {
        assert!(UniformParameter::new(low, high, None).is_err());
    }

    #[test]
    fn seeded_parameters_repeat() {
        let a = NormalParameter::new(0.0, 1.0, Some(42)).unwrap();
        let b = NormalParameter::new(0.0, 1.0, Some(42)).unwrap();
        assert_eq!(a.sample(16), b.sample(16));
    }

    #[test_case(-1.0 ; "negative")]
    #[test_case(-f64::MIN_POSITIVE ; "barely negative")]
    #[test_case(f64::NAN ; "nan")]
    #[test_case(f64::INFINITY ; "infinite")]
    fn normal_rejects_bad_std(std: f64) {
        let err = NormalParameter::new(0.0, std, None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn normal_with_zero_std_returns_mean() {
        let param = NormalParameter::new(2.5, 0.0, Some(3)).unwrap();
        assert_eq!(param.sample(4), vec![2.5; 4]);
    }

    #[test]
    fn discrete_only_returns_choices() {
        let p = DiscreteParameter::new(vec![1.0, 3.0], Some(1)).unwrap();
        assert!(p.sample(100).iter().all(|v| *v == 1.0 || *v == 3.0));
        assert!(DiscreteParameter::new(vec![], None).is_err());
    }

    #[test]
    fn forward_builds_typed_tensor() {
        let p = ConstantParameter(2.0);
        let t = p.forward(&[2, 3], DType::Int64).unwrap();

        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.dtype(), DType::Int64);
        assert_eq!(t.as_slice::<i64>().unwrap(), &[2; 6]);
    }

    #[test]
    fn forward_with_empty_size_is_scalar() {
        let p: Arc<dyn Parameter> = Arc::new(ConstantParameter(0.25));
        let t = p.forward(&[], DType::Float32).unwrap();

        assert_eq!(t.ndim(), 0);
        assert_eq!(t.to_f64_vec(), vec![0.25]);
    }
}
