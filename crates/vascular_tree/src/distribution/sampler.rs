//! Particle size models.
use rand::Rng;
use rand_distr::{Distribution, Normal};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// z-score of the 95th percentile.
const Z95: f64 = 1.65;

/// A Gaussian fixed by its 5th and 95th percentile sizes, truncated below at zero and
/// optionally above at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gaussian90 {
    pub min90: f64,
    pub max90: f64,
    pub max: Option<f64>,
}

impl Gaussian90 {
    pub fn new(min90: f64, max90: f64) -> Self {
        Self {
            min90,
            max90,
            max: None,
        }
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn mean(&self) -> f64 {
        (self.max90 + self.min90) / 2.0
    }

    pub fn sd(&self) -> f64 {
        (self.max90 - self.mean()) / Z95
    }

    pub fn sample(&self, rng: &mut dyn Rng) -> f64 {
        let d = match Normal::new(self.mean(), self.sd()) {
            Ok(normal) => normal.sample(rng).max(0.0),
            Err(_) => self.mean(),
        };
        match self.max {
            Some(max) => d.min(max),
            None => d,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min90 > 0.0) || !(self.max90 >= self.min90) {
            return Err(Error::InvalidConfig(
                "size percentiles must satisfy 0 < min90 <= max90".into(),
            ));
        }
        if let Some(max) = self.max {
            if !(max >= self.max90) {
                return Err(Error::InvalidConfig("max size must be >= max90".into()));
            }
        }
        Ok(())
    }
}

/// Size distribution of injected particles.
///
/// The per-particle modes compare a draw directly with vessel radii. Concurrent mode reads it
/// as a diameter and halves it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SphereSizes {
    Fixed(f64),
    Gaussian90(Gaussian90),
}

impl Default for SphereSizes {
    fn default() -> Self {
        Self::Gaussian90(Gaussian90::new(20e-6, 40e-6))
    }
}

impl SphereSizes {
    pub fn sample(&self, rng: &mut dyn Rng) -> f64 {
        match self {
            Self::Fixed(d) => *d,
            Self::Gaussian90(g) => g.sample(rng),
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Self::Fixed(d) => *d,
            Self::Gaussian90(g) => g.mean(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed(d) if !(*d >= 0.0) || !d.is_finite() => {
                Err(Error::InvalidConfig("fixed size must be finite and >= 0".into()))
            }
            Self::Fixed(_) => Ok(()),
            Self::Gaussian90(g) => g.validate(),
        }
    }
}
