// ============================================================
// Layer 5 — KL Annealing Schedule
// ============================================================
// Scales the KL divergence term by a fraction that rises from
// 0 to 1 over the first `max_epoch` epochs, then holds at 1.
//
//   t = min(counter / max_epoch, 1)
//
//   linear    f(t) = t
//   cosine    f(t) = (1 - cos(πt)) / 2
//   logistic  f(t) = (σ(k(t - ½)) - σ(-k/2)) / (σ(k/2) - σ(-k/2)),  k = max_epoch
//
// The counter is advanced once per finished epoch by the
// training loop; `weight` reads only the counter.
//
// Reference: Bowman et al. (2016) Generating Sentences from a
//            Continuous Space (KL cost annealing)

use std::f64::consts::PI;
use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::{GenError, GenResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnealingShape {
    Linear,
    Cosine,
    Logistic,
}

impl FromStr for AnnealingShape {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear"   => Ok(AnnealingShape::Linear),
            "cosine"   => Ok(AnnealingShape::Cosine),
            "logistic" => Ok(AnnealingShape::Logistic),
            other      => Err(GenError::config(format!(
                "unknown annealing shape '{other}' (expected linear, cosine or logistic)"
            ))),
        }
    }
}

impl fmt::Display for AnnealingShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnnealingShape::Linear   => "linear",
            AnnealingShape::Cosine   => "cosine",
            AnnealingShape::Logistic => "logistic",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct AnnealingSchedule {
    max_epoch: usize,
    shape:     AnnealingShape,
    counter:   usize,
}

impl AnnealingSchedule {
    pub fn new(max_epoch: usize, shape: AnnealingShape) -> GenResult<Self> {
        if max_epoch == 0 {
            return Err(GenError::config("annealing_max_epoch must be at least 1"));
        }
        Ok(Self { max_epoch, shape, counter: 0 })
    }

    /// Start the counter at `counter` instead of 0 (resumed runs).
    pub fn with_counter(mut self, counter: usize) -> Self {
        self.counter = counter;
        self
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn shape(&self) -> AnnealingShape {
        self.shape
    }

    /// Fraction of full strength for the current counter, in [0, 1].
    pub fn fraction(&self) -> f64 {
        let t = (self.counter as f64 / self.max_epoch as f64).min(1.0);
        let f = match self.shape {
            AnnealingShape::Linear => t,
            AnnealingShape::Cosine => (1.0 - (PI * t).cos()) / 2.0,
            AnnealingShape::Logistic => {
                let k     = self.max_epoch as f64;
                let sig   = |x: f64| 1.0 / (1.0 + (-x).exp());
                let low   = sig(-k / 2.0);
                let high  = sig(k / 2.0);
                (sig(k * (t - 0.5)) - low) / (high - low)
            }
        };
        f.clamp(0.0, 1.0)
    }

    /// `raw` scaled by the current fraction. Works for plain floats
    /// and for tensors.
    pub fn weight<T: Mul<f64, Output = T>>(&self, raw: T) -> T {
        raw * self.fraction()
    }

    pub fn advance(&mut self) {
        self.counter += 1;
    }
}
