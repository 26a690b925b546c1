//! Exponential layer weighting.
//!
//! Sample `i` is weighted by `e^{-alpha * (i mod L)}`: the first sample of
//! every layer cycle keeps full weight and later layers are progressively
//! de-emphasized. Weights are computed once per `(alpha, L)` pair and looked
//! up per sample.

use serde::Serialize;

use crate::error::ConfigError;
use crate::sampler::Sample;

/// A sample with its layer weight applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedSample {
    pub sample: Sample,
    /// `e^{-alpha * layer}`, in `[0, 1]`.
    pub weight: f64,
    /// `raw_duration * weight`.
    pub weighted_value: f64,
}

/// Precomputed decay factors for `L` layers.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    alpha: f64,
    weights: Vec<f64>,
}

impl LayerWeights {
    /// Build the weight table. `alpha` must be finite and > 0, `layer_count >= 1`.
    pub fn new(alpha: f64, layer_count: usize) -> Result<Self, ConfigError> {
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        if layer_count == 0 {
            return Err(ConfigError::InvalidLayerCount(layer_count));
        }
        let weights = (0..layer_count)
            .map(|d| (-alpha * d as f64).exp())
            .collect();
        Ok(Self { alpha, weights })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn layer_count(&self) -> usize {
        self.weights.len()
    }

    /// Weight of layer `layer`; wraps modulo the layer count.
    pub fn weight(&self, layer: usize) -> f64 {
        self.weights[layer % self.weights.len()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    /// Apply the weights to a sample sequence, consuming it.
    pub fn apply(&self, samples: Vec<Sample>) -> Vec<WeightedSample> {
        samples
            .into_iter()
            .map(|sample| {
                let weight = self.weight(sample.index);
                WeightedSample {
                    sample,
                    weight,
                    weighted_value: sample.raw_duration * weight,
                }
            })
            .collect()
    }
}

/// Weight a sample sequence in one call.
pub fn weight(
    samples: Vec<Sample>,
    alpha: f64,
    layer_count: usize,
) -> Result<Vec<WeightedSample>, ConfigError> {
    Ok(LayerWeights::new(alpha, layer_count)?.apply(samples))
}

/// Mean weighted value of a series; 0 for an empty one.
pub fn layer_energy(weighted: &[WeightedSample]) -> f64 {
    if weighted.is_empty() {
        return 0.0;
    }
    weighted.iter().map(|w| w.weighted_value).sum::<f64>() / weighted.len() as f64
}

// ---------------------------------------------------------------------------
// Cascade sums
// ---------------------------------------------------------------------------

/// Direct summation `Σ_{d=0}^{L-1} e^{-αd}`.
pub fn cascade_sum(alpha: f64, layer_count: usize) -> f64 {
    (0..layer_count).map(|d| (-alpha * d as f64).exp()).sum()
}

/// Exact geometric closed form of [`cascade_sum`]: `(1 - e^{-αL}) / (1 - e^{-α})`.
pub fn cascade_closed_form(alpha: f64, layer_count: usize) -> f64 {
    let l = layer_count as f64;
    // -expm1(-x) == 1 - e^{-x} without cancellation for small x.
    (-(-alpha * l).exp_m1()) / (-(-alpha).exp_m1())
}

/// Continuous approximation `∫_0^L e^{-αd} dd = (1 - e^{-αL}) / α`.
pub fn cascade_integral(alpha: f64, layer_count: usize) -> f64 {
    (-(-alpha * layer_count as f64).exp_m1()) / alpha
}

/// Energy carried past layer 0: `Σ_{d=1}^{L} e^{-αd}`.
///
/// For `α = 0.0302011, L = 33` this is ≈ 20.58.
pub fn cascade_energy(alpha: f64, layer_count: usize) -> f64 {
    (1..=layer_count).map(|d| (-alpha * d as f64).exp()).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
