//! Phase-space reconstruction of a weighted timing series.
//!
//! Lag embedding pairs each value with the value `lag` steps later. The
//! difference between the two is normalized by the largest absolute
//! difference in the series, pushed through a bounded hyperbolic transform,
//! and turned into an angle with `atan2(transformed, x_n)`.

use serde::Serialize;

use crate::error::AnalysisError;
use crate::weighting::WeightedSample;

/// Margin kept between the `atanh` argument and `±1`.
const ATANH_EPSILON: f64 = 1e-12;

/// `(x_n, x_{n+lag})` for one embedding step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmbeddingPair {
    pub x_n: f64,
    pub x_lag: f64,
}

impl EmbeddingPair {
    pub fn diff(&self) -> f64 {
        self.x_lag - self.x_n
    }
}

/// Angle series of one candidate plus its mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTrajectory {
    pub angles: Vec<f64>,
    pub mean_angle: f64,
    /// True when every embedding difference was zero.
    pub degenerate: bool,
}

impl PhaseTrajectory {
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }
}

/// Build the lag-embedded pairs. Fails when `weighted.len() <= lag`.
pub fn embed(weighted: &[WeightedSample], lag: usize) -> Result<Vec<EmbeddingPair>, AnalysisError> {
    if lag == 0 {
        return Err(AnalysisError::InvalidLag);
    }
    if weighted.len() <= lag {
        return Err(AnalysisError::InsufficientSamples {
            needed: lag + 1,
            got: weighted.len(),
        });
    }
    Ok(weighted
        .iter()
        .zip(&weighted[lag..])
        .map(|(a, b)| EmbeddingPair {
            x_n: a.weighted_value,
            x_lag: b.weighted_value,
        })
        .collect())
}

/// Reconstruct the angle series of a weighted sample sequence.
///
/// With `m = max |x_lag - x_n|`:
/// - `m > 0`: `transformed = atanh(clamp(diff / m * (1 - alpha)))`
/// - `m = 0`: `transformed = diff` (all zeros, flagged as degenerate)
///
/// and `angle = atan2(transformed, x_n)`.
pub fn reconstruct(
    weighted: &[WeightedSample],
    alpha: f64,
    lag: usize,
) -> Result<PhaseTrajectory, AnalysisError> {
    let pairs = embed(weighted, lag)?;

    let max_abs = pairs
        .iter()
        .map(|p| p.diff().abs())
        .fold(0.0f64, f64::max);
    let degenerate = max_abs <= 0.0;
    let limit = 1.0 - ATANH_EPSILON;

    let angles: Vec<f64> = pairs
        .iter()
        .map(|p| {
            let diff = p.diff();
            let transformed = if degenerate {
                diff
            } else {
                ((diff / max_abs) * (1.0 - alpha)).clamp(-limit, limit).atanh()
            };
            transformed.atan2(p.x_n)
        })
        .collect();

    let mean_angle = angles.iter().sum::<f64>() / angles.len() as f64;

    Ok(PhaseTrajectory {
        angles,
        mean_angle,
        degenerate,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
