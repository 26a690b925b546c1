//! Deterministic offset prediction from a mean phase angle.
//!
//! `offset = floor((mean_angle / alpha) * scale) & mask` and the prediction
//! is `base | offset`. Several candidates' predictions can be folded into one
//! estimate with an energy-weighted mean that is re-aligned to the same mask.

use crate::config::PredictorConfig;
use crate::error::AnalysisError;

/// Raw masked offset, before `base` is applied.
///
/// Negative products wrap through two's complement before masking, so a
/// negative mean angle still maps into the masked range. NaN maps to 0.
pub fn masked_offset(value: f64, mask: u64) -> u64 {
    (value.floor() as i64 as u64) & mask
}

/// `base | (floor((mean_angle / alpha) * scale) & mask)`.
pub fn predict(mean_angle: f64, alpha: f64, scale: i64, base: u64, mask: u64) -> u64 {
    base | masked_offset((mean_angle / alpha) * scale as f64, mask)
}

/// Energy-weighted mean of `(value, energy)` pairs, re-aligned to `mask`.
///
/// Only the masked part of each value is averaged; `base` is OR'd back in
/// afterwards, so high base bits never pass through floating point. The mean
/// is taken relative to the smallest masked value, which keeps identical
/// predictions exact at any magnitude.
///
/// Fails with `InsufficientSamples` when the energies do not sum to a
/// positive value.
pub fn aggregate(pairs: &[(u64, f64)], base: u64, mask: u64) -> Result<u64, AnalysisError> {
    let energy_sum: f64 = pairs.iter().map(|&(_, e)| e).sum();
    if energy_sum.is_nan() || energy_sum <= 0.0 {
        return Err(AnalysisError::InsufficientSamples {
            needed: 1,
            got: 0,
        });
    }
    let anchor = pairs.iter().map(|&(v, _)| v & mask).min().unwrap_or(0);
    let weighted: f64 = pairs
        .iter()
        .map(|&(v, e)| ((v & mask) - anchor) as f64 * e)
        .sum();
    let delta = (weighted / energy_sum).floor();
    // Float-to-int `as` saturates; a NaN delta contributes nothing.
    let mean = anchor.saturating_add(delta as u64);
    Ok(base | (mean & mask))
}

/// Predictor bound to a decay parameter and mask configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Predictor {
    alpha: f64,
    config: PredictorConfig,
}

impl Predictor {
    pub fn new(alpha: f64, config: PredictorConfig) -> Self {
        Self { alpha, config }
    }

    pub fn predict(&self, mean_angle: f64) -> u64 {
        predict(
            mean_angle,
            self.alpha,
            self.config.scale,
            self.config.base,
            self.config.mask,
        )
    }

    pub fn aggregate(&self, pairs: &[(u64, f64)]) -> Result<u64, AnalysisError> {
        aggregate(pairs, self.config.base, self.config.mask)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_basic() {
        // (0.5 / 0.25) * 65536 = 131072 = 0x20000
        let p = predict(0.5, 0.25, 65_536, 0x7FFF_0000_0000, 0xFFFF_0000);
        assert_eq!(p, 0x7FFF_0002_0000);
    }

    #[test]
    fn test_predict_masks_low_bits() {
        // 1.5 * 4096 = 6144 = 0x1800; low 12 bits masked away.
        let p = predict(1.5, 1.0, 4096, 0, !0xFFF);
        assert_eq!(p, 0x1000);
    }

    #[test]
    fn test_predict_floors() {
        assert_eq!(predict(0.99, 1.0, 1, 0, u64::MAX), 0);
        assert_eq!(predict(1.0, 1.0, 1, 0, u64::MAX), 1);
    }

    #[test]
    fn test_predict_negative_angle_wraps() {
        let p = predict(-0.5, 1.0, 2, 0, 0xFF);
        // floor(-1.0) = -1 -> all ones -> masked to 0xFF
        assert_eq!(p, 0xFF);
    }

    #[test]
    fn test_predict_deterministic() {
        let a = predict(0.123456789, 0.0302011, 65_536, 0, 0xFFFF_0000);
        let b = predict(0.123456789, 0.0302011, 65_536, 0, 0xFFFF_0000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_aggregate_weighted_mean() {
        let pairs = [(0x1_0000u64, 1.0), (0x3_0000u64, 3.0)];
        // (0x10000 + 3 * 0x30000) / 4 = 0x28000 -> masked to 0x20000
        assert_eq!(aggregate(&pairs, 0, 0xFFFF_0000).unwrap(), 0x2_0000);
        assert_eq!(aggregate(&pairs, 0, u64::MAX).unwrap(), 0x2_8000);
    }

    #[test]
    fn test_aggregate_applies_base() {
        let pairs = [(0x5_0000u64, 2.0)];
        assert_eq!(
            aggregate(&pairs, 0xAB00_0000_0000, 0xFFFF_0000).unwrap(),
            0xAB00_0005_0000
        );
    }

    #[test]
    fn test_aggregate_high_base_identical_hits() {
        let base = 0xFFFF_F800_0000_0000;
        let mask = 0xFFFF_0000;
        let v = predict(0.5, 0.25, 65_536, base, mask);
        assert_eq!(v, 0xFFFF_F800_0002_0000);
        assert_eq!(aggregate(&[(v, 1.0), (v, 1.0)], base, mask).unwrap(), v);
        assert_eq!(aggregate(&[(v, 0.2), (v, 7.5)], base, mask).unwrap(), v);
    }

    #[test]
    fn test_aggregate_full_mask_large_values() {
        let v = u64::MAX - 0xFF;
        assert_eq!(aggregate(&[(v, 1.0), (v, 3.0)], 0, u64::MAX).unwrap(), v);
        let pairs = [(v, 1.0), (v + 0x10, 1.0)];
        assert_eq!(aggregate(&pairs, 0, u64::MAX).unwrap(), v + 0x8);
    }

    #[test]
    fn test_aggregate_zero_energy_fails() {
        assert!(matches!(
            aggregate(&[(1, 0.0), (2, 0.0)], 0, u64::MAX),
            Err(AnalysisError::InsufficientSamples { .. })
        ));
        assert!(aggregate(&[], 0, u64::MAX).is_err());
        assert!(aggregate(&[(1, -1.0)], 0, u64::MAX).is_err());
    }

    #[test]
    fn test_predictor_struct_matches_free_fn() {
        let cfg = PredictorConfig::default();
        let p = Predictor::new(0.0302011, cfg);
        assert_eq!(
            p.predict(0.42),
            predict(0.42, 0.0302011, cfg.scale, cfg.base, cfg.mask)
        );
    }
}
