//! Generalized (Rényi) entropy of a phase-angle distribution.
//!
//! Angles are binned into an equal-width histogram spanning the observed
//! range, empty buckets are dropped, and the surviving masses `p_1..p_k`
//! feed
//!
//! ```text
//! H_q = log2(Σ p_i^q) / (1 - q)        q >= 2
//! H_1 = -Σ p_i log2 p_i                (Shannon, the q -> 1 limit)
//! ```
//!
//! A histogram with at most one occupied bucket has entropy 0.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Outcome of one entropy estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntropyResult {
    /// Rényi order used.
    pub order: u32,
    /// Entropy in bits, always >= 0.
    pub value: f64,
    /// Number of histogram buckets.
    pub bin_count: usize,
    /// Buckets holding at least one angle.
    pub occupied_bins: usize,
}

/// Count angles into `bins` equal-width buckets over `[min, max]`.
///
/// The last bucket is closed on the right. When every angle is equal the
/// whole mass lands in a single bucket. Non-finite angles are ignored.
pub fn histogram(angles: &[f64], bins: usize) -> Vec<u64> {
    let mut counts = vec![0u64; bins];
    if bins == 0 {
        return counts;
    }
    let finite = || angles.iter().copied().filter(|a| a.is_finite());
    let (min, max) = finite().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), a| {
        (lo.min(a), hi.max(a))
    });
    if min > max {
        return counts;
    }
    let width = max - min;
    for a in finite() {
        let idx = if width > 0.0 {
            (((a - min) / width) * bins as f64) as usize
        } else {
            0
        };
        counts[idx.min(bins - 1)] += 1;
    }
    counts
}

/// Normalized masses of the occupied buckets.
pub fn occupied_masses(counts: &[u64]) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return Vec::new();
    }
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| c as f64 / total as f64)
        .collect()
}

/// Shannon entropy in bits of a probability vector.
pub fn shannon(probs: &[f64]) -> f64 {
    let h: f64 = probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.log2())
        .sum();
    h.max(0.0)
}

/// Rényi entropy of order `order` in bits. Order 1 is Shannon entropy.
pub fn renyi(probs: &[f64], order: u32) -> Result<f64, AnalysisError> {
    if order == 0 {
        return Err(AnalysisError::InvalidOrder(order));
    }
    let probs: Vec<f64> = probs.iter().copied().filter(|&p| p > 0.0).collect();
    if probs.len() <= 1 {
        return Ok(0.0);
    }
    if order == 1 {
        return Ok(shannon(&probs));
    }

    // log2 Σ p^q evaluated around the largest mass so high orders cannot
    // underflow to log2(0).
    let q = order as f64;
    let p_max = probs.iter().copied().fold(0.0f64, f64::max);
    let scaled: f64 = probs.iter().map(|&p| (p / p_max).powf(q)).sum();
    let log_sum = q * p_max.log2() + scaled.log2();
    Ok((log_sum / (1.0 - q)).max(0.0))
}

/// Bin `angles` and return their Rényi entropy.
pub fn entropy(angles: &[f64], bins: usize, order: u32) -> Result<EntropyResult, AnalysisError> {
    if bins < 2 {
        return Err(AnalysisError::InvalidBins(bins));
    }
    if order == 0 {
        return Err(AnalysisError::InvalidOrder(order));
    }
    let counts = histogram(angles, bins);
    let probs = occupied_masses(&counts);
    let value = renyi(&probs, order)?;
    if probs.len() <= 1 {
        log::debug!(
            "degenerate angle distribution ({} occupied of {bins} bins), entropy 0",
            probs.len()
        );
    }
    Ok(EntropyResult {
        order,
        value,
        bin_count: bins,
        occupied_bins: probs.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `per_bin` angles in each of `bins` equal buckets over [0, bins).
    fn uniform_angles(bins: usize, per_bin: usize) -> Vec<f64> {
        let mut out = Vec::new();
        for b in 0..bins {
            for _ in 0..per_bin {
                out.push(b as f64 + 0.5);
            }
        }
        // Pin the range to [0, bins] so bucket edges fall on integers.
        out.push(0.0);
        out.push(bins as f64);
        out
    }

    #[test]
    fn test_histogram_edges() {
        let counts = histogram(&[0.0, 0.5, 1.0, 1.5, 2.0], 2);
        // [0,1) holds 0.0 and 0.5; [1,2] holds 1.0, 1.5 and 2.0
        assert_eq!(counts, vec![2, 3]);
    }

    #[test]
    fn test_histogram_constant_input() {
        let counts = histogram(&[1.25; 9], 4);
        assert_eq!(counts.iter().sum::<u64>(), 9);
        assert_eq!(counts.iter().filter(|&&c| c > 0).count(), 1);
    }

    #[test]
    fn test_histogram_ignores_non_finite() {
        let counts = histogram(&[0.0, f64::NAN, 1.0, f64::INFINITY], 2);
        assert_eq!(counts, vec![1, 1]);
    }

    #[test]
    fn test_shannon_uniform_is_log2_bins() {
        for bins in [2usize, 8, 33] {
            let probs = vec![1.0 / bins as f64; bins];
            let h = renyi(&probs, 1).unwrap();
            assert!((h - (bins as f64).log2()).abs() < 1e-6, "bins={bins} h={h}");
        }
    }

    #[test]
    fn test_renyi_uniform_is_log2_bins_any_order() {
        let probs = vec![0.25; 4];
        for order in [2, 3, 33] {
            let h = renyi(&probs, order).unwrap();
            assert!((h - 2.0).abs() < 1e-9, "order={order} h={h}");
        }
    }

    #[test]
    fn test_single_bucket_is_zero() {
        for order in [1, 2, 33] {
            assert_eq!(renyi(&[1.0], order).unwrap(), 0.0);
            let r = entropy(&[0.3; 50], 33, order).unwrap();
            assert_eq!(r.value, 0.0);
            assert_eq!(r.occupied_bins, 1);
        }
    }

    #[test]
    fn test_empty_input_is_zero() {
        let r = entropy(&[], 8, 2).unwrap();
        assert_eq!(r.value, 0.0);
        assert_eq!(r.occupied_bins, 0);
    }

    #[test]
    fn test_order_zero_is_error() {
        assert_eq!(renyi(&[0.5, 0.5], 0), Err(AnalysisError::InvalidOrder(0)));
        assert_eq!(
            entropy(&[0.0, 1.0], 4, 0),
            Err(AnalysisError::InvalidOrder(0))
        );
    }

    #[test]
    fn test_too_few_bins_is_error() {
        assert_eq!(entropy(&[0.0, 1.0], 1, 2), Err(AnalysisError::InvalidBins(1)));
    }

    #[test]
    fn test_entropy_of_uniform_angles() {
        let bins = 8;
        let angles = uniform_angles(bins, 100);
        let r = entropy(&angles, bins, 1).unwrap();
        assert_eq!(r.occupied_bins, bins);
        // The two range pins add one extra count to the first and last bucket.
        assert!((r.value - 3.0).abs() < 1e-3, "h={}", r.value);
    }

    #[test]
    fn test_renyi_decreases_with_order() {
        let probs = [0.5, 0.25, 0.125, 0.125];
        let h1 = renyi(&probs, 1).unwrap();
        let h2 = renyi(&probs, 2).unwrap();
        let h33 = renyi(&probs, 33).unwrap();
        assert!(h1 > h2 && h2 > h33);
        // H_inf -> -log2(p_max) = 1 bit; order 33 is already close.
        assert!((h33 - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_high_order_no_underflow() {
        let probs = vec![1.0 / 1000.0; 1000];
        let h = renyi(&probs, 200).unwrap();
        assert!((h - 1000f64.log2()).abs() < 1e-6);
    }
}
