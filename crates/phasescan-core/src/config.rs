//! Scan configuration: defaults, JSON loading, validation.
//!
//! Every numeric threshold of the pipeline lives here rather than being
//! hard-coded. The defaults (`alpha = 0.0302011`, 33 layers, a `[4, 7]` bit
//! entropy band) carry no special meaning; they are starting points for a
//! study.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default decay coefficient.
pub const DEFAULT_ALPHA: f64 = 0.0302011;
/// Default number of weighting layers.
pub const DEFAULT_LAYERS: usize = 33;
/// Default probe iterations per candidate.
pub const DEFAULT_ITERATIONS: usize = 1000;

/// Sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Give up on a candidate after this many consecutive probe failures.
    pub max_consecutive_failures: usize,
    /// Unrecorded probe calls made before sampling starts.
    pub warmup: usize,
    /// Target interval between successive probe starts, in microseconds.
    pub pace_us: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 64,
            warmup: 0,
            pace_us: None,
        }
    }
}

impl SamplerConfig {
    pub fn pace(&self) -> Option<Duration> {
        self.pace_us.map(Duration::from_micros)
    }
}

/// Offset predictor settings: `base | (floor((angle / alpha) * scale) & mask)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub scale: i64,
    pub base: u64,
    pub mask: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            scale: 65_536,
            base: 0,
            mask: 0xFFFF_0000,
        }
    }
}

/// Full configuration of a boundary scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Decay coefficient of the layer weights. Must be finite and > 0.
    pub alpha: f64,
    /// Number of layers `L`. Must be >= 1.
    pub layer_count: usize,
    /// Recorded samples per candidate.
    pub iterations: usize,
    /// Inclusive `[low, high]` entropy window classified as a hit, in bits.
    pub entropy_band: [f64; 2],
    /// Histogram buckets; defaults to `layer_count` (at least 2).
    pub bins: Option<usize>,
    /// Rényi order; defaults to `layer_count`.
    pub order: Option<u32>,
    /// Embedding lag; defaults to `layer_count`.
    pub lag: Option<usize>,
    /// Stop after this many hits.
    pub max_hits: usize,
    /// Stop once the scan has run this long, in seconds.
    pub time_budget_secs: Option<f64>,
    pub sampler: SamplerConfig,
    pub predictor: PredictorConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            layer_count: DEFAULT_LAYERS,
            iterations: DEFAULT_ITERATIONS,
            entropy_band: [4.0, 7.0],
            bins: None,
            order: None,
            lag: None,
            max_hits: 16,
            time_budget_secs: None,
            sampler: SamplerConfig::default(),
            predictor: PredictorConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str::<ScanConfig>(&raw).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            message: format!("failed to parse config JSON: {e}"),
        })
    }

    pub fn bins(&self) -> usize {
        self.bins.unwrap_or(self.layer_count.max(2))
    }

    pub fn order(&self) -> u32 {
        self.order
            .unwrap_or_else(|| u32::try_from(self.layer_count).unwrap_or(u32::MAX))
    }

    pub fn lag(&self) -> usize {
        self.lag.unwrap_or(self.layer_count)
    }

    /// Wall-time budget. `None` when unset or not representable; `validate`
    /// rejects the latter.
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }

    /// Minimum number of samples a candidate needs before it can be analyzed:
    /// one more than both the layer count and the embedding lag.
    pub fn min_samples(&self) -> usize {
        self.lag().max(self.layer_count) + 1
    }

    /// Check every parameter. Called before any probing starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alpha.is_finite() || self.alpha <= 0.0 {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if self.layer_count == 0 {
            return Err(ConfigError::InvalidLayerCount(self.layer_count));
        }
        if self.iterations == 0 {
            return Err(ConfigError::InvalidIterations);
        }
        let [low, high] = self.entropy_band;
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(ConfigError::InvalidEntropyBand { low, high });
        }
        if self.bins() < 2 {
            return Err(ConfigError::InvalidBins(self.bins()));
        }
        if self.order() < 1 {
            return Err(ConfigError::InvalidOrder(self.order()));
        }
        if self.lag() < 1 {
            return Err(ConfigError::InvalidLag(self.lag()));
        }
        if self.predictor.scale == 0 {
            return Err(ConfigError::InvalidScale);
        }
        if let Some(secs) = self.time_budget_secs
            && Duration::try_from_secs_f64(secs).is_err()
        {
            return Err(ConfigError::InvalidTimeBudget(secs));
        }
        Ok(())
    }

    /// Whether `entropy` falls inside the configured band (inclusive).
    pub fn in_band(&self, entropy: f64) -> bool {
        let [low, high] = self.entropy_band;
        entropy >= low && entropy <= high
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
