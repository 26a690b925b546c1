//! Error taxonomy for the characterization pipeline.
//!
//! Three tiers, matching where each failure is handled:
//! - [`ConfigError`]: fatal, raised before any probing begins.
//! - [`ProbeError`]: a single probe call failed; the sample is dropped.
//! - [`AnalysisError`]: a single candidate could not be analyzed; the
//!   scanner skips it and keeps going.

use std::path::PathBuf;

/// Invalid run configuration. Aborts a scan before the first probe.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("alpha must be a finite value > 0, got {0}")]
    InvalidAlpha(f64),

    #[error("layer count must be >= 1, got {0}")]
    InvalidLayerCount(usize),

    #[error("iterations per candidate must be > 0")]
    InvalidIterations,

    #[error("entropy band is empty or not finite: low {low} > high {high}")]
    InvalidEntropyBand { low: f64, high: f64 },

    #[error("entropy order must be >= 1, got {0}")]
    InvalidOrder(u32),

    #[error("histogram needs at least 2 bins, got {0}")]
    InvalidBins(usize),

    #[error("embedding lag must be >= 1, got {0}")]
    InvalidLag(usize),

    #[error("predictor scale must be nonzero")]
    InvalidScale,

    #[error("time budget must be a finite, non-negative number of seconds, got {0}")]
    InvalidTimeBudget(f64),

    #[error("wait target must be a finite, non-negative number of nanoseconds, got {0}")]
    InvalidWaitTarget(f64),

    #[error("invalid candidate specification: {0}")]
    InvalidCandidates(String),

    #[error("failed to load config from {path}: {message}")]
    Load { path: PathBuf, message: String },
}

/// A single probe invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe failed: {0}")]
    Failed(String),

    #[error("probe timed out")]
    Timeout,

    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe cannot handle target: {0}")]
    Unsupported(String),
}

/// Per-candidate analysis failure. Recoverable at the scanner boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("insufficient samples: need at least {needed}, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    #[error("entropy order must be >= 1, got {0}")]
    InvalidOrder(u32),

    #[error("histogram needs at least 2 bins, got {0}")]
    InvalidBins(usize),

    #[error("embedding lag must be >= 1")]
    InvalidLag,
}
