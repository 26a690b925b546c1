//! # phasescan-core
//!
//! **Timing side-channel characterization through phase-space entropy.**
//!
//! `phasescan-core` turns repeated timings of a black-box probe into a
//! per-candidate entropy score and classifies candidates whose score falls in
//! a configured band. It never touches a target itself: every measurement goes
//! through a [`Probe`] supplied by the caller.
//!
//! ## Quick Start
//!
//! ```no_run
//! use phasescan_core::{BoundaryScanner, ScanConfig, SyntheticProbe};
//!
//! let mut scanner = BoundaryScanner::new(ScanConfig::default()).unwrap();
//! let mut probe = SyntheticProbe::new(42);
//! let report = scanner.scan(0x1000u64..0x1100, &mut probe);
//! println!("{} hits, exit: {}", report.hit_count(), report.run.exit_reason);
//! ```
//!
//! ## Architecture
//!
//! Candidates → Sampler → Layer weights → Phase reconstruction → Rényi entropy
//! → band check → (hit) Predictor → Report
//!
//! - [`sampler`]: ordered timings, failure budget, optional pacing.
//! - [`weighting`]: `e^{-α·(i mod L)}` layer weights and cascade sums.
//! - [`phase`]: lag embedding and bounded `atanh` angle transform.
//! - [`entropy`]: histogram plus Rényi/Shannon entropy.
//! - [`predictor`]: masked offset prediction and energy-weighted aggregate.
//! - [`scanner`]: the state machine tying it together.
//! - [`timing`]: monotonic clock, pacing and decay-scaled wait calibration.
//!
//! The pipeline is single-threaded and holds no state across candidates.

pub mod candidates;
pub mod config;
pub mod entropy;
pub mod error;
pub mod phase;
pub mod predictor;
pub mod probe;
pub mod report;
pub mod sampler;
pub mod scanner;
pub mod timing;
pub mod weighting;

pub use candidates::{AddressRange, Candidate};
pub use config::{PredictorConfig, SamplerConfig, ScanConfig};
pub use entropy::EntropyResult;
pub use error::{AnalysisError, ConfigError, ProbeError};
pub use phase::PhaseTrajectory;
pub use predictor::Predictor;
pub use probe::{
    ConnectProbe, HashProbe, Probe, ProbeInfo, StrideProbe, SyntheticProbe, builtin_probes,
};
pub use report::{BoundaryReport, CandidateRecord, ExitReason, RunMeta};
pub use sampler::{Sample, SampleBatch, Sampler, TimedProbe};
pub use scanner::{BoundaryScanner, CandidateAnalysis, ScanState};
pub use timing::DecayCalibration;
pub use weighting::{LayerWeights, WeightedSample};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
