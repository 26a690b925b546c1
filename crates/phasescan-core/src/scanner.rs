//! Boundary scanner: drives the pipeline over a candidate sequence.
//!
//! ```text
//! Idle -> Scanning -> Done(HitBudget | TimeBudget | Exhausted | Cancelled)
//! ```
//!
//! For every candidate the scanner samples the probe, weights the samples,
//! reconstructs the phase trajectory and estimates its entropy. A candidate
//! whose entropy falls inside the configured band becomes a
//! [`CandidateRecord`]. Per-candidate failures are logged and skipped; only an
//! invalid [`ScanConfig`] is fatal, and that is rejected by
//! [`BoundaryScanner::new`] before any probing.
//!
//! Cancellation is observed between candidates, so the report never holds a
//! half-analyzed record.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::config::ScanConfig;
use crate::entropy::{self, EntropyResult};
use crate::error::{AnalysisError, ConfigError};
use crate::phase::{self, PhaseTrajectory};
use crate::predictor::Predictor;
use crate::probe::Probe;
use crate::report::{self, BoundaryReport, CandidateRecord, ExitReason, RunMeta};
use crate::sampler::{SampleBatch, Sampler};
use crate::weighting::{self, LayerWeights};

/// Lifecycle of a [`BoundaryScanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Done(ExitReason),
}

/// Everything computed for one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateAnalysis {
    pub samples: usize,
    pub layer_energy: f64,
    pub trajectory: PhaseTrajectory,
    pub entropy: EntropyResult,
}

impl CandidateAnalysis {
    pub fn mean_angle(&self) -> f64 {
        self.trajectory.mean_angle
    }
}

/// Runs the sampling/analysis pipeline over candidates and classifies hits.
pub struct BoundaryScanner {
    config: ScanConfig,
    sampler: Sampler,
    weights: LayerWeights,
    predictor: Predictor,
    running: Option<Arc<AtomicBool>>,
    state: ScanState,
}

impl BoundaryScanner {
    /// Validate `config` and build a scanner. Nothing is probed here.
    pub fn new(config: ScanConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let weights = LayerWeights::new(config.alpha, config.layer_count)?;
        let sampler = Sampler::new(config.layer_count, config.sampler.clone());
        let predictor = Predictor::new(config.alpha, config.predictor);
        Ok(Self {
            config,
            sampler,
            weights,
            predictor,
            running: None,
            state: ScanState::Idle,
        })
    }

    /// Stop between candidates once `running` is cleared.
    pub fn with_running(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    fn cancelled(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.load(Ordering::SeqCst))
    }

    /// Collect the configured number of samples for one candidate.
    pub fn sample_candidate<C, P>(&self, candidate: &C, probe: &mut P) -> SampleBatch
    where
        C: ?Sized,
        P: Probe<C> + ?Sized,
    {
        self.sampler
            .sample(|| probe.measure(candidate), self.config.iterations)
    }

    /// Weight, embed and measure the entropy of an acquired batch.
    pub fn analyze_batch(&self, batch: SampleBatch) -> Result<CandidateAnalysis, AnalysisError> {
        let needed = self.config.min_samples();
        if batch.len() < needed {
            return Err(AnalysisError::InsufficientSamples {
                needed,
                got: batch.len(),
            });
        }
        let samples = batch.len();
        let weighted = self.weights.apply(batch.into_samples());
        let layer_energy = weighting::layer_energy(&weighted);
        let trajectory = phase::reconstruct(&weighted, self.config.alpha, self.config.lag())?;
        let entropy = entropy::entropy(
            &trajectory.angles,
            self.config.bins(),
            self.config.order(),
        )?;
        Ok(CandidateAnalysis {
            samples,
            layer_energy,
            trajectory,
            entropy,
        })
    }

    /// Sample and analyze a single candidate.
    pub fn analyze_candidate<C, P>(
        &self,
        candidate: &C,
        probe: &mut P,
    ) -> Result<CandidateAnalysis, AnalysisError>
    where
        C: ?Sized,
        P: Probe<C> + ?Sized,
    {
        self.analyze_batch(self.sample_candidate(candidate, probe))
    }

    fn run_meta(&self) -> RunMeta {
        RunMeta {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: report::now_iso8601(),
            alpha: self.config.alpha,
            layer_count: self.config.layer_count,
            iterations_per_candidate: self.config.iterations,
            entropy_band: self.config.entropy_band,
            bins: self.config.bins(),
            order: self.config.order(),
            lag: self.config.lag(),
            max_hits: self.config.max_hits,
            time_budget_secs: self.config.time_budget_secs,
            exit_reason: ExitReason::Exhausted,
            elapsed_ms: 0,
            candidates_scanned: 0,
            candidates_skipped: 0,
            probe_failures: 0,
            phasescan_version: crate::VERSION.to_string(),
        }
    }

    /// Scan `candidates` with `probe` until a budget is hit, the sequence
    /// ends, or the run flag is cleared.
    pub fn scan<C, I, P>(&mut self, candidates: I, probe: &mut P) -> BoundaryReport
    where
        C: Display,
        I: IntoIterator<Item = C>,
        P: Probe<C> + ?Sized,
    {
        let mut report = BoundaryReport::new(self.run_meta());
        let budget = self.config.time_budget();
        let start = Instant::now();
        let mut candidates = candidates.into_iter();
        self.state = ScanState::Scanning;
        log::info!(
            "scan {} started: probe={} alpha={} L={} band=[{}, {}]",
            report.run.id,
            probe.name(),
            self.config.alpha,
            self.config.layer_count,
            self.config.entropy_band[0],
            self.config.entropy_band[1],
        );
        if self.config.iterations < self.config.min_samples() {
            log::warn!(
                "{} iterations per candidate is below the {}-sample minimum; every candidate will be skipped",
                self.config.iterations,
                self.config.min_samples()
            );
        }

        let exit = loop {
            if report.hit_count() >= self.config.max_hits {
                break ExitReason::HitBudget;
            }
            if self.cancelled() {
                break ExitReason::Cancelled;
            }
            if budget.is_some_and(|b| start.elapsed() >= b) {
                break ExitReason::TimeBudget;
            }
            let Some(candidate) = candidates.next() else {
                break ExitReason::Exhausted;
            };

            report.run.candidates_scanned += 1;
            let batch = self.sample_candidate(&candidate, &mut *probe);
            report.run.probe_failures += batch.failures;

            let analysis = match self.analyze_batch(batch) {
                Ok(a) => a,
                Err(e) => {
                    report.run.candidates_skipped += 1;
                    log::warn!("skipping candidate {candidate}: {e}");
                    continue;
                }
            };

            let value = analysis.entropy.value;
            log::debug!(
                "candidate {candidate}: entropy {value:.4} ({}/{} bins occupied)",
                analysis.entropy.occupied_bins,
                analysis.entropy.bin_count
            );
            if !self.config.in_band(value) {
                continue;
            }

            let offset = self.predictor.predict(analysis.mean_angle());
            let record = CandidateRecord::new(
                candidate.to_string(),
                value,
                analysis.mean_angle(),
                analysis.layer_energy,
                offset,
            );
            log::info!(
                "hit {}: {} entropy={value:.4} offset={offset:#x} sig={}",
                report.hit_count() + 1,
                record.candidate_id,
                record.signature
            );
            report.push(record);
        };

        let pairs: Vec<(u64, f64)> = report
            .hits()
            .iter()
            .map(|r| (r.predicted_offset, r.layer_energy))
            .collect();
        report.aggregate_offset = if pairs.is_empty() {
            None
        } else {
            self.predictor.aggregate(&pairs).ok()
        };
        report.run.exit_reason = exit;
        report.run.elapsed_ms = start.elapsed().as_millis() as u64;
        self.state = ScanState::Done(exit);

        log::info!(
            "scan {} done: {exit}, {} hits, {} scanned, {} skipped",
            report.run.id,
            report.hit_count(),
            report.run.candidates_scanned,
            report.run.candidates_skipped
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplerConfig;
    use crate::error::ProbeError;
    use crate::probe::SyntheticProbe;
    use std::time::Duration;

    fn small_config() -> ScanConfig {
        ScanConfig {
            layer_count: 4,
            iterations: 64,
            entropy_band: [0.0, 100.0],
            max_hits: 100,
            sampler: SamplerConfig {
                max_consecutive_failures: 8,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Deterministic varying durations.
    fn varying_probe() -> impl FnMut(&u64) -> Result<Duration, ProbeError> {
        let mut calls = 0u64;
        move |c: &u64| -> Result<Duration, ProbeError> {
            calls += 1;
            Ok(Duration::from_nanos(100 + (calls * 7919 + c) % 97))
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = ScanConfig {
            alpha: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            BoundaryScanner::new(cfg),
            Err(ConfigError::InvalidAlpha(_))
        ));
        let cfg = ScanConfig {
            layer_count: 0,
            ..Default::default()
        };
        assert!(BoundaryScanner::new(cfg).is_err());
    }

    #[test]
    fn test_zero_max_hits_never_probes() {
        let cfg = ScanConfig {
            max_hits: 0,
            ..small_config()
        };
        let mut scanner = BoundaryScanner::new(cfg).unwrap();
        let mut calls = 0u32;
        let mut probe = |_: &u64| -> Result<Duration, ProbeError> {
            calls += 1;
            Ok(Duration::from_nanos(1))
        };
        let report = scanner.scan(0u64..10, &mut probe);
        assert_eq!(report.run.exit_reason, ExitReason::HitBudget);
        assert!(report.is_empty());
        assert_eq!(report.run.candidates_scanned, 0);
        assert_eq!(report.aggregate_offset, None);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_failing_probe_skips_candidates() {
        let mut scanner = BoundaryScanner::new(small_config()).unwrap();
        let mut probe = |_: &u64| -> Result<Duration, ProbeError> { Err(ProbeError::Timeout) };
        let report = scanner.scan(0u64..3, &mut probe);
        assert_eq!(report.run.exit_reason, ExitReason::Exhausted);
        assert!(report.is_empty());
        assert_eq!(report.run.candidates_scanned, 3);
        assert_eq!(report.run.candidates_skipped, 3);
        assert_eq!(report.run.probe_failures, 3 * 8);
    }

    #[test]
    fn test_analyze_reports_insufficient_samples() {
        let scanner = BoundaryScanner::new(small_config()).unwrap();
        let mut probe =
            |_: &u64| -> Result<Duration, ProbeError> { Err(ProbeError::Failed("down".into())) };
        assert_eq!(
            scanner.analyze_candidate(&1u64, &mut probe).unwrap_err(),
            AnalysisError::InsufficientSamples { needed: 5, got: 0 }
        );
    }

    #[test]
    fn test_short_lag_still_needs_layer_count_samples() {
        let cfg = ScanConfig {
            layer_count: 33,
            lag: Some(1),
            iterations: 10,
            entropy_band: [0.0, 100.0],
            ..Default::default()
        };
        let scanner = BoundaryScanner::new(cfg).unwrap();
        assert_eq!(
            scanner
                .analyze_candidate(&1u64, &mut varying_probe())
                .unwrap_err(),
            AnalysisError::InsufficientSamples { needed: 34, got: 10 }
        );
    }

    #[test]
    fn test_undersampled_config_skips_every_candidate() {
        let cfg = ScanConfig {
            iterations: 4,
            ..small_config()
        };
        let mut scanner = BoundaryScanner::new(cfg).unwrap();
        let report = scanner.scan(0u64..3, &mut varying_probe());
        assert_eq!(report.run.exit_reason, ExitReason::Exhausted);
        assert!(report.is_empty());
        assert_eq!(report.run.candidates_skipped, 3);
    }

    #[test]
    fn test_oversized_time_budget_rejected() {
        let cfg = ScanConfig {
            time_budget_secs: Some(1e20),
            ..small_config()
        };
        assert!(matches!(
            BoundaryScanner::new(cfg),
            Err(ConfigError::InvalidTimeBudget(_))
        ));
    }

    #[test]
    fn test_hit_budget_stops_scan() {
        let cfg = ScanConfig {
            max_hits: 2,
            ..small_config()
        };
        let mut scanner = BoundaryScanner::new(cfg).unwrap();
        let mut probe = varying_probe();
        let report = scanner.scan(0u64.., &mut probe);
        assert_eq!(report.run.exit_reason, ExitReason::HitBudget);
        assert_eq!(report.hit_count(), 2);
        assert_eq!(report.run.candidates_scanned, 2);
        assert!(report.aggregate_offset.is_some());
        assert_eq!(scanner.state(), ScanState::Done(ExitReason::HitBudget));
    }

    #[test]
    fn test_out_of_band_candidates_not_recorded() {
        let cfg = ScanConfig {
            entropy_band: [1000.0, 2000.0],
            ..small_config()
        };
        let mut scanner = BoundaryScanner::new(cfg).unwrap();
        let mut probe = varying_probe();
        let report = scanner.scan(0u64..5, &mut probe);
        assert_eq!(report.run.exit_reason, ExitReason::Exhausted);
        assert!(report.is_empty());
        assert_eq!(report.run.candidates_scanned, 5);
        assert_eq!(report.run.candidates_skipped, 0);
        assert_eq!(report.aggregate_offset, None);
    }

    #[test]
    fn test_zero_time_budget_stops_immediately() {
        let cfg = ScanConfig {
            time_budget_secs: Some(0.0),
            ..small_config()
        };
        let mut scanner = BoundaryScanner::new(cfg).unwrap();
        let mut probe = varying_probe();
        let report = scanner.scan(0u64.., &mut probe);
        assert_eq!(report.run.exit_reason, ExitReason::TimeBudget);
        assert_eq!(report.run.candidates_scanned, 0);
    }

    #[test]
    fn test_cleared_run_flag_cancels_before_probing() {
        let running = Arc::new(AtomicBool::new(false));
        let mut scanner = BoundaryScanner::new(small_config())
            .unwrap()
            .with_running(running);
        let mut probe = varying_probe();
        let report = scanner.scan(0u64.., &mut probe);
        assert_eq!(report.run.exit_reason, ExitReason::Cancelled);
        assert_eq!(report.run.candidates_scanned, 0);
    }

    #[test]
    fn test_cancel_finishes_in_flight_candidate() {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let mut scanner = BoundaryScanner::new(small_config())
            .unwrap()
            .with_running(running);
        let mut calls = 0u64;
        let mut probe = move |_: &u64| -> Result<Duration, ProbeError> {
            calls += 1;
            if calls == 10 {
                flag.store(false, Ordering::SeqCst);
            }
            Ok(Duration::from_nanos(100 + (calls * 31) % 17))
        };
        let report = scanner.scan(0u64.., &mut probe);
        assert_eq!(report.run.exit_reason, ExitReason::Cancelled);
        assert_eq!(report.run.candidates_scanned, 1);
        assert_eq!(report.hit_count(), 1);
    }

    #[test]
    fn test_same_seed_same_hits() {
        let cfg = ScanConfig {
            entropy_band: [0.5, 100.0],
            ..small_config()
        };
        let run = || {
            let mut scanner = BoundaryScanner::new(cfg.clone()).unwrap();
            let mut probe = SyntheticProbe::new(99);
            scanner.scan(0x1000u64..0x1008, &mut probe)
        };
        let a = run();
        let b = run();
        assert_eq!(a.hits(), b.hits());
        assert_eq!(a.aggregate_offset, b.aggregate_offset);
        assert_ne!(a.run.id, b.run.id);
    }

    #[test]
    fn test_state_transitions() {
        let mut scanner = BoundaryScanner::new(small_config()).unwrap();
        assert_eq!(scanner.state(), ScanState::Idle);
        let mut probe = varying_probe();
        scanner.scan(Vec::<u64>::new(), &mut probe);
        assert_eq!(scanner.state(), ScanState::Done(ExitReason::Exhausted));
    }

    #[test]
    fn test_records_match_analysis() {
        let mut scanner = BoundaryScanner::new(small_config()).unwrap();
        let report = scanner.scan([7u64], &mut varying_probe());
        assert_eq!(report.hit_count(), 1);
        let hit = &report.hits()[0];
        assert_eq!(hit.candidate_id, "7");

        let analysis = scanner
            .analyze_candidate(&7u64, &mut varying_probe())
            .unwrap();
        assert_eq!(hit.entropy, analysis.entropy.value);
        assert_eq!(hit.mean_angle, analysis.mean_angle());
        assert_eq!(hit.layer_energy, analysis.layer_energy);
        assert_eq!(analysis.samples, 64);
        assert_eq!(
            hit.signature,
            report::signature("7", analysis.entropy.value, analysis.layer_energy)
        );
    }
}
