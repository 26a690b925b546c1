//! Probe sampling: repeated timed calls into a black-box probe.
//!
//! The [`Sampler`] calls a probe until it has recorded the requested number
//! of samples, skipping failed calls. It gives up early only when the probe
//! fails `max_consecutive_failures` times in a row. Each call produces a
//! fresh, ordered `Vec<Sample>`; nothing is shared between candidates.

use std::fmt::Display;
use std::time::Duration;

use serde::Serialize;

use crate::config::SamplerConfig;
use crate::error::ProbeError;
use crate::timing::{clock_ns, wait_until};

/// One recorded probe timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Position in acquisition order, starting at 0.
    pub index: usize,
    /// Elapsed time reported by the probe, in nanoseconds.
    pub raw_duration: f64,
    /// `index mod layer_count`.
    pub layer: usize,
}

/// Result of one [`Sampler::sample`] call.
#[derive(Debug, Clone, Default)]
pub struct SampleBatch {
    /// Recorded samples, strictly in acquisition order.
    pub samples: Vec<Sample>,
    /// Probe calls that failed and were not recorded.
    pub failures: u64,
    /// Total probe calls, excluding warm-up.
    pub attempts: u64,
    /// True when sampling stopped on the consecutive-failure budget.
    pub retries_exhausted: bool,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Hand the samples over to the next stage.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

/// Repeatedly invokes a probe and records its timings.
#[derive(Debug, Clone)]
pub struct Sampler {
    layer_count: usize,
    config: SamplerConfig,
}

impl Sampler {
    /// `layer_count` is clamped to at least 1.
    pub fn new(layer_count: usize, config: SamplerConfig) -> Self {
        Self {
            layer_count: layer_count.max(1),
            config,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Collect up to `iterations` samples from `probe`.
    ///
    /// A failed call is skipped and does not count toward `iterations`.
    /// Sampling stops short only after `max_consecutive_failures` failures
    /// in a row; a probe that always fails yields an empty batch.
    pub fn sample<P>(&self, mut probe: P, iterations: usize) -> SampleBatch
    where
        P: FnMut() -> Result<Duration, ProbeError>,
    {
        for _ in 0..self.config.warmup {
            let _ = std::hint::black_box(probe());
        }

        let pace_ns = self.config.pace().map(|p| p.as_nanos() as u64);
        let mut batch = SampleBatch {
            samples: Vec::with_capacity(iterations),
            ..Default::default()
        };
        let mut consecutive_failures = 0usize;
        let mut next_start = clock_ns();

        while batch.samples.len() < iterations {
            if let Some(pace) = pace_ns {
                wait_until(next_start);
                next_start = clock_ns().saturating_add(pace);
            }

            batch.attempts += 1;
            match probe() {
                Ok(elapsed) => {
                    consecutive_failures = 0;
                    let index = batch.samples.len();
                    batch.samples.push(Sample {
                        index,
                        raw_duration: elapsed.as_nanos() as f64,
                        layer: index % self.layer_count,
                    });
                }
                Err(e) => {
                    batch.failures += 1;
                    consecutive_failures += 1;
                    log::trace!("probe failure {consecutive_failures}: {e}");
                    if consecutive_failures >= self.config.max_consecutive_failures.max(1) {
                        batch.retries_exhausted = true;
                        log::debug!(
                            "probe failed {consecutive_failures} times in a row, \
                             stopping at {}/{iterations} samples",
                            batch.samples.len()
                        );
                        break;
                    }
                }
            }
        }

        batch
    }
}

// ---------------------------------------------------------------------------
// Timed probe adapter
// ---------------------------------------------------------------------------

/// Times a single invocation of an arbitrary fallible operation.
///
/// Wraps any `FnMut() -> Result<T, E>`; the elapsed time is measured with the
/// crate's monotonic clock around the call and the output is passed through
/// `black_box` so the work is not optimized away.
pub struct TimedProbe<F> {
    op: F,
}

impl<F, T, E> TimedProbe<F>
where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    pub fn new(op: F) -> Self {
        Self { op }
    }

    /// Run the operation once and return how long it took.
    pub fn measure(&mut self) -> Result<Duration, ProbeError> {
        let t0 = clock_ns();
        let out = (self.op)();
        let t1 = clock_ns();
        match out {
            Ok(v) => {
                std::hint::black_box(v);
                Ok(Duration::from_nanos(t1.saturating_sub(t0)))
            }
            Err(e) => Err(ProbeError::Failed(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_probe(ns: u64) -> impl FnMut() -> Result<Duration, ProbeError> {
        move || Ok(Duration::from_nanos(ns))
    }

    #[test]
    fn test_sample_collects_requested_count() {
        let sampler = Sampler::new(4, SamplerConfig::default());
        let batch = sampler.sample(fixed_probe(100), 10);
        assert_eq!(batch.len(), 10);
        assert_eq!(batch.failures, 0);
        assert_eq!(batch.attempts, 10);
        assert!(!batch.retries_exhausted);
    }

    #[test]
    fn test_sample_indices_and_layers() {
        let sampler = Sampler::new(3, SamplerConfig::default());
        let batch = sampler.sample(fixed_probe(5), 7);
        let layers: Vec<usize> = batch.samples.iter().map(|s| s.layer).collect();
        assert_eq!(layers, vec![0, 1, 2, 0, 1, 2, 0]);
        for (i, s) in batch.samples.iter().enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(s.raw_duration, 5.0);
        }
    }

    #[test]
    fn test_failures_are_skipped_not_counted() {
        let mut calls = 0u32;
        let probe = || {
            calls += 1;
            if calls % 3 == 0 {
                Err(ProbeError::Failed("flaky".into()))
            } else {
                Ok(Duration::from_nanos(calls as u64))
            }
        };
        let sampler = Sampler::new(2, SamplerConfig::default());
        let batch = sampler.sample(probe, 6);
        assert_eq!(batch.len(), 6);
        assert_eq!(batch.failures, 2);
        assert_eq!(batch.attempts, 8);
        // Indices stay contiguous even though calls 3 and 6 failed.
        let idx: Vec<usize> = batch.samples.iter().map(|s| s.index).collect();
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 5]);
        let raw: Vec<f64> = batch.samples.iter().map(|s| s.raw_duration).collect();
        assert_eq!(raw, vec![1.0, 2.0, 4.0, 5.0, 7.0, 8.0]);
    }

    #[test]
    fn test_always_failing_probe_returns_empty() {
        let config = SamplerConfig {
            max_consecutive_failures: 5,
            ..Default::default()
        };
        let sampler = Sampler::new(4, config);
        let batch = sampler.sample(|| Err(ProbeError::Timeout), 100);
        assert!(batch.is_empty());
        assert_eq!(batch.failures, 5);
        assert!(batch.retries_exhausted);
    }

    #[test]
    fn test_failure_streak_resets_on_success() {
        // Fails twice, succeeds once, forever. Budget of 3 is never hit.
        let mut calls = 0u32;
        let probe = || {
            calls += 1;
            if calls % 3 != 0 {
                Err(ProbeError::Failed("miss".into()))
            } else {
                Ok(Duration::from_nanos(1))
            }
        };
        let config = SamplerConfig {
            max_consecutive_failures: 3,
            ..Default::default()
        };
        let batch = Sampler::new(1, config).sample(probe, 4);
        assert_eq!(batch.len(), 4);
        assert!(!batch.retries_exhausted);
    }

    #[test]
    fn test_warmup_calls_are_not_recorded() {
        let mut calls = 0u64;
        let probe = || {
            calls += 1;
            Ok(Duration::from_nanos(calls))
        };
        let config = SamplerConfig {
            warmup: 3,
            ..Default::default()
        };
        let batch = Sampler::new(1, config).sample(probe, 2);
        assert_eq!(batch.attempts, 2);
        assert_eq!(batch.samples[0].raw_duration, 4.0);
    }

    #[test]
    fn test_pacing_spaces_probes() {
        let config = SamplerConfig {
            pace_us: Some(200),
            ..Default::default()
        };
        let sampler = Sampler::new(1, config);
        let t0 = clock_ns();
        let batch = sampler.sample(fixed_probe(1), 6);
        let elapsed = clock_ns() - t0;
        assert_eq!(batch.len(), 6);
        // Five full gaps between six probe starts.
        assert!(elapsed >= 5 * 200_000, "elapsed {elapsed} ns");
    }

    #[test]
    fn test_timed_probe_measures_work() {
        let mut probe = TimedProbe::new(|| -> Result<u64, String> {
            std::thread::sleep(Duration::from_millis(1));
            Ok(7)
        });
        let d = probe.measure().unwrap();
        assert!(d >= Duration::from_micros(900));
    }

    #[test]
    fn test_timed_probe_maps_errors() {
        let mut probe = TimedProbe::new(|| -> Result<(), &str> { Err("denied") });
        match probe.measure() {
            Err(ProbeError::Failed(msg)) => assert_eq!(msg, "denied"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
