use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::{Data, OrderStatistics, Statistics};

use phasescan_core::timing::{self, DecayCalibration};
use phasescan_core::{Candidate, Sampler, SamplerConfig};

use super::{EXIT_CONFIG, EXIT_NO_SAMPLES, EXIT_OK, ProbeOptions, make_probe};

pub struct CalibrateCommandConfig<'a> {
    pub probe: &'a str,
    pub candidate: &'a str,
    pub iterations: usize,
    pub warmup: usize,
    pub pace_us: Option<u64>,
    pub probe_options: ProbeOptions,
    /// Decay coefficient for the wait calibration.
    pub alpha: f64,
    pub layers: usize,
    pub wait_target_ns: f64,
    /// Spin-waits per layer; 0 skips the wait calibration.
    pub waits_per_layer: usize,
    pub output_path: Option<&'a str>,
}

/// Summary statistics of one calibration run, in nanoseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub p95: f64,
    /// Half-width of the 95% normal confidence interval of the mean.
    pub ci95: f64,
}

/// Compute [`TimingStats`]; `None` for an empty input.
pub fn summarize(durations: &[f64]) -> Option<TimingStats> {
    if durations.is_empty() {
        return None;
    }
    let count = durations.len();
    let mean = durations.iter().mean();
    let std_dev = if count > 1 {
        durations.iter().std_dev()
    } else {
        0.0
    };
    let (min, max) = durations
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &d| {
            (lo.min(d), hi.max(d))
        });
    let mut data = Data::new(durations.to_vec());
    let median = data.quantile(0.5);
    let p95 = data.percentile(95);
    let z = Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(0.975))
        .unwrap_or(1.96);
    let ci95 = z * std_dev / (count as f64).sqrt();
    Some(TimingStats {
        count,
        min,
        max,
        mean,
        std_dev,
        median,
        p95,
        ci95,
    })
}

fn print_decay(cal: &DecayCalibration) {
    println!();
    println!(
        "  Decay calibration (alpha {}, target {} ns, {} waits/layer)",
        cal.alpha, cal.wait_target_ns, cal.waits_per_layer
    );
    println!("  {:<6} {:>10} {:>12} {:>12}", "Layer", "decay", "target ns", "jitter ns");
    println!("  {}", "-".repeat(43));
    for l in &cal.layers {
        let mark = if l.layer == cal.optimal_layer { " *" } else { "" };
        println!(
            "  {:<6} {:>10.6} {:>12.3} {:>12.3}{mark}",
            l.layer, l.decay, l.target_ns, l.mean_jitter_ns
        );
    }
    println!(
        "  Optimal layer {}: decay {:.8}, adjusted wait {:.3} ns, jitter {:.3} ns",
        cal.optimal_layer, cal.optimal_decay, cal.adjusted_wait_ns, cal.min_jitter_ns
    );
}

pub fn run(cfg: CalibrateCommandConfig<'_>) -> i32 {
    if cfg.iterations == 0 {
        eprintln!("Error: --iterations must be > 0");
        return EXIT_CONFIG;
    }
    let mut probe = match make_probe(cfg.probe, &cfg.probe_options) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_CONFIG;
        }
    };
    let decay = if cfg.waits_per_layer == 0 {
        None
    } else {
        match timing::calibrate_decay(cfg.wait_target_ns, cfg.alpha, cfg.layers, cfg.waits_per_layer)
        {
            Ok(c) => Some(c),
            Err(e) => {
                eprintln!("Error: {e}");
                return EXIT_CONFIG;
            }
        }
    };
    let candidate = Candidate::parse(cfg.candidate);
    let sampler = Sampler::new(
        1,
        SamplerConfig {
            warmup: cfg.warmup,
            pace_us: cfg.pace_us,
            ..Default::default()
        },
    );

    println!("Calibrating probe '{}' on {candidate}", cfg.probe);
    println!("  Clock resolution: ~{} ns", timing::resolution_ns());

    let batch = sampler.sample(|| probe.measure(&candidate), cfg.iterations);
    let durations: Vec<f64> = batch.samples.iter().map(|s| s.raw_duration).collect();
    println!(
        "  Samples:          {} recorded, {} failed",
        durations.len(),
        batch.failures
    );

    let Some(stats) = summarize(&durations) else {
        eprintln!("No successful probe calls; nothing to summarize.");
        return EXIT_NO_SAMPLES;
    };
    println!();
    println!("  {:<10} {:>14}", "Stat", "ns");
    println!("  {}", "-".repeat(25));
    println!("  {:<10} {:>14.1}", "min", stats.min);
    println!("  {:<10} {:>14.1}", "mean", stats.mean);
    println!("  {:<10} {:>14.1}", "median", stats.median);
    println!("  {:<10} {:>14.1}", "p95", stats.p95);
    println!("  {:<10} {:>14.1}", "max", stats.max);
    println!("  {:<10} {:>14.1}", "std-dev", stats.std_dev);
    println!("  {:<10} {:>14.1}", "ci95 ±", stats.ci95);
    if let Some(cal) = &decay {
        print_decay(cal);
    }

    if let Some(path) = cfg.output_path {
        let json = serde_json::json!({
            "probe": cfg.probe,
            "candidate": candidate.to_string(),
            "clock_resolution_ns": timing::resolution_ns(),
            "failures": batch.failures,
            "stats": {
                "count": stats.count,
                "min": stats.min,
                "max": stats.max,
                "mean": stats.mean,
                "std_dev": stats.std_dev,
                "median": stats.median,
                "p95": stats.p95,
                "ci95": stats.ci95,
            },
            "decay_calibration": decay,
            "durations_ns": durations,
        });
        match serde_json::to_string_pretty(&json) {
            Ok(s) => {
                if let Err(e) = std::fs::write(path, s) {
                    eprintln!("Error writing {path}: {e}");
                    return EXIT_CONFIG;
                }
                println!("\nCalibration written to {path}");
            }
            Err(e) => {
                eprintln!("Error serializing calibration: {e}");
                return EXIT_CONFIG;
            }
        }
    }
    EXIT_OK
}
